use shardmap_common::{CatalogError, MapId};

use crate::instance_id::InstanceIdError;

/// Errors from map creation and routing.
#[derive(Debug, thiserror::Error)]
pub enum MapError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error("map {0} was not installed by its parent's creation")]
    ChildNotInstalled(MapId),
    #[error("map {0} is not instanceable")]
    NotInstanceable(MapId),
    #[error(transparent)]
    InstanceId(#[from] InstanceIdError),
}

impl MapError {
    /// Errors after which the server must stop.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            MapError::InstanceId(InstanceIdError::Exhausted)
                | MapError::ChildNotInstalled(_)
                | MapError::Catalog(CatalogError::UnknownMap(_))
        )
    }
}
