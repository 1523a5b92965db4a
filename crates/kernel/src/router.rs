use shardmap_common::MapId;
use std::sync::Arc;

use crate::error::MapError;
use crate::map::{InstanceRequest, Map};
use crate::registry::MapRegistry;

/// Picks the concrete map a participant lands in. Admission is decided
/// before routing and is not re-checked here.
pub struct InstanceRouter {
    registry: Arc<MapRegistry>,
}

impl InstanceRouter {
    pub fn new(registry: Arc<MapRegistry>) -> Self {
        Self { registry }
    }

    /// The base map for non-instanceable definitions, otherwise the bound
    /// or a freshly created instance copy.
    ///
    /// Asking for a specific copy of a non-instanceable map yields `None`.
    pub fn resolve(
        &self,
        map: MapId,
        request: &InstanceRequest,
    ) -> Result<Option<Arc<Map>>, MapError> {
        let base = self.registry.get_or_create_base(map)?;
        if !base.is_instanceable() {
            let wants_copy = request.bound_instance.is_some_and(|id| !id.is_base());
            return Ok((!wants_copy).then_some(base));
        }

        let difficulty = self
            .registry
            .catalog()
            .downscale(map, request.difficulty)
            .unwrap_or(request.difficulty);
        let request = InstanceRequest {
            difficulty,
            ..*request
        };
        base.create_instance(&request).map(Some)
    }
}
