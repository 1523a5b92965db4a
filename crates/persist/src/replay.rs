use shardmap_kernel::MapManager;

use crate::records::InstanceStore;
use crate::store::StoreError;

/// Size the manager's allocator from `store` and mark every saved id used.
///
/// Returns the number of ids replayed.
pub fn init_instance_ids(store: &dyn InstanceStore, manager: &MapManager) -> Result<usize, StoreError> {
    let records = store.instances()?;
    let highest = store.highest_instance_id()?;
    manager.init_instance_ids(highest);

    for record in &records {
        manager.register_instance_id(record.id)?;
    }
    tracing::info!(instances = records.len(), highest, "instance ids replayed");
    Ok(records.len())
}
