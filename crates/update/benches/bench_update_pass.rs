use std::hint::black_box;
use std::sync::Arc;
use std::time::Instant;

use shardmap_common::{Difficulty, MapCatalog, MapDefinition, MapId, MapKind, ParticipantId, WorldConfig};
use shardmap_kernel::{InstanceIdAllocator, InstanceRequest, MapContext, MapRegistry, Transfer};
use shardmap_update::UpdateScheduler;

/// `maps` open-world maps plus one dungeon holding `instances` copies.
fn make_registry(config: &WorldConfig, maps: u32, instances: u32) -> MapRegistry {
    let mut defs: Vec<MapDefinition> = (0..maps)
        .map(|i| MapDefinition::new(MapId(i), MapKind::Common))
        .collect();
    let dungeon = MapId(maps);
    defs.push(MapDefinition::new(dungeon, MapKind::Dungeon));

    let catalog = MapCatalog::new(defs).expect("bench catalog");
    let ctx = MapContext::new(config, InstanceIdAllocator::new(0).wrap());
    let registry = MapRegistry::new(Arc::new(catalog), ctx);
    for i in 0..maps {
        let map = registry.get_or_create_base(MapId(i)).expect("base map");
        map.queue_transfer(Transfer::Enter(ParticipantId::new()));
    }
    let base = registry.get_or_create_base(dungeon).expect("dungeon");
    for _ in 0..instances {
        let request = InstanceRequest::new(ParticipantId::new(), Difficulty::Normal);
        let copy = base.create_instance(&request).expect("instance");
        copy.queue_transfer(Transfer::Enter(ParticipantId::new()));
    }
    registry
}

fn bench_passes(maps: u32, instances: u32, workers: usize, iterations: u32) {
    let config = WorldConfig {
        map_update_interval_ms: 10,
        worker_threads: workers,
        ..WorldConfig::default()
    };
    let registry = make_registry(&config, maps, instances);
    let mut scheduler = UpdateScheduler::new(&config);

    let start = Instant::now();
    for _ in 0..iterations {
        black_box(scheduler.advance(black_box(&registry), 10));
    }
    let elapsed = start.elapsed();
    let per_iter = elapsed / iterations;
    println!(
        "  pass ({maps} maps, {instances} instances, {workers} workers, {iterations} iters): {per_iter:?}/iter, total {elapsed:?}"
    );
    scheduler.shutdown();
}

fn main() {
    println!("=== Map Update Pass Benchmarks ===\n");

    println!("Sequential:");
    bench_passes(10, 0, 0, 10000);
    bench_passes(100, 100, 0, 1000);
    bench_passes(500, 1000, 0, 100);

    println!("\nWorker pool:");
    bench_passes(10, 0, 4, 10000);
    bench_passes(100, 100, 4, 1000);
    bench_passes(500, 1000, 8, 100);

    println!("\n=== Done ===");
}
