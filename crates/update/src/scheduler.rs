//! Two-phase update pass over every registered base map.

use shardmap_common::WorldConfig;
use shardmap_kernel::{Map, MapRegistry};
use std::sync::Arc;
use std::time::Instant;

use crate::pool::MapUpdater;
use crate::stats::{PassHistory, PassStats};
use crate::timer::IntervalTimer;

const HISTORY: usize = 64;

/// Drives map ticking. Each elapsed interval runs a primary pass, waits on
/// the pool barrier, then runs a delayed pass.
pub struct UpdateScheduler {
    timer: IntervalTimer,
    updater: MapUpdater,
    history: PassHistory,
    last: PassStats,
    passes: u64,
}

impl UpdateScheduler {
    pub fn new(config: &WorldConfig) -> Self {
        let mut updater = MapUpdater::new();
        updater.activate(config.worker_threads);
        Self {
            timer: IntervalTimer::new(config.map_update_interval_ms),
            updater,
            history: PassHistory::new(HISTORY),
            last: PassStats::default(),
            passes: 0,
        }
    }

    /// Accumulate `elapsed_ms`; once the interval is reached advance every
    /// map of `registry` by the accumulated time. Returns whether a pass ran.
    pub fn advance(&mut self, registry: &MapRegistry, elapsed_ms: u32) -> bool {
        self.timer.update(elapsed_ms);
        if !self.timer.passed() {
            return false;
        }

        let diff = self.timer.current();
        let maps = registry.maps();
        let _span = tracing::info_span!("map_update", diff, maps = maps.len()).entered();

        let start = Instant::now();
        self.run_phase(&maps, move |map| map.update(diff));
        let primary_time = start.elapsed();

        let start = Instant::now();
        self.run_phase(&maps, move |map| map.delayed_update(diff));
        let delayed_time = start.elapsed();

        self.last = PassStats {
            maps: maps.len(),
            diff,
            primary_time,
            delayed_time,
        };
        self.history.record(self.last);
        self.passes += 1;
        self.timer.reset();

        tracing::trace!(
            primary_us = primary_time.as_micros() as u64,
            delayed_us = delayed_time.as_micros() as u64,
            "map update pass complete"
        );
        true
    }

    /// Run `step` for each map and return once all of them have finished.
    fn run_phase<F>(&self, maps: &[Arc<Map>], step: F)
    where
        F: Fn(&Map) + Copy + Send + 'static,
    {
        if !self.updater.activated() {
            for map in maps {
                step(map.as_ref());
            }
            return;
        }
        for map in maps {
            let map = Arc::clone(map);
            self.updater.schedule(move || step(map.as_ref()));
        }
        self.updater.wait();
    }

    pub fn is_parallel(&self) -> bool {
        self.updater.activated()
    }

    pub fn worker_threads(&self) -> usize {
        self.updater.threads()
    }

    pub fn timer(&self) -> &IntervalTimer {
        &self.timer
    }

    /// Completed passes since creation.
    pub fn passes(&self) -> u64 {
        self.passes
    }

    pub fn last_pass(&self) -> &PassStats {
        &self.last
    }

    pub fn history(&self) -> &PassHistory {
        &self.history
    }

    /// Stop the worker pool. Later passes run sequentially.
    pub fn shutdown(&mut self) {
        self.updater.deactivate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use shardmap_common::{
        Difficulty, InstanceId, MapCatalog, MapDefinition, MapId, MapKind, ParticipantId,
    };
    use shardmap_kernel::{
        InstanceIdAllocator, InstanceRequest, MapContext, MapObserver, Transfer, UpdatePhase,
    };
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::Duration;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Edge {
        Start,
        Done,
    }

    #[derive(Default)]
    struct Recorder {
        seq: AtomicU64,
        /// (map, instance, phase, edge, sequence number)
        events: Mutex<Vec<(MapId, InstanceId, UpdatePhase, Edge, u64)>>,
        slow_primary: bool,
    }

    impl Recorder {
        fn push(&self, map: MapId, instance: InstanceId, phase: UpdatePhase, edge: Edge) {
            let n = self.seq.fetch_add(1, Ordering::SeqCst);
            self.events.lock().push((map, instance, phase, edge, n));
        }

        fn count(&self, phase: UpdatePhase) -> usize {
            self.events
                .lock()
                .iter()
                .filter(|e| e.2 == phase && e.3 == Edge::Start)
                .count()
        }
    }

    impl MapObserver for Recorder {
        fn on_update(&self, map: MapId, instance: InstanceId, phase: UpdatePhase, _diff: u32) {
            self.push(map, instance, phase, Edge::Start);
        }

        fn on_updated(&self, map: MapId, instance: InstanceId, phase: UpdatePhase) {
            if self.slow_primary && phase == UpdatePhase::Primary {
                std::thread::sleep(Duration::from_millis(2));
            }
            self.push(map, instance, phase, Edge::Done);
        }
    }

    fn config(interval: u32, workers: usize) -> WorldConfig {
        WorldConfig {
            map_update_interval_ms: interval,
            worker_threads: workers,
            ..WorldConfig::default()
        }
    }

    fn registry(config: &WorldConfig, recorder: Arc<Recorder>, maps: u32) -> MapRegistry {
        let defs = (0..maps)
            .map(|i| MapDefinition::new(MapId(i), MapKind::Common))
            .collect();
        let catalog = MapCatalog::new(defs).unwrap();
        let ctx = MapContext::new(config, InstanceIdAllocator::new(0).wrap()).with_observer(recorder);
        let registry = MapRegistry::new(Arc::new(catalog), ctx);
        for i in 0..maps {
            registry.get_or_create_base(MapId(i)).unwrap();
        }
        registry
    }

    #[test]
    fn below_threshold_accumulates_without_updating() {
        let cfg = config(100, 0);
        let rec = Arc::new(Recorder::default());
        let reg = registry(&cfg, Arc::clone(&rec), 3);
        let mut sched = UpdateScheduler::new(&cfg);

        assert!(!sched.advance(&reg, 40));
        assert!(!sched.advance(&reg, 59));
        assert_eq!(sched.timer().current(), 99);
        assert_eq!(sched.passes(), 0);
        assert!(rec.events.lock().is_empty());
    }

    #[test]
    fn summed_deltas_at_threshold_run_one_pass() {
        let cfg = config(100, 0);
        let rec = Arc::new(Recorder::default());
        let reg = registry(&cfg, Arc::clone(&rec), 3);
        let mut sched = UpdateScheduler::new(&cfg);

        assert!(!sched.advance(&reg, 60));
        assert!(sched.advance(&reg, 40));
        assert_eq!(sched.passes(), 1);
        assert_eq!(sched.timer().current(), 0);
        assert_eq!(rec.count(UpdatePhase::Primary), 3);
        assert_eq!(rec.count(UpdatePhase::Delayed), 3);
        assert_eq!(sched.last_pass().diff, 100);
        assert_eq!(sched.last_pass().maps, 3);
        for map in reg.maps() {
            assert_eq!(map.ticks(), 1);
            assert_eq!(map.elapsed_ms(), 100);
        }
    }

    #[test]
    fn sequential_pass_follows_registry_order() {
        let cfg = config(1, 0);
        let rec = Arc::new(Recorder::default());
        let reg = registry(&cfg, Arc::clone(&rec), 4);
        let mut sched = UpdateScheduler::new(&cfg);
        sched.advance(&reg, 1);

        let events = rec.events.lock();
        let order: Vec<(u32, UpdatePhase)> = events
            .iter()
            .filter(|e| e.3 == Edge::Start)
            .map(|e| (e.0.0, e.2))
            .collect();
        let mut expected: Vec<(u32, UpdatePhase)> =
            (0..4).map(|i| (i, UpdatePhase::Primary)).collect();
        expected.extend((0..4).map(|i| (i, UpdatePhase::Delayed)));
        assert_eq!(order, expected);
    }

    #[test]
    fn parallel_barrier_separates_phases() {
        let cfg = config(10, 4);
        let rec = Arc::new(Recorder {
            slow_primary: true,
            ..Recorder::default()
        });
        let reg = registry(&cfg, Arc::clone(&rec), 12);
        let mut sched = UpdateScheduler::new(&cfg);
        assert!(sched.is_parallel());

        for _ in 0..3 {
            rec.events.lock().clear();
            assert!(sched.advance(&reg, 10));

            let events = rec.events.lock();
            let last_primary_done = events
                .iter()
                .filter(|e| e.2 == UpdatePhase::Primary && e.3 == Edge::Done)
                .map(|e| e.4)
                .max()
                .unwrap();
            let first_delayed_start = events
                .iter()
                .filter(|e| e.2 == UpdatePhase::Delayed && e.3 == Edge::Start)
                .map(|e| e.4)
                .min()
                .unwrap();
            assert!(last_primary_done < first_delayed_start);
            let primary_done = events
                .iter()
                .filter(|e| e.2 == UpdatePhase::Primary && e.3 == Edge::Done)
                .count();
            assert_eq!(primary_done, 12);
            assert_eq!(events.len(), 48);
        }
        sched.shutdown();
        assert!(!sched.is_parallel());
    }

    #[test]
    fn transfers_land_in_delayed_phase() {
        let cfg = config(10, 2);
        let rec = Arc::new(Recorder::default());
        let reg = registry(&cfg, rec, 1);
        let mut sched = UpdateScheduler::new(&cfg);

        let map = reg.find_base_map(MapId(0)).unwrap();
        map.queue_transfer(Transfer::Enter(ParticipantId::new()));
        assert_eq!(map.participant_count(), 0);
        sched.advance(&reg, 10);
        assert_eq!(map.participant_count(), 1);
    }

    #[test]
    fn instance_copies_follow_their_base() {
        let cfg = config(10, 2);
        let rec = Arc::new(Recorder::default());
        let catalog = MapCatalog::new(vec![MapDefinition::new(MapId(36), MapKind::Dungeon)]).unwrap();
        let ctx = MapContext::new(&cfg, InstanceIdAllocator::new(0).wrap())
            .with_observer(Arc::clone(&rec) as Arc<dyn MapObserver>);
        let reg = MapRegistry::new(Arc::new(catalog), ctx);
        let base = reg.get_or_create_base(MapId(36)).unwrap();
        let copy = base
            .create_instance(&InstanceRequest::new(ParticipantId::new(), Difficulty::Normal))
            .unwrap();

        let mut sched = UpdateScheduler::new(&cfg);
        sched.advance(&reg, 25);
        assert_eq!(copy.ticks(), 1);
        assert_eq!(copy.elapsed_ms(), 25);
        assert_eq!(rec.count(UpdatePhase::Primary), 2);
        assert_eq!(rec.count(UpdatePhase::Delayed), 2);
    }
}
