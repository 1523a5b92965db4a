use anyhow::Context;
use clap::{Parser, Subcommand};
use shardmap_admission::{AdmissionController, ParticipantState};
use shardmap_common::{Difficulty, MapCatalog, MapId, ParticipantId, WorldConfig};
use shardmap_kernel::{
    DirectoryTerrain, GridCoord, InstanceRequest, MapManager, MapServices, MapStateLoader,
    Transfer, terrain,
};
use shardmap_persist::{InstanceRecord, JsonInstanceStore, init_instance_ids};
use shardmap_update::UpdateScheduler;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "shardmap-cli", about = "CLI tool for shardmap map management")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print version and crate info
    Info,
    /// Validate a catalog and list its maps
    Catalog {
        /// Catalog JSON file
        path: PathBuf,
    },
    /// Create maps and tick them
    Simulate {
        /// Catalog JSON file
        #[arg(long)]
        catalog: PathBuf,
        /// World config JSON file
        #[arg(long)]
        config: Option<PathBuf>,
        /// Instance store directory; ids are replayed from it and new copies saved to it
        #[arg(long)]
        store: Option<PathBuf>,
        /// Terrain root holding maps/ and vmaps/
        #[arg(long)]
        terrain: Option<PathBuf>,
        /// Number of scheduler calls
        #[arg(short, long, default_value = "100")]
        ticks: u32,
        /// Milliseconds passed to each call
        #[arg(long, default_value = "50")]
        step_ms: u32,
        /// Override the configured worker thread count
        #[arg(long)]
        threads: Option<usize>,
        /// Instance copies to open per instanceable map
        #[arg(short, long, default_value = "1")]
        instances: u32,
    },
    /// Evaluate whether a participant may enter a map
    Admit {
        /// Catalog JSON file
        #[arg(long)]
        catalog: PathBuf,
        /// World config JSON file
        #[arg(long)]
        config: Option<PathBuf>,
        /// Participant JSON file
        #[arg(long)]
        participant: PathBuf,
        /// Target map id
        #[arg(long)]
        map: u32,
        /// Treat the attempt as a login
        #[arg(long)]
        login: bool,
    },
    /// Check whether terrain tiles exist for a world position
    Probe {
        /// Terrain root holding maps/ and vmaps/
        #[arg(long)]
        terrain: PathBuf,
        #[arg(long)]
        map: u32,
        #[arg(long, allow_hyphen_values = true)]
        x: f32,
        #[arg(long, allow_hyphen_values = true)]
        y: f32,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match cli.command {
        Commands::Info => {
            println!("shardmap-cli v{}", env!("CARGO_PKG_VERSION"));
            println!("common: {}", shardmap_common::crate_info());
            println!("kernel: {}", shardmap_kernel::crate_info());
            println!("admission: {}", shardmap_admission::crate_info());
            println!("update: {}", shardmap_update::crate_info());
            println!("persist: {}", shardmap_persist::crate_info());
        }
        Commands::Catalog { path } => {
            let catalog = load_catalog(&path)?;
            println!("{} maps", catalog.len());
            for def in catalog.definitions() {
                let parent = def
                    .terrain_parent()
                    .map_or_else(|| "-".to_string(), |p| p.to_string());
                let template = catalog
                    .instance_template(def.id)
                    .map_or_else(|| "-".to_string(), |t| t.max_players.to_string());
                println!(
                    "{:>5} {:<12} parent={:<5} max_players={:<4} {}",
                    def.id.0,
                    format!("{:?}", def.kind),
                    parent,
                    template,
                    def.name("enUS")
                );
            }
        }
        Commands::Simulate {
            catalog,
            config,
            store,
            terrain: terrain_root,
            ticks,
            step_ms,
            threads,
            instances,
        } => {
            let mut config = load_config(config.as_deref())?;
            if let Some(threads) = threads {
                config.worker_threads = threads;
            }
            let code = simulate(
                config,
                load_catalog(&catalog)?,
                store.as_deref(),
                terrain_root,
                ticks,
                step_ms,
                instances,
            )?;
            if let Some(code) = code {
                std::process::exit(code);
            }
        }
        Commands::Admit {
            catalog,
            config,
            participant,
            map,
            login,
        } => {
            let config = load_config(config.as_deref())?;
            let file = std::fs::File::open(&participant)
                .with_context(|| format!("opening {}", participant.display()))?;
            let participant: ParticipantState = serde_json::from_reader(file)
                .with_context(|| format!("parsing {}", participant.display()))?;

            let admission = config.admission.clone();
            let manager = MapManager::new(config, Arc::new(load_catalog(&catalog)?), MapServices::default());
            let controller = AdmissionController::new(Arc::clone(manager.registry()), admission);
            let decision = controller.evaluate(MapId(map), &participant, login);
            match decision.denial() {
                None => println!("{} may enter map {map}", participant.name),
                Some(denial) => println!("{} denied entry to map {map}: {denial}", participant.name),
            }
        }
        Commands::Probe {
            terrain: root,
            map,
            x,
            y,
        } => {
            let source = DirectoryTerrain::new(root);
            let cell = GridCoord::from_world(x, y);
            let exists = terrain::exist_map_and_vmap(&source, MapId(map), x, y);
            match cell.to_tile() {
                Some((gx, gy)) => println!(
                    "map {map} ({x}, {y}) -> grid {gx},{gy}: {}",
                    if exists { "present" } else { "missing" }
                ),
                None => println!("map {map} ({x}, {y}) is outside the grid"),
            }
        }
    }

    Ok(())
}

fn load_catalog(path: &Path) -> anyhow::Result<MapCatalog> {
    MapCatalog::load_from_path(path).with_context(|| format!("loading catalog {}", path.display()))
}

fn load_config(path: Option<&Path>) -> anyhow::Result<WorldConfig> {
    let config = match path {
        Some(path) => WorldConfig::load_from_path(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => WorldConfig::default(),
    };
    config.validate()?;
    Ok(config)
}

/// Returns the exit code when a fatal map error stopped the run.
fn simulate(
    config: WorldConfig,
    catalog: MapCatalog,
    store_path: Option<&Path>,
    terrain_root: Option<PathBuf>,
    ticks: u32,
    step_ms: u32,
    instances: u32,
) -> anyhow::Result<Option<i32>> {
    let store = store_path.map(JsonInstanceStore::open).transpose()?.map(Arc::new);

    let mut services = MapServices::default();
    if let Some(root) = terrain_root {
        services.terrain = Arc::new(DirectoryTerrain::new(root));
    }
    if let Some(store) = &store {
        services.state_loader = Arc::clone(store) as Arc<dyn MapStateLoader>;
    }

    let manager = MapManager::new(config, Arc::new(catalog), services);
    if let Some(store) = &store {
        let replayed = init_instance_ids(store.as_ref(), &manager)?;
        println!("Replayed {replayed} instance ids");
    }

    let roots: Vec<_> = manager
        .catalog()
        .definitions()
        .filter(|d| d.terrain_parent().is_none())
        .map(|d| (d.id, d.instanceable()))
        .collect();
    for (id, instanceable) in roots {
        manager.create_base_map(id)?;
        if !instanceable {
            continue;
        }
        for _ in 0..instances {
            let request = InstanceRequest::new(ParticipantId::new(), Difficulty::Normal);
            let copy = match manager.create_map(id, &request) {
                Ok(Some(copy)) => copy,
                Ok(None) => continue,
                Err(e) if manager.shutdown_requested() => {
                    tracing::error!(error = %e, "stopping before ticking");
                    return shutdown(&manager, None);
                }
                Err(e) => return Err(e.into()),
            };
            copy.queue_transfer(Transfer::Enter(request.participant));
            if let Some(store) = &store {
                store.save_instance(InstanceRecord {
                    id: copy.instance_id(),
                    map: id,
                    difficulty: copy.difficulty(),
                    reset_at: 0,
                })?;
            }
        }
    }

    let mut scheduler = UpdateScheduler::new(manager.config());
    println!(
        "Simulating {ticks} x {step_ms}ms over {} base maps ({} workers)",
        manager.registry().len(),
        scheduler.worker_threads()
    );
    for _ in 0..ticks {
        scheduler.advance(manager.registry(), step_ms);
        if manager.shutdown_requested() {
            break;
        }
    }

    println!(
        "Passes: {}, instances: {}, participants in instances: {}",
        scheduler.passes(),
        manager.num_instances(),
        manager.num_participants_in_instances()
    );
    let history = scheduler.history();
    println!(
        "Pass time over last {}: primary avg {:?}, delayed avg {:?}, slowest {:?}",
        history.len(),
        history.mean_primary(),
        history.mean_delayed(),
        history.slowest().map(|p| p.total_time()).unwrap_or_default()
    );

    shutdown(&manager, Some(&mut scheduler))
}

fn shutdown(manager: &MapManager, scheduler: Option<&mut UpdateScheduler>) -> anyhow::Result<Option<i32>> {
    if let Some(scheduler) = scheduler {
        scheduler.shutdown();
    }
    manager.unload_all();
    Ok(manager.exit_code())
}
