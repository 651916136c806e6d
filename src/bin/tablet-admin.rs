//! Admin tool for a local tablet state directory

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tablet_state::common::logging::init_tracing;
use tablet_state::common::{parse_duration, retry_with_backoff, with_timeout};
use tablet_state::store::{dispatch, ExtentClass, StoreProvider};
use tablet_state::{
    Assignment, Config, KeyExtent, LocalBackend, LocationState, MetadataStateStore, RootStateStore,
    ServerSession, StoreRegistry, TableId,
};

#[derive(Parser)]
#[command(name = "tablet-admin")]
#[command(about = "Inspect and repair tablet assignment state")]
struct Cli {
    /// TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// State directory (overrides the config file)
    #[arg(long, global = true)]
    data: Option<PathBuf>,

    /// Per-operation timeout, e.g. `500ms` or `10s` (overrides the config file)
    #[arg(long, global = true, value_parser = parse_duration)]
    timeout: Option<Duration>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the root tablet record
    Init,

    /// Add a tablet row to the metadata table
    Register(ExtentArgs),

    /// Print location states
    Scan {
        #[arg(long, value_enum, default_value = "all")]
        store: StoreChoice,
    },

    /// Set a tablet's future location
    Assign {
        #[command(flatten)]
        extent: ExtentArgs,

        /// Server session, `host:port[hex-session]`
        #[arg(long)]
        server: ServerSession,
    },

    /// Promote a tablet's future location to current
    Promote {
        #[command(flatten)]
        extent: ExtentArgs,

        #[arg(long)]
        server: ServerSession,
    },

    /// Clear a tablet's current and future location
    Unassign(ExtentArgs),

    /// Audit both stores
    Verify {
        /// Live server sessions (comma-separated)
        #[arg(long, value_delimiter = ',')]
        live: Vec<ServerSession>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum StoreChoice {
    Root,
    Metadata,
    All,
}

#[derive(Args)]
struct ExtentArgs {
    /// The root tablet
    #[arg(long, conflicts_with_all = ["table", "end", "prev"])]
    root: bool,

    /// Table id
    #[arg(long, required_unless_present = "root")]
    table: Option<String>,

    /// End row (omit for the table's last tablet)
    #[arg(long)]
    end: Option<String>,

    /// Previous end row (omit for the table's first tablet)
    #[arg(long)]
    prev: Option<String>,
}

impl ExtentArgs {
    fn extent(&self) -> anyhow::Result<KeyExtent> {
        if self.root {
            return Ok(KeyExtent::root());
        }
        let table = self.table.clone().context("--table is required")?;
        Ok(KeyExtent::new(
            TableId::new(table),
            self.end.clone().map(String::into_bytes),
            self.prev.clone().map(String::into_bytes),
        )?)
    }
}

/// Run a blocking store call with the configured timeout and retries.
async fn run<T, F>(config: &Config, op: F) -> tablet_state::Result<T>
where
    F: Fn() -> tablet_state::Result<T> + Send + Sync + Clone + 'static,
    T: Send + 'static,
{
    let timeout = config.op_timeout();
    retry_with_backoff(
        || with_timeout(timeout, op.clone()),
        config.max_retries,
        config.initial_backoff(),
    )
    .await
}

fn print_state(state: &LocationState) {
    let walogs = if state.walogs().is_empty() {
        String::new()
    } else {
        format!(" walogs={}", state.walogs().join(","))
    };
    println!("{}{}", state, walogs);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(data) = cli.data {
        config.data_dir = data;
    }
    if let Some(timeout) = cli.timeout {
        config.op_timeout_ms = timeout.as_millis() as u64;
    }
    config.validate()?;
    init_tracing(&config.log_level);

    let backend = LocalBackend::open(&config.data_dir)
        .with_context(|| format!("opening {}", config.data_dir.display()))?;
    let registry = Arc::new(StoreRegistry::from_backends(
        backend.coordination(),
        backend.table(),
        &config,
    ));

    match cli.command {
        Commands::Init => {
            let root = RootStateStore::new(backend.coordination(), config.root_node_path.clone());
            if run(&config, move || root.initialize()).await? {
                println!("initialized {}", config.root_node_path);
            } else {
                println!("{} already exists", config.root_node_path);
            }
        }
        Commands::Register(args) => {
            let extent = args.extent()?;
            let store = MetadataStateStore::new(backend.table());
            let target = extent.clone();
            run(&config, move || store.register_tablet(&target)).await?;
            println!("registered {}", extent);
        }
        Commands::Scan { store } => {
            let classes: &[ExtentClass] = match store {
                StoreChoice::Root => &[ExtentClass::Root],
                StoreChoice::Metadata => &[ExtentClass::Metadata],
                StoreChoice::All => &[ExtentClass::Root, ExtentClass::Metadata],
            };
            for class in classes {
                let store = registry
                    .store_for(*class)
                    .with_context(|| format!("no {} store", class))?;
                for state in store.scan() {
                    match state {
                        Ok(state) => print_state(&state),
                        Err(e) => eprintln!("error: {}", e),
                    }
                }
            }
        }
        Commands::Assign { extent, server } => {
            let assignment = Assignment::new(extent.extent()?, server);
            let (provider, a) = (registry.clone(), assignment.clone());
            run(&config, move || {
                dispatch::set_future_location(provider.as_ref(), &a)
            })
            .await?;
            println!("assigned {}", assignment);
        }
        Commands::Promote { extent, server } => {
            let assignment = Assignment::new(extent.extent()?, server);
            let (provider, a) = (registry.clone(), assignment.clone());
            run(&config, move || dispatch::set_location(provider.as_ref(), &a)).await?;
            println!("hosted {}", assignment);
        }
        Commands::Unassign(args) => {
            let extent = args.extent()?;
            let (provider, target) = (registry.clone(), extent.clone());
            let state = run(&config, move || dispatch::lookup(provider.as_ref(), &target))
                .await?
                .with_context(|| format!("{} not found", extent))?;

            let provider = registry.clone();
            run(&config, move || dispatch::unassign(provider.as_ref(), &state)).await?;
            println!("unassigned {}", extent);
        }
        Commands::Verify { live } => {
            let live: HashSet<ServerSession> = live.into_iter().collect();
            let provider = registry.clone();
            let report = run(&config, move || {
                tablet_state::ops::verify_all(provider.as_ref(), &live)
            })
            .await?;

            println!("tablets: {}", report.total);
            for (state, count) in &report.states {
                println!("  {}: {}", state, count);
            }
            for extent in &report.dead_server_tablets {
                println!("on dead server: {}", extent);
            }
            for reason in &report.malformed {
                println!("malformed: {}", reason);
            }
            for extent in &report.misplaced {
                println!("misplaced: {}", extent);
            }
            if !report.is_consistent() {
                anyhow::bail!("assignment state is inconsistent");
            }
        }
    }

    backend.flush()?;
    Ok(())
}
