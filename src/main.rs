use cartflow::application::pipeline::StepRegistry;
use cartflow::application::{CartApp, Ports};
use cartflow::config::CartConfig;
use cartflow::domain::ports::SharedResolver;
use cartflow::infrastructure::in_memory::{
    InMemoryCartStore, InMemoryCatalog, InMemoryProcessorStore, InMemorySessionStore,
};
use cartflow::infrastructure::processors::default_registry;
use cartflow::infrastructure::sandbox::SandboxGateway;
use cartflow::interfaces::csv::cart_writer::CartWriter;
use cartflow::interfaces::csv::script_reader::ScriptReader;
use cartflow::interfaces::csv::script_runner::ScriptRunner;
use clap::Parser;
use miette::{IntoDiagnostic, Result};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input CSV script of cart commands
    input: PathBuf,

    /// Cart configuration (JSON). Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Product catalog (JSON array of products)
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long)]
    db_path: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => CartConfig::from_path(path).into_diagnostic()?,
        None => CartConfig::default(),
    };
    let catalog = match &cli.catalog {
        Some(path) => InMemoryCatalog::from_path(path).into_diagnostic()?,
        None => InMemoryCatalog::new(),
    };

    let sandbox = SandboxGateway::new();
    let ports = open_ports(cli.db_path.as_deref(), Arc::new(catalog))?;
    let registry = default_registry(Arc::new(sandbox.clone()));
    let app = CartApp::new(ports, registry, StepRegistry::with_defaults(), config)
        .await
        .into_diagnostic()?;

    // Replay the script
    let file = File::open(&cli.input).into_diagnostic()?;
    let reader = ScriptReader::new(file);
    let mut runner = ScriptRunner::new(&app, &sandbox);
    for command in reader.commands() {
        match command {
            Ok(command) => {
                let op = command.op;
                let session = command.session.clone();
                match runner.run(command).await {
                    Ok(outcome) => info!(?op, %session, "{outcome}"),
                    Err(e) => error!(?op, %session, "Error processing command: {e}"),
                }
            }
            Err(e) => error!("Error reading command: {e}"),
        }
    }

    // Output final state
    let carts = app.carts.carts().get_all().await.into_diagnostic()?;
    let stdout = io::stdout();
    let mut writer = CartWriter::new(stdout.lock());
    writer.write_carts(carts).into_diagnostic()?;

    Ok(())
}

fn in_memory_ports(resolver: SharedResolver) -> Ports {
    Ports {
        carts: Arc::new(InMemoryCartStore::new()),
        processors: Arc::new(InMemoryProcessorStore::new()),
        sessions: Arc::new(InMemorySessionStore::new()),
        resolver,
    }
}

#[cfg(feature = "storage-rocksdb")]
fn open_ports(db_path: Option<&Path>, resolver: SharedResolver) -> Result<Ports> {
    use cartflow::infrastructure::rocksdb::RocksDBStore;

    let Some(db_path) = db_path else {
        return Ok(in_memory_ports(resolver));
    };
    let store = RocksDBStore::open(db_path).into_diagnostic()?;
    Ok(Ports {
        carts: Arc::new(store.clone()),
        processors: Arc::new(store.clone()),
        sessions: Arc::new(store),
        resolver,
    })
}

#[cfg(not(feature = "storage-rocksdb"))]
fn open_ports(db_path: Option<&Path>, resolver: SharedResolver) -> Result<Ports> {
    if let Some(db_path) = db_path {
        tracing::warn!(path = %db_path.display(), "Built without `storage-rocksdb`, falling back to in-memory storage");
    }
    Ok(in_memory_ports(resolver))
}
