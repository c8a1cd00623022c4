use clap::Parser;
use log::{error, info};
use server::config::{Mode, ServerConfig};
use server::network::{BoxError, Server};
use server::persistence::{JsonFileStore, MemoryStore, PersistenceGateway};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Port to listen on
    port: u16,

    /// `single` for a local one-player instance, `multi` for a shared one
    #[arg(value_enum, default_value_t = Mode::Multi)]
    mode: Mode,

    /// Address to bind to
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Simulation ticks per second
    #[arg(long, default_value_t = shared::DEFAULT_TICK_RATE)]
    tick_rate: u32,

    /// Maximum simultaneous connections
    #[arg(long, default_value_t = 16)]
    max_clients: usize,

    /// Milliseconds a single outbound write may take before the session is dropped
    #[arg(long, default_value_t = 250)]
    write_timeout_ms: u64,

    /// JSON file for accounts and scores; kept in memory when absent
    #[arg(long)]
    store: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let store: Arc<dyn PersistenceGateway> = match &args.store {
        Some(path) => {
            info!("Using score file {}", path.display());
            Arc::new(JsonFileStore::open(path)?)
        }
        None => Arc::new(MemoryStore::new()),
    };

    let config = ServerConfig {
        addr: format!("{}:{}", args.host, args.port),
        mode: args.mode,
        tick_rate: args.tick_rate,
        max_clients: args.max_clients,
        write_timeout: Duration::from_millis(args.write_timeout_ms),
    };

    let mut server = match Server::new(config, store).await {
        Ok(server) => server,
        Err(e) => {
            error!("Failed to start server: {}", e);
            std::process::exit(1);
        }
    };

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
