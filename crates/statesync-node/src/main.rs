//! Statesync Node - Sync server with the demo channels
//!
//! This binary runs a sync server with:
//! - WebSocket endpoint for peers at `/ws`
//! - REST API for channel, peer and counter inspection

use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use statesync_node::{create_router, demo, AppState};
use statesync_server::{ServerConfig, SyncServer};

#[derive(Parser)]
#[command(name = "statesync-node")]
#[command(about = "Socket-synced state server with REST inspection API")]
struct Args {
    /// HTTP listen port (0 = auto-assign)
    #[arg(long, short, default_value_t = 3000)]
    port: u16,

    /// Display name for this node
    #[arg(long, short, default_value = "statesync")]
    name: String,

    /// Outbound queue capacity per peer before it is evicted
    #[arg(long, default_value_t = 256)]
    queue: usize,

    /// Drop rejected proposals without telling the proposer
    #[arg(long)]
    silent_rejections: bool,

    /// Seconds between state log lines (0 = off)
    #[arg(long, default_value_t = 1)]
    state_log_secs: u64,

    /// Enable verbose logging
    #[arg(long, short)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging; RUST_LOG overrides the default level
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting Statesync Node: {}", args.name);

    let mut config = ServerConfig::default();
    config.peer_queue_capacity = args.queue;
    if args.silent_rejections {
        config = config.silent_rejections();
        info!("Rejection notices disabled");
    }

    let sync = Arc::new(SyncServer::new(config));
    let demo = demo::register(&sync)?;
    info!(
        "Registered {} channels and {} procedures",
        sync.channels().len(),
        sync.procedures().len()
    );

    if args.state_log_secs > 0 {
        let every = Duration::from_secs(args.state_log_secs);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                debug!("State on server: {}", demo.summary());
            }
        });
    }

    let state = Arc::new(AppState::new(sync, args.name));
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("HTTP server listening on http://{}", listener.local_addr()?);
    info!("Peers connect to ws://{}/ws", listener.local_addr()?);

    axum::serve(listener, app).await?;

    Ok(())
}
