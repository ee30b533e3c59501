use clap::Parser;
use sessionkit_core::ManagerConfigOverlay;
use sessionkit_server::config::AppConfig;
use sessionkit_server::http_server::{self, AppState};
use sessionkit_session::adapters::in_memory;
use sessionkit_session::{Manager, ProviderRegistry};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "session-daemon", about = "Cookie session server")]
struct Args {
    /// Path to config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// HTTP server address
    #[arg(long)]
    http_addr: Option<SocketAddr>,

    /// Storage backend name
    #[arg(short, long)]
    provider: Option<String>,

    /// Name of the session cookie
    #[arg(long)]
    cookie_name: Option<String>,

    /// Session lifetime in seconds
    #[arg(short, long)]
    max_lifetime: Option<u64>,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line args
    let args = Args::parse();

    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(if args.verbose { Level::DEBUG } else { Level::INFO })
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting session daemon");

    // Load config from file or use defaults
    let mut config = match &args.config {
        Some(config_path) => match AppConfig::load_from_file(config_path) {
            Ok(cfg) => {
                info!("Loaded configuration from {}", config_path.display());
                cfg
            }
            Err(e) => {
                error!("Failed to load configuration from {}: {}", config_path.display(), e);
                return Err(anyhow::anyhow!("Configuration error: {}", e));
            }
        },
        None => match AppConfig::load_from_default() {
            Ok((cfg, path)) => {
                info!("Loaded configuration from {}", path.display());
                cfg
            }
            Err(e) => {
                error!("Failed to load configuration: {}", e);
                return Err(anyhow::anyhow!("Configuration error: {}", e));
            }
        },
    };

    // Update config from CLI args
    if let Some(http_addr) = args.http_addr {
        config.http_addr = http_addr;
    }
    config.session = config.session.merge(&ManagerConfigOverlay {
        provider: args.provider,
        cookie_name: args.cookie_name,
        max_lifetime_secs: args.max_lifetime,
    });

    // Register storage backends
    let mut registry = ProviderRegistry::new();
    in_memory::register(&mut registry);

    let manager = match Manager::from_config(&registry, &config.session) {
        Ok(manager) => Arc::new(manager),
        Err(e) => {
            error!(error = %e, "Failed to create session manager");
            return Err(anyhow::anyhow!("Failed to create session manager: {}", e));
        }
    };

    let gc = manager.start_gc()?;
    let state = AppState::new(Arc::clone(&manager))?;

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
        info!("Received SIGINT, initiating graceful shutdown...");
    };

    let result = http_server::run_server(config.http_addr, state, shutdown).await;
    if let Err(e) = &result {
        error!(error = %e, "HTTP server failed");
    }

    gc.shutdown().await;
    info!("Session daemon shutting down");
    result
}
