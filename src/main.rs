use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::{error, info};
use tracing_appender::rolling;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crafty::containers::engine::{ContainerEngine, DockerEngine};
use crafty::containers::registry::ContainerRegistry;
use crafty::containers::store::ConfigStore;
use crafty::server::config::ServerConfig;
use crafty::version::VERSION;
use crafty::web::{self, AppState};
use crafty::workspace::manager::WorkspaceManager;

#[derive(Parser, Debug)]
#[command(author, version = VERSION, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP management server
    Server {
        /// Path to the configuration file
        #[arg(short, long)]
        config: Option<String>,
    },
}

fn init_logging(log_dir: &str) {
    // JSON lines, one file per day
    let file_appender = rolling::daily(log_dir, "crafty.log");
    let file_layer = fmt::layer()
        .with_writer(file_appender)
        .with_ansi(false)
        .json();

    let stdout_layer = fmt::layer().with_writer(std::io::stdout);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,bollard=warn,tower_http=info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl-C.");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM.");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received, stopping server.");
}

async fn run_server(config_path: Option<&str>) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let server_config = match ServerConfig::load(config_path) {
        Ok(config) => Arc::new(config),
        Err(e) => {
            eprintln!("Failed to load server configuration: {e}");
            return Err(e.into());
        }
    };

    init_logging(&server_config.log_dir);
    info!("Starting crafty, version: {}", VERSION);

    let store = Arc::new(ConfigStore::open(&server_config.config_path).await?);
    let workspace = Arc::new(WorkspaceManager::new(&server_config.workspace_dir)?);
    info!(root = %workspace.root().display(), "Workspace root ready.");

    let engine: Arc<dyn ContainerEngine> =
        Arc::new(DockerEngine::connect(server_config.docker_host.as_deref())?);
    let registry = Arc::new(ContainerRegistry::new(
        store.clone(),
        engine,
        workspace.clone(),
        server_config.image.clone(),
    ));

    let addr = server_config.listen_addr()?;
    let app = web::create_axum_router(Arc::new(AppState {
        store,
        registry,
        workspace,
        config: server_config,
    }));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("HTTP server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped.");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = Cli::parse();

    match cli.command {
        Command::Server { config } => run_server(config.as_deref()).await,
    }
}
