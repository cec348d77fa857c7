use clap::Parser;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

use scim_gateway::backend::BackendFactory;
use scim_gateway::config::AppConfig;
use scim_gateway::ldap::ResourceMapping;
use scim_gateway::server::{build_router, AppState};
use scim_gateway::schema::SchemaRegistry;

#[derive(Parser, Debug)]
#[command(name = "scim-gateway")]
#[command(about = "A SCIM 1.0 gateway with an LDAP directory backend")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on (overrides config file)
    #[arg(short, long)]
    port: Option<u16>,

    /// Host to bind to (overrides config file)
    #[arg(long)]
    host: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt::init();

    let (mut config, config_dir) = match &args.config {
        Some(path) => {
            let config = AppConfig::load_from_file(path)?;
            let dir = path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("."));
            (config, dir)
        }
        None => {
            info!("no configuration file given; using the in-memory backend without authentication");
            (AppConfig::default_config(), PathBuf::from("."))
        }
    };

    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(host) = args.host {
        config.server.host = host;
    }

    // The registry is built once and immutable from here on.
    let mut registry = SchemaRegistry::core();
    for declaration in &config.schemas {
        registry.register(declaration.to_descriptor()?)?;
    }
    let registry = Arc::new(registry);

    let mappings = config
        .resources
        .iter()
        .map(|r| ResourceMapping::load_from_file(config_dir.join(&r.mapping_file)))
        .collect::<Result<Vec<ResourceMapping>, _>>()?;

    let backend = BackendFactory::create(
        &config.backend,
        registry.clone(),
        mappings,
        config.server.max_candidates,
    )?;

    let state = AppState {
        backend,
        registry,
        config: Arc::new(config.clone()),
    };
    let app = build_router(state);

    let host: std::net::IpAddr = config.server.host.parse()?;
    let addr = SocketAddr::from((host, config.server.port));

    info!(
        "scim-gateway v{} listening on {} (base URI {}, backend {})",
        env!("CARGO_PKG_VERSION"),
        addr,
        config.server.base_uri,
        config.backend.backend_type
    );

    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("received SIGTERM, shutting down");
        },
    }
}
