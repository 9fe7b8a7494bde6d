use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::info;

mod app;
mod channels;
mod http;

#[derive(Debug, Parser)]
#[command(name = "chime-gateway", version, about = "Reminder scheduling and delivery gateway")]
struct Cli {
    /// Path to chime.toml. Falls back to $CHIME_CONFIG, then ~/.chime/chime.toml.
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "chime_gateway=info,chime_scheduler=info,chime_channels=info,tower_http=debug"
                    .into()
            }),
        )
        .init();

    // load config: explicit path > CHIME_CONFIG env > ~/.chime/chime.toml
    let cli = Cli::parse();
    let config_path = cli.config.or_else(|| std::env::var("CHIME_CONFIG").ok());
    let config =
        chime_core::config::ChimeConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
            tracing::warn!("Config load failed ({}), using defaults", e);
            chime_core::config::ChimeConfig::default()
        });

    let bind = config.gateway.bind.clone();
    let port = config.gateway.port;

    // single SQLite file shared by every subsystem, one connection each
    let db_path = config.database.path.clone();
    ensure_parent_dir(&db_path);
    info!(path = %db_path, "opening SQLite database");

    let state = Arc::new(app::AppState::open(config)?);
    info!("database migrations complete");
    let router = app::build_router(state.clone());

    // spawn background driver loop unless an external trigger drives it
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    if state.config.scheduler.background_enabled {
        let every = Duration::from_secs(state.config.scheduler.background_interval_secs.max(1));
        tokio::spawn(Arc::clone(&state.background).run(every, shutdown_rx));
    } else {
        info!("background loop disabled, relying on POST /reminders/check");
    }

    let addr: SocketAddr = format!("{}:{}", bind, port).parse()?;
    info!("Chime gateway listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await?;

    // signal drivers to stop
    let _ = shutdown_tx.send(true);
    let owners: Vec<_> = state.foreground.iter().map(|e| e.key().clone()).collect();
    for owner_id in owners {
        state.close_session(&owner_id);
    }
    Ok(())
}

/// Ensure the parent directory for a file path exists.
fn ensure_parent_dir(path: &str) {
    if let Some(parent) = std::path::Path::new(path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }
}
