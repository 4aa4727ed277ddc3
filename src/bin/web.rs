use anyhow::{Context, Result};
use bowlpool::web::{router, AppState};
use bowlpool::{init_logging, Config, Storage};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env and BOWLPOOL_* settings
    let config = Config::from_env().context("Failed to load configuration")?;

    // Initialize logging
    init_logging();

    let storage = Storage::open(&config.database_path).with_context(|| {
        format!(
            "Failed to open database at {}",
            config.database_path.display()
        )
    })?;

    let years = storage.bowl_years().context("Failed to list bowl years")?;
    info!("Loaded {} bowl season(s): {:?}", years.len(), years);
    match config.reveal_at {
        Some(at) => info!("Picks revealed at {}", at),
        None => info!("Picks revealed at each season's first kickoff"),
    }

    let bind_address = config.bind_address.clone();
    let app = router(AppState::new(storage, config));

    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", bind_address))?;

    info!("Starting web server at http://{}", bind_address);
    println!("Press Ctrl+C to stop\n");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
        })
        .await
        .context("Server error")?;

    info!("Server stopped");
    Ok(())
}
