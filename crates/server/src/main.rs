mod api;
mod router;
mod startup;
mod state;

use tracing::info;

use kasane_core::Config;

fn load_config() -> Config {
    kasane_core::config::load_dotenv();
    Config::from_env()
}

/// Start the admin API server with all background loops.
async fn serve(config: &Config) -> anyhow::Result<()> {
    config.log_summary();

    let (state, service, shutdown) = startup::build_app_state(config).await?;
    startup::spawn_background(service);

    // Ctrl-C interrupts in-flight pacing sleeps and stops the loops.
    let shutdown_on_signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            shutdown_on_signal.notify_waiters();
        }
    });

    let app = router::build_router(state);
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server listening on http://{}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}

/// Run one sync pass from the command line and print the outcome.
async fn sync_once(config: &Config) -> anyhow::Result<()> {
    let (_state, service, _shutdown) = startup::build_app_state(config).await?;

    let job = service.request_manual_sync(None).await?;
    service.process_pending_jobs().await;

    let job = service
        .get_job(job.id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("job vanished: {}", job.id))?;

    match (job.result, job.error) {
        (Some(summary), _) => {
            println!("Sync completed:");
            println!("  new works:          {}", summary.new_works);
            println!("  new chapters:       {}", summary.new_chapters);
            println!("  duplicates skipped: {}", summary.duplicates_skipped);
            for error in &summary.errors {
                println!("  item error: {}", error);
            }
        }
        (None, Some(error)) => {
            println!("Sync failed: {}", error);
        }
        (None, None) => {
            println!("Sync did not run (status: {})", job.status.as_str());
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .init();

    let config = load_config();
    let args: Vec<String> = std::env::args().collect();

    match args.get(1).map(|s| s.as_str()) {
        Some("sync") => sync_once(&config).await?,
        Some("serve") | None => serve(&config).await?,
        Some(other) => {
            println!("kasane-server v0.1.0");
            println!("Unknown command: {}", other);
            println!("Usage: kasane-server <command>");
            println!("  serve   Start the admin API server (default)");
            println!("  sync    Run one sync pass and print the result");
        }
    }

    Ok(())
}
