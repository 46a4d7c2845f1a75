use std::sync::Arc;

use clap::Parser;
use taskstreak_core::storage::{self, Config, SchedulerMode};
use taskstreak_core::{LogDispatcher, ResetScheduler, StreakService, SystemClock};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "taskstreak-server", version, about = "Taskstreak HTTP server")]
struct Cli {
    /// Address to listen on (overrides server.bind)
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(e) = run(Cli::parse()).await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    config.validate()?;

    let dir = storage::data_dir()?;
    let store = storage::open_store(&config, &dir)?;
    let created = storage::ensure_roster(store.as_ref(), &config.roster)?;
    tracing::info!(
        backend = store.name(),
        users = config.roster.users.len(),
        created = created.len(),
        "storage ready"
    );

    let service = Arc::new(StreakService::new(
        store,
        Arc::new(LogDispatcher),
        Arc::new(SystemClock),
        &config,
    ));

    let scheduler = ResetScheduler::new(Arc::clone(&service));
    match config.scheduler.mode {
        SchedulerMode::Poll => scheduler.start_polling(config.poll_interval()),
        SchedulerMode::Precise => scheduler.start_precise(),
    }

    let bind = cli.bind.unwrap_or_else(|| config.server.bind.clone());
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    tracing::info!(%bind, "listening");

    axum::serve(listener, taskstreak_server::router(service))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    scheduler.shutdown();
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c; running until killed");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
