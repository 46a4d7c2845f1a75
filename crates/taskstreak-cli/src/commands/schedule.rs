use clap::ValueEnum;
use taskstreak_core::storage::SchedulerMode;
use taskstreak_core::ResetScheduler;

use super::{open_service, CmdResult};

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum WatchMode {
    /// Sweep every user on the configured interval
    Poll,
    /// One timer per user, armed for their next local midnight
    Precise,
}

impl From<WatchMode> for SchedulerMode {
    fn from(mode: WatchMode) -> Self {
        match mode {
            WatchMode::Poll => SchedulerMode::Poll,
            WatchMode::Precise => SchedulerMode::Precise,
        }
    }
}

pub async fn sweep() -> CmdResult {
    let (_, service) = open_service()?;
    let report = service.sweep().await;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Run the scheduler in the foreground until interrupted.
pub async fn watch(mode: Option<WatchMode>) -> CmdResult {
    let (config, service) = open_service()?;
    let mode = mode.map(SchedulerMode::from).unwrap_or(config.scheduler.mode);
    let users = service.roster().len();

    let scheduler = ResetScheduler::new(service);
    match mode {
        SchedulerMode::Poll => scheduler.start_polling(config.poll_interval()),
        SchedulerMode::Precise => scheduler.start_precise(),
    }
    eprintln!("watching {users} users ({mode:?}); press ctrl-c to stop");

    tokio::signal::ctrl_c().await?;
    scheduler.shutdown();
    Ok(())
}
