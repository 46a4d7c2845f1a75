pub mod config;
pub mod remind;
pub mod schedule;
pub mod status;
pub mod tasks;
pub mod timezone;

use std::sync::Arc;

use taskstreak_core::storage::{self, Config};
use taskstreak_core::{LogDispatcher, StreakService, SystemClock};

pub type CmdResult = Result<(), Box<dyn std::error::Error>>;

/// Load the config and open the configured store, bootstrapping the roster.
pub fn open_service() -> Result<(Config, Arc<StreakService>), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    config.validate()?;

    let dir = storage::data_dir()?;
    let store = storage::open_store(&config, &dir)?;
    storage::ensure_roster(store.as_ref(), &config.roster)?;

    let service = StreakService::new(store, Arc::new(LogDispatcher), Arc::new(SystemClock), &config);
    Ok((config, Arc::new(service)))
}
