//! HTTP front end for Taskstreak.
//!
//! Every handler goes through [`StreakService`](taskstreak_core::StreakService),
//! so requests, the poll sweep and precise timers share one per-user lock.

mod error;
mod routes;

pub use error::ApiError;
pub use routes::{router, AppState};
