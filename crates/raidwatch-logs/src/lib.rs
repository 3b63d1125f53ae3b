//! Warcraft Logs v2 API client for Raidwatch.
//!
//! This crate owns all network-facing interaction with the log service:
//!
//! - **Token lifecycle**: OAuth client-credentials exchange with a
//!   read/write-locked token and double-checked refresh
//! - **GraphQL execution**: one request per call, with a single forced
//!   refresh-and-retry on authorization expiry
//! - **Pagination**: bounded cursor-following for death event queries
//! - **Aggregation**: ranked death leaderboards per report

mod client;
mod error;
mod stats;
mod types;

pub use client::{LogsClient, LogsConfig};
pub use error::LogsError;
pub use stats::{DeathTally, LEADERBOARD_LEN};
pub use types::{
    DeathEvent, Difficulty, Fight, Owner, PlayerTop, Report, ReportDetails, Target, Zone,
};
