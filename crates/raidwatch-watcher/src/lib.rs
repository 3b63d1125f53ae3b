//! Per-guild report watching for Raidwatch.
//!
//! This crate turns the log service client into a stream of deduplicated
//! update events:
//!
//! - **Cache**: a TTL-bounded map from report code to last-observed state
//! - **Detector**: pure classification of each polled report into
//!   emit/skip outcomes
//! - **Watcher**: one cancellable polling task per tracked guild, with a
//!   single registered delivery handler shared by all loops

mod cache;
mod detector;
mod watcher;

pub use cache::TtlCache;
pub use detector::{PollAction, ReportState, classify, is_outdated, is_tracked_raid};
pub use watcher::{StatsUpdate, TrackedGuild, Watcher};
