//! Wire types for the log service GraphQL schema.

use serde::{Deserialize, Serialize};

/// A shared combat log upload, identified by a stable code.
///
/// `end_time` keeps advancing while the uploader is still pushing data;
/// the watcher uses that to decide whether a report is live.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub code: String,
    #[serde(default)]
    pub title: String,
    /// Unix milliseconds.
    pub start_time: i64,
    /// Unix milliseconds. Mutates as the report receives more uploads.
    pub end_time: i64,
    #[serde(default)]
    pub owner: Owner,
    #[serde(default)]
    pub zone: Zone,
}

/// Display name of the report uploader.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Owner {
    #[serde(default)]
    pub name: String,
}

/// Zone descriptor with the difficulty/raid-size metadata used to filter
/// non-qualifying reports.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Zone {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub difficulties: Vec<Difficulty>,
}

/// One difficulty entry of a zone, with its supported raid sizes.
#[derive(Debug, Clone, Deserialize)]
pub struct Difficulty {
    pub name: String,
    #[serde(default)]
    pub sizes: Vec<u32>,
}

/// One encounter attempt within a report.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fight {
    pub id: i64,
    #[serde(default)]
    pub encounter_id: i64,
    #[serde(default)]
    pub name: String,
    pub start_time: i64,
    pub end_time: i64,
    #[serde(default)]
    pub difficulty: Option<i64>,
    #[serde(default)]
    pub kill: Option<bool>,
}

/// A single player death within a fight.
#[derive(Debug, Clone, Deserialize)]
pub struct DeathEvent {
    pub timestamp: i64,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub target: Target,
}

/// The player that died.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Target {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub server: String,
}

/// One leaderboard entry: player name and death count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlayerTop {
    pub name: String,
    pub value: u32,
}

/// Ranked leaderboards for one report.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReportDetails {
    /// Top players by total deaths across all boss fights.
    pub top_deaths: Vec<PlayerTop>,
    /// Top players by earliest death per fight.
    pub top_first_deaths: Vec<PlayerTop>,
}
