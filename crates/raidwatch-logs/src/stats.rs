//! Death statistics aggregation.
//!
//! Pure accumulation over a report's boss fights: an overall death counter
//! and a first-death-per-fight counter, both preserving first-seen order
//! so that ranking ties break stably.

use crate::types::{DeathEvent, PlayerTop, ReportDetails};

/// Maximum number of entries per leaderboard.
pub const LEADERBOARD_LEN: usize = 5;

/// Accumulates death counts across the fights of one report.
#[derive(Debug, Default)]
pub struct DeathTally {
    total: Counter,
    first: Counter,
}

/// Insertion-ordered name -> count accumulator.
#[derive(Debug, Default)]
struct Counter {
    entries: Vec<PlayerTop>,
}

impl Counter {
    fn increment(&mut self, name: &str) {
        match self.entries.iter_mut().find(|e| e.name == name) {
            Some(entry) => entry.value += 1,
            None => self.entries.push(PlayerTop {
                name: name.to_string(),
                value: 1,
            }),
        }
    }

    fn into_top(mut self, n: usize) -> Vec<PlayerTop> {
        self.entries.sort_by(|a, b| b.value.cmp(&a.value));
        self.entries.truncate(n);
        self.entries
    }
}

impl DeathTally {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one fight's deaths into the tally.
    ///
    /// Events must already be ordered by timestamp ascending; only the
    /// earliest named death counts toward the first-death board. Deaths
    /// with an empty player name are excluded entirely.
    pub fn record_fight(&mut self, events: &[DeathEvent]) {
        let mut first_taken = false;
        for event in events {
            let name = event.target.name.as_str();
            if name.is_empty() {
                continue;
            }
            self.total.increment(name);
            if !first_taken {
                self.first.increment(name);
                first_taken = true;
            }
        }
    }

    /// Rank both counters and truncate to the top entries.
    ///
    /// `sort_by` is stable, so players with equal counts keep their
    /// first-seen relative order.
    pub fn finish(self) -> ReportDetails {
        ReportDetails {
            top_deaths: self.total.into_top(LEADERBOARD_LEN),
            top_first_deaths: self.first.into_top(LEADERBOARD_LEN),
        }
    }
}
