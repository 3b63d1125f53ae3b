//! Change detection: deciding per report per poll cycle whether to emit.

use chrono::{DateTime, Duration, Utc};

use raidwatch_logs::Report;

/// A report whose last upload is older than this has gone quiet.
const OUTDATED_AFTER_MINS: i64 = 15;

/// Only reports for this difficulty/raid-size combination qualify.
const TRACKED_DIFFICULTY: &str = "Mythic";
const TRACKED_RAID_SIZE: u32 = 20;

/// Last-observed state of a report, cached between poll cycles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportState {
    /// Unix milliseconds of the last seen upload.
    pub end_time: i64,
    pub is_live: bool,
}

/// Outcome of classifying one polled report against its cached state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollAction {
    /// Nothing to do this cycle.
    Skip,
    /// Fetch stats and emit an update with the given liveness.
    Emit { live: bool },
}

/// Pre-filter applied to every poll result: only fixed-size Mythic raids
/// qualify, everything else is discarded before classification.
pub fn is_tracked_raid(report: &Report) -> bool {
    report
        .zone
        .difficulties
        .iter()
        .any(|d| d.name == TRACKED_DIFFICULTY && d.sizes == [TRACKED_RAID_SIZE])
}

/// True when no new data has arrived within the freshness window.
pub fn is_outdated(end_time_ms: i64, now: DateTime<Utc>) -> bool {
    now.timestamp_millis() - end_time_ms
        > Duration::minutes(OUTDATED_AFTER_MINS).num_milliseconds()
}

/// Classify one report.
///
/// A never-seen report that is already outdated is skipped silently, so a
/// freshly registered guild does not backfill old completed reports. A
/// cached report emits when its end time advanced, or once when a
/// cached-live report goes quiet; otherwise nothing is emitted.
pub fn classify(cached: Option<&ReportState>, end_time: i64, outdated: bool) -> PollAction {
    match cached {
        None if outdated => PollAction::Skip,
        None => PollAction::Emit { live: true },
        Some(state) if state.end_time != end_time => PollAction::Emit { live: !outdated },
        Some(state) if state.is_live && outdated => PollAction::Emit { live: false },
        Some(_) => PollAction::Skip,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use raidwatch_logs::{Difficulty, Owner, Report, Zone};

    fn report_with_difficulties(difficulties: Vec<Difficulty>) -> Report {
        Report {
            code: "ABC".to_string(),
            title: String::new(),
            start_time: 0,
            end_time: 0,
            owner: Owner::default(),
            zone: Zone {
                name: "Zone".to_string(),
                difficulties,
            },
        }
    }

    fn difficulty(name: &str, sizes: Vec<u32>) -> Difficulty {
        Difficulty {
            name: name.to_string(),
            sizes,
        }
    }

    #[test]
    fn mythic_twenty_qualifies() {
        let report = report_with_difficulties(vec![
            difficulty("Heroic", vec![10, 30]),
            difficulty("Mythic", vec![20]),
        ]);
        assert!(is_tracked_raid(&report));
    }

    #[test]
    fn other_difficulties_do_not_qualify() {
        assert!(!is_tracked_raid(&report_with_difficulties(vec![])));
        assert!(!is_tracked_raid(&report_with_difficulties(vec![
            difficulty("Heroic", vec![20]),
        ])));
        assert!(!is_tracked_raid(&report_with_difficulties(vec![
            difficulty("Mythic", vec![10, 25]),
        ])));
        assert!(!is_tracked_raid(&report_with_difficulties(vec![
            difficulty("Mythic", vec![25]),
        ])));
    }

    #[test]
    fn filter_is_idempotent() {
        let report = report_with_difficulties(vec![difficulty("Mythic", vec![20])]);
        assert_eq!(is_tracked_raid(&report), is_tracked_raid(&report));
    }

    #[test]
    fn outdated_threshold_is_fifteen_minutes() {
        let now = Utc::now();
        let fourteen_min = now.timestamp_millis() - Duration::minutes(14).num_milliseconds();
        let sixteen_min = now.timestamp_millis() - Duration::minutes(16).num_milliseconds();
        assert!(!is_outdated(fourteen_min, now));
        assert!(is_outdated(sixteen_min, now));
    }

    #[test]
    fn unseen_outdated_report_is_skipped() {
        assert_eq!(classify(None, 1000, true), PollAction::Skip);
    }

    #[test]
    fn unseen_fresh_report_emits_live() {
        assert_eq!(classify(None, 1000, false), PollAction::Emit { live: true });
    }

    #[test]
    fn advanced_end_time_emits_with_current_liveness() {
        let cached = ReportState {
            end_time: 1000,
            is_live: true,
        };
        assert_eq!(
            classify(Some(&cached), 2000, false),
            PollAction::Emit { live: true }
        );
        assert_eq!(
            classify(Some(&cached), 2000, true),
            PollAction::Emit { live: false }
        );
    }

    #[test]
    fn cached_live_report_going_quiet_emits_offline() {
        let cached = ReportState {
            end_time: 1000,
            is_live: true,
        };
        assert_eq!(
            classify(Some(&cached), 1000, true),
            PollAction::Emit { live: false }
        );
    }

    #[test]
    fn unchanged_report_is_a_noop() {
        let live = ReportState {
            end_time: 1000,
            is_live: true,
        };
        let offline = ReportState {
            end_time: 1000,
            is_live: false,
        };
        // Live but still fresh: nothing to say.
        assert_eq!(classify(Some(&live), 1000, false), PollAction::Skip);
        // Already offline: stays silent no matter how old it gets.
        assert_eq!(classify(Some(&offline), 1000, true), PollAction::Skip);
        assert_eq!(classify(Some(&offline), 1000, false), PollAction::Skip);
    }
}
