//! Watch supervisor and per-guild poll loops.

use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use rand::Rng;
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

use raidwatch_logs::{LogsClient, PlayerTop};

use crate::cache::TtlCache;
use crate::detector::{PollAction, ReportState, classify, is_outdated, is_tracked_raid};

/// Fixed cadence between poll cycles.
const POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Upper bound on one poll cycle; a timed-out cycle is abandoned and the
/// loop carries on with the next tick.
const CYCLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Random delay before a loop's first cycle, spreading load when many
/// guilds start at once.
const MAX_START_JITTER_MS: u64 = 10_000;

/// Retention of per-report state between cycles.
const REPORT_STATE_TTL: Duration = Duration::from_secs(60 * 60);

/// Cadence of the cache's background eviction sweep.
const EVICTION_INTERVAL: Duration = Duration::from_secs(60);

/// How far back each cycle lists reports.
const LOOKBACK_HOURS: i64 = 12;

const REPORT_URL_BASE: &str = "https://www.warcraftlogs.com/reports";

/// An externally tracked guild. Immutable for the lifetime of a watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TrackedGuild {
    pub guild_id: i64,
    /// Max deaths per fight after which further deaths are ignored when
    /// aggregating.
    pub wipe_cutoff: i64,
}

/// A deduplicated notification event handed to the delivery sink.
#[derive(Debug, Clone, Serialize)]
pub struct StatsUpdate {
    pub guild: TrackedGuild,
    pub report_code: String,
    pub title: String,
    pub zone: String,
    pub url: String,
    pub live: bool,
    pub top_deaths: Vec<PlayerTop>,
    pub top_first_deaths: Vec<PlayerTop>,
    pub started_by: String,
    pub started_at: DateTime<Utc>,
    pub last_upload: DateTime<Utc>,
}

type UpdateHandler = Box<dyn Fn(StatsUpdate) + Send + Sync>;

/// Supervisor owning one cancellable poll loop per watched guild.
///
/// All loops share the one client (and through it the token state) and the
/// one registered update handler; nothing else is shared between guilds.
pub struct Watcher {
    client: Arc<LogsClient>,
    handler: Arc<OnceLock<UpdateHandler>>,
    watched: DashMap<i64, watch::Sender<bool>>,
}

impl Watcher {
    pub fn new(client: Arc<LogsClient>) -> Self {
        Self {
            client,
            handler: Arc::new(OnceLock::new()),
            watched: DashMap::new(),
        }
    }

    /// Register the single delivery handler. Later registrations are
    /// ignored with a warning.
    ///
    /// The handler is invoked concurrently from all guild loops and must
    /// tolerate that.
    pub fn on_update(&self, handler: impl Fn(StatsUpdate) + Send + Sync + 'static) {
        if self.handler.set(Box::new(handler)).is_err() {
            warn!("update handler already registered, ignoring");
        }
    }

    /// Start a poll loop for a guild. Idempotent: a guild that is already
    /// watched keeps its existing loop and this returns false.
    pub fn watch(&self, guild: TrackedGuild) -> bool {
        match self.watched.entry(guild.guild_id) {
            Entry::Occupied(_) => {
                debug!(guild = guild.guild_id, "guild already watched");
                false
            }
            Entry::Vacant(slot) => {
                let (cancel, shutdown) = watch::channel(false);
                slot.insert(cancel);
                let client = Arc::clone(&self.client);
                let handler = Arc::clone(&self.handler);
                tokio::spawn(watch_loop(client, handler, guild, shutdown));
                true
            }
        }
    }

    /// Stop a guild's loop, if one exists. Unknown guilds are a no-op.
    pub fn unwatch(&self, guild_id: i64) {
        if let Some((_, cancel)) = self.watched.remove(&guild_id) {
            // Receiver may already be gone; nothing to do then.
            let _ = cancel.send(true);
            info!(guild = guild_id, "stopped watching guild");
        }
    }

    pub fn is_watched(&self, guild_id: i64) -> bool {
        self.watched.contains_key(&guild_id)
    }

    /// Run a single poll cycle against the given state cache.
    ///
    /// The loop calls this once per tick; it is public so embedders and
    /// tests can drive cycles directly.
    pub async fn poll_once(&self, guild: &TrackedGuild, cache: &TtlCache<ReportState>) {
        check_changes(&self.client, &self.handler, guild, cache).await;
    }
}

async fn watch_loop(
    client: Arc<LogsClient>,
    handler: Arc<OnceLock<UpdateHandler>>,
    guild: TrackedGuild,
    mut shutdown: watch::Receiver<bool>,
) {
    info!(guild = guild.guild_id, "watch loop started");

    let cache = Arc::new(TtlCache::new(REPORT_STATE_TTL));
    {
        let cache = Arc::clone(&cache);
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            cache.run_eviction(EVICTION_INTERVAL, shutdown).await;
        });
    }

    let jitter = rand::rng().random_range(0..MAX_START_JITTER_MS);
    tokio::select! {
        _ = shutdown.changed() => {
            info!(guild = guild.guild_id, "watch loop stopped");
            return;
        }
        _ = sleep(Duration::from_millis(jitter)) => {}
    }

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                info!(guild = guild.guild_id, "watch loop stopped");
                return;
            }
            cycle = timeout(CYCLE_TIMEOUT, check_changes(&client, &handler, &guild, &cache)) => {
                if cycle.is_err() {
                    warn!(guild = guild.guild_id, "poll cycle timed out");
                }
            }
        }

        tokio::select! {
            _ = shutdown.changed() => {
                info!(guild = guild.guild_id, "watch loop stopped");
                return;
            }
            _ = sleep(POLL_INTERVAL) => {}
        }
    }
}

/// One poll cycle: list recent reports, classify each against the cache,
/// and emit updates for the ones that changed.
///
/// Every error in here is logged and skipped; nothing terminates the loop.
async fn check_changes(
    client: &LogsClient,
    handler: &OnceLock<UpdateHandler>,
    guild: &TrackedGuild,
    cache: &TtlCache<ReportState>,
) {
    let started = Instant::now();
    let since = Utc::now() - chrono::Duration::hours(LOOKBACK_HOURS);

    let mut reports = match client.find_reports(guild.guild_id, since).await {
        Ok(reports) => reports,
        Err(error) => {
            error!(guild = guild.guild_id, %error, "error listing guild reports");
            return;
        }
    };
    reports.retain(is_tracked_raid);
    debug!(
        guild = guild.guild_id,
        count = reports.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "loaded reports"
    );

    for report in reports {
        let outdated = is_outdated(report.end_time, Utc::now());
        let cached = cache.get(&report.code);

        let live = match classify(cached.as_ref(), report.end_time, outdated) {
            PollAction::Skip => {
                debug!(report = %report.code, "report has no changes, skipping");
                continue;
            }
            PollAction::Emit { live } => live,
        };

        let fetch_started = Instant::now();
        let details = match client
            .top_deaths_for_report(&report.code, guild.wipe_cutoff)
            .await
        {
            Ok(details) => details,
            Err(error) => {
                error!(report = %report.code, %error, "error fetching report details");
                continue;
            }
        };
        info!(
            report = %report.code,
            live,
            elapsed_ms = fetch_started.elapsed().as_millis() as u64,
            "report changed, sending update"
        );

        match handler.get() {
            Some(handler) => handler(StatsUpdate {
                guild: *guild,
                url: format!("{}/{}", REPORT_URL_BASE, report.code),
                title: report.title,
                zone: report.zone.name,
                live,
                top_deaths: details.top_deaths,
                top_first_deaths: details.top_first_deaths,
                started_by: report.owner.name,
                started_at: DateTime::from_timestamp_millis(report.start_time)
                    .unwrap_or_default(),
                last_upload: DateTime::from_timestamp_millis(report.end_time)
                    .unwrap_or_default(),
                report_code: report.code.clone(),
            }),
            None => warn!(report = %report.code, "no update handler registered, dropping update"),
        }

        cache.insert(
            report.code,
            ReportState {
                end_time: report.end_time,
                is_live: live,
            },
        );
    }
}
