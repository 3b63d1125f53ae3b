//! Log service client: OAuth token lifecycle and GraphQL execution.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::LogsError;
use crate::stats::DeathTally;
use crate::types::{DeathEvent, Fight, Report, ReportDetails};

/// Production OAuth token endpoint.
const DEFAULT_TOKEN_URL: &str = "https://www.warcraftlogs.com/oauth/token";

/// Production GraphQL endpoint.
const DEFAULT_API_URL: &str = "https://www.warcraftlogs.com/api/v2/client";

/// A token within this margin of expiry is treated as already expired.
const TOKEN_SKEW: Duration = Duration::from_secs(60);

/// Hard cap on followed event pages per fight. Exceeding it truncates
/// with a warning instead of failing.
const MAX_EVENT_PAGES: usize = 10;

/// Maximum reports returned per guild listing.
const REPORTS_LIMIT: u32 = 10;

/// Client configuration. The URLs default to the production endpoints and
/// are overridable for tests.
#[derive(Debug, Clone)]
pub struct LogsConfig {
    pub client_id: String,
    pub client_secret: String,
    pub token_url: String,
    pub api_url: String,
}

impl LogsConfig {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            token_url: DEFAULT_TOKEN_URL.to_string(),
            api_url: DEFAULT_API_URL.to_string(),
        }
    }
}

#[derive(Default)]
struct TokenState {
    access_token: String,
    expires_at: Option<Instant>,
}

impl TokenState {
    /// True while the token has more than the skew margin left.
    fn is_fresh(&self) -> bool {
        !self.access_token.is_empty()
            && self
                .expires_at
                .is_some_and(|at| Instant::now() + TOKEN_SKEW < at)
    }
}

/// Client for the log service's OAuth and GraphQL endpoints.
///
/// One instance is shared by all guild watch loops; the token state is
/// internally synchronized so concurrent callers trigger at most one
/// exchange per expiry window.
pub struct LogsClient {
    http: Client,
    config: LogsConfig,
    token: RwLock<TokenState>,
}

impl LogsClient {
    /// Build the client and perform the initial token exchange.
    ///
    /// An initial exchange failure is fatal and propagates to the caller.
    pub async fn connect(config: LogsConfig) -> Result<Self, LogsError> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()?;

        let client = Self {
            http,
            config,
            token: RwLock::new(TokenState::default()),
        };
        client.refresh_token().await?;
        Ok(client)
    }

    /// Return immediately if the cached token is fresh, otherwise refresh.
    async fn ensure_token(&self) -> Result<(), LogsError> {
        if self.token.read().await.is_fresh() {
            return Ok(());
        }
        self.refresh_token().await
    }

    /// Exchange client credentials for a fresh access token.
    ///
    /// Re-checks freshness under the write lock so that concurrent
    /// refreshers collapse to a single network round trip.
    async fn refresh_token(&self) -> Result<(), LogsError> {
        #[derive(Deserialize)]
        struct TokenResponse {
            access_token: String,
            expires_in: u64,
        }

        let mut state = self.token.write().await;
        if state.is_fresh() {
            return Ok(());
        }

        let response = self
            .http
            .post(&self.config.token_url)
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(LogsError::Auth(format!(
                "token exchange failed ({}): {}",
                status, body
            )));
        }

        let token: TokenResponse = response.json().await?;
        state.access_token = token.access_token;
        state.expires_at = Some(Instant::now() + Duration::from_secs(token.expires_in));
        debug!(expires_in = token.expires_in, "refreshed access token");
        Ok(())
    }

    async fn execute(&self, body: &serde_json::Value) -> Result<reqwest::Response, LogsError> {
        let token = self.token.read().await.access_token.clone();
        let response = self
            .http
            .post(&self.config.api_url)
            .bearer_auth(token)
            .json(body)
            .send()
            .await?;
        Ok(response)
    }

    /// Execute one GraphQL query.
    ///
    /// On HTTP 401 the refresh path is re-run and the request retried
    /// exactly once; any further failure surfaces unretried. A transport
    /// success that embeds application errors fails with the first
    /// reported message, and a null/absent data payload is also a failure.
    async fn graphql<T: DeserializeOwned>(
        &self,
        query: &str,
        variables: serde_json::Value,
    ) -> Result<T, LogsError> {
        #[derive(Deserialize)]
        struct Envelope {
            #[serde(default)]
            data: Option<serde_json::Value>,
            #[serde(default)]
            errors: Vec<GraphQLError>,
        }

        #[derive(Deserialize)]
        struct GraphQLError {
            message: String,
        }

        self.ensure_token().await?;

        let body = json!({ "query": query, "variables": variables });

        let mut response = self.execute(&body).await?;
        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            debug!("got 401 from graphql endpoint, refreshing token");
            self.refresh_token().await?;
            response = self.execute(&body).await?;
        }

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LogsError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let envelope: Envelope = response.json().await?;
        if let Some(error) = envelope.errors.first() {
            return Err(LogsError::GraphQL(error.message.clone()));
        }
        match envelope.data {
            Some(data) if !data.is_null() => Ok(serde_json::from_value(data)?),
            _ => Err(LogsError::EmptyData),
        }
    }

    /// List up to 10 most recent reports for a guild since a time boundary.
    ///
    /// Ordering is whatever the service returns; it is not re-sorted.
    pub async fn find_reports(
        &self,
        guild_id: i64,
        since: DateTime<Utc>,
    ) -> Result<Vec<Report>, LogsError> {
        const QUERY: &str = r#"
query($guildID: Int!, $limit: Int!, $startTime: Float!) {
  reportData {
    reports(guildID: $guildID, limit: $limit, startTime: $startTime) {
      data {
        code
        title
        startTime
        endTime
        owner { name }
        zone {
          name
          difficulties { name sizes }
        }
      }
    }
  }
}"#;

        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct ReportsData {
            report_data: ReportsContainer,
        }

        #[derive(Deserialize)]
        struct ReportsContainer {
            reports: ReportsPage,
        }

        #[derive(Deserialize)]
        struct ReportsPage {
            #[serde(default)]
            data: Vec<Report>,
        }

        let variables = json!({
            "guildID": guild_id,
            "startTime": since.timestamp_millis() as f64,
            "limit": REPORTS_LIMIT,
        });

        let data: ReportsData = self.graphql(QUERY, variables).await?;
        Ok(data.report_data.reports.data)
    }

    /// List the boss fights of a report. Trash fights are excluded by the
    /// query itself (`killType: Encounters`).
    pub async fn boss_fights(&self, code: &str) -> Result<Vec<Fight>, LogsError> {
        const QUERY: &str = r#"
query($code: String!) {
  reportData {
    report(code: $code) {
      fights(killType: Encounters) {
        id
        encounterID
        name
        startTime
        endTime
        difficulty
        kill
      }
    }
  }
}"#;

        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct FightsData {
            report_data: FightsContainer,
        }

        #[derive(Deserialize)]
        struct FightsContainer {
            report: Option<FightsReport>,
        }

        #[derive(Deserialize)]
        struct FightsReport {
            #[serde(default)]
            fights: Vec<Fight>,
        }

        let data: FightsData = self.graphql(QUERY, json!({ "code": code })).await?;
        Ok(data
            .report_data
            .report
            .map(|r| r.fights)
            .unwrap_or_default())
    }

    /// Fetch all death events for one fight, following the server's
    /// next-page cursor up to [`MAX_EVENT_PAGES`] pages.
    ///
    /// Malformed individual events are skipped with a warning. The result
    /// is sorted by timestamp ascending, since cross-page order is not
    /// guaranteed to be chronological.
    pub async fn death_events(
        &self,
        code: &str,
        fight_id: i64,
        wipe_cutoff: i64,
    ) -> Result<Vec<DeathEvent>, LogsError> {
        const QUERY: &str = r#"
query($code: String!, $fightId: Int!, $wipeCutoff: Int!, $startTime: Float) {
  reportData {
    report(code: $code) {
      events(
        dataType: Deaths
        hostilityType: Friendlies
        killType: Encounters
        fightIDs: [$fightId]
        limit: 1000
        useAbilityIDs: true
        useActorIDs: false
        wipeCutoff: $wipeCutoff
        startTime: $startTime
      ) {
        data
        nextPageTimestamp
      }
    }
  }
}"#;

        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct EventsData {
            report_data: EventsContainer,
        }

        #[derive(Deserialize)]
        struct EventsContainer {
            report: Option<EventsReport>,
        }

        #[derive(Deserialize)]
        struct EventsReport {
            events: EventsPage,
        }

        #[derive(Deserialize, Default)]
        #[serde(rename_all = "camelCase")]
        struct EventsPage {
            #[serde(default)]
            data: Vec<serde_json::Value>,
            next_page_timestamp: Option<f64>,
        }

        let mut deaths = Vec::new();
        let mut cursor: Option<f64> = None;
        let mut pages = 0usize;

        loop {
            let mut variables = json!({
                "code": code,
                "fightId": fight_id,
                "wipeCutoff": wipe_cutoff,
            });
            if let Some(ts) = cursor {
                variables["startTime"] = json!(ts);
            }

            let data: EventsData = self.graphql(QUERY, variables).await?;
            let page = data
                .report_data
                .report
                .map(|r| r.events)
                .unwrap_or_default();

            for raw in page.data {
                match serde_json::from_value::<DeathEvent>(raw) {
                    Ok(event) => deaths.push(event),
                    Err(error) => warn!(%error, "skipping malformed death event"),
                }
            }

            let Some(next) = page.next_page_timestamp else {
                break;
            };
            cursor = Some(next);

            pages += 1;
            if pages >= MAX_EVENT_PAGES {
                warn!(
                    max_pages = MAX_EVENT_PAGES,
                    report = %code,
                    fight = fight_id,
                    "pagination aborted: exceeded max pages"
                );
                break;
            }
        }

        deaths.sort_by_key(|d| d.timestamp);
        Ok(deaths)
    }

    /// Build the two ranked leaderboards for a report.
    ///
    /// A report with no boss fights yields two empty boards without error.
    pub async fn top_deaths_for_report(
        &self,
        code: &str,
        wipe_cutoff: i64,
    ) -> Result<ReportDetails, LogsError> {
        let fights = self.boss_fights(code).await?;
        if fights.is_empty() {
            return Ok(ReportDetails::default());
        }

        let mut tally = DeathTally::new();
        for fight in &fights {
            let events = self.death_events(code, fight.id, wipe_cutoff).await?;
            tally.record_fight(&events);
        }
        Ok(tally.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults_to_production_endpoints() {
        let config = LogsConfig::new("id", "secret");
        assert_eq!(config.token_url, DEFAULT_TOKEN_URL);
        assert_eq!(config.api_url, DEFAULT_API_URL);
    }

    #[test]
    fn empty_token_is_never_fresh() {
        let state = TokenState::default();
        assert!(!state.is_fresh());
    }

    #[test]
    fn token_within_skew_is_stale() {
        let state = TokenState {
            access_token: "tok".to_string(),
            expires_at: Some(Instant::now() + Duration::from_secs(30)),
        };
        assert!(!state.is_fresh());

        let state = TokenState {
            access_token: "tok".to_string(),
            expires_at: Some(Instant::now() + Duration::from_secs(300)),
        };
        assert!(state.is_fresh());
    }
}
