//! Daemon command wiring the client, the watch supervisor, and a logging
//! delivery sink.

use std::sync::Arc;

use miette::{IntoDiagnostic, Result};
use tracing::info;

use raidwatch_logs::{LogsClient, LogsConfig};
use raidwatch_watcher::{TrackedGuild, Watcher};

pub async fn run(client_id: &str, client_secret: &str, guilds: &[TrackedGuild]) -> Result<()> {
    // An initial token failure is fatal; there is no point starting loops
    // that cannot authenticate.
    let client = LogsClient::connect(LogsConfig::new(client_id, client_secret))
        .await
        .into_diagnostic()?;
    let watcher = Watcher::new(Arc::new(client));

    // Delivery sink. Real deployments bridge this to a chat platform; the
    // standalone daemon logs each update as structured output.
    watcher.on_update(|update| {
        info!(
            guild = update.guild.guild_id,
            report = %update.report_code,
            title = %update.title,
            zone = %update.zone,
            url = %update.url,
            live = update.live,
            top_deaths = ?update.top_deaths,
            top_first_deaths = ?update.top_first_deaths,
            "report update"
        );
    });

    for guild in guilds {
        watcher.watch(*guild);
        info!(guild = guild.guild_id, "watching guild");
    }

    tokio::signal::ctrl_c().await.into_diagnostic()?;

    info!("shutting down");
    for guild in guilds {
        watcher.unwatch(guild.guild_id);
    }
    Ok(())
}
