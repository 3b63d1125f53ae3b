//! Raidwatch: combat log report watcher.
//!
//! Polls the log service for each tracked guild and emits a structured
//! update whenever a shared report is newly created, updated, or has gone
//! quiet.

use clap::{Parser, Subcommand};
use miette::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use raidwatch_watcher::TrackedGuild;

mod daemon;

/// Parse a `<guild-id>:<wipe-cutoff>` guild spec.
fn parse_guild(s: &str) -> Result<TrackedGuild, String> {
    let (id, cutoff) = s.split_once(':').ok_or_else(|| {
        format!(
            "invalid guild spec '{}', expected <guild-id>:<wipe-cutoff>",
            s
        )
    })?;
    let guild_id = id
        .parse()
        .map_err(|_| format!("invalid guild id '{}'", id))?;
    let wipe_cutoff = cutoff
        .parse()
        .map_err(|_| format!("invalid wipe cutoff '{}'", cutoff))?;
    Ok(TrackedGuild {
        guild_id,
        wipe_cutoff,
    })
}

#[derive(Parser)]
#[command(name = "raidwatch")]
#[command(about = "Combat log report watcher", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch the configured guilds and log every report update
    Daemon {
        /// OAuth client id for the log service
        #[arg(long, env = "WCL_CLIENT_ID")]
        client_id: String,

        /// OAuth client secret for the log service
        #[arg(long, env = "WCL_CLIENT_SECRET")]
        client_secret: String,

        /// Tracked guild as <guild-id>:<wipe-cutoff>; repeatable
        #[arg(long = "guild", value_parser = parse_guild, required = true)]
        guilds: Vec<TrackedGuild>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "raidwatch=info".to_string()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Daemon {
            client_id,
            client_secret,
            guilds,
        } => daemon::run(&client_id, &client_secret, &guilds).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_guild_spec() {
        let guild = parse_guild("1234:3").unwrap();
        assert_eq!(guild.guild_id, 1234);
        assert_eq!(guild.wipe_cutoff, 3);
    }

    #[test]
    fn rejects_malformed_guild_specs() {
        assert!(parse_guild("1234").is_err());
        assert!(parse_guild("abc:3").is_err());
        assert!(parse_guild("1234:x").is_err());
    }
}
