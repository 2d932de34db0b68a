//! Runtime configuration, taken from flags or environment variables.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

/// Node configuration for the stash server.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "stash-store",
    about = "In-memory NoSQL record stash with periodic snapshots"
)]
pub struct Config {
    /// Path to the snapshot file.
    #[arg(long = "store-file", env = "STORE_FILE", default_value = "db/stash.data")]
    pub store_file: PathBuf,

    /// Interval between periodic snapshots; `0` disables periodic saving.
    #[arg(
        long = "store-interval",
        env = "STORE_INTERVAL",
        default_value = "5s",
        value_parser = parse_interval
    )]
    pub store_interval: Duration,

    /// Load the snapshot file on startup.
    #[arg(
        long = "restore",
        env = "RESTORE",
        default_value_t = true,
        action = clap::ArgAction::Set
    )]
    pub restore: bool,
}

/// Accepts `500ms`, `5s`, `2m`, or a bare number of seconds.
fn parse_interval(raw: &str) -> Result<Duration, String> {
    let raw = raw.trim();
    if let Some(ms) = raw.strip_suffix("ms") {
        return parse_number(ms).map(Duration::from_millis);
    }
    if let Some(secs) = raw.strip_suffix('s') {
        return parse_number(secs).map(Duration::from_secs);
    }
    if let Some(mins) = raw.strip_suffix('m') {
        return parse_number(mins).map(|m| Duration::from_secs(m * 60));
    }
    parse_number(raw).map(Duration::from_secs)
}

fn parse_number(raw: &str) -> Result<u64, String> {
    raw.trim()
        .parse::<u64>()
        .map_err(|err| format!("invalid interval: {err}"))
}
