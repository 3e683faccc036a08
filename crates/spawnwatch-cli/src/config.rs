//! Runtime configuration from the process environment and an optional `.env`.
//!
//! Variables already set in the environment win over the `.env` file.

use std::collections::HashMap;
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::bail;

pub const DEFAULT_DATABASE: &str = "pokemon_database.json";
/// Poketwo's user id.
pub const DEFAULT_GAME_BOT_ID: &str = "716390085896962058";
pub const DEFAULT_API_BASE: &str = "https://discord.com/api/v10";
const DEFAULT_FETCH_TIMEOUT_S: u64 = 20;
const DEFAULT_WORKERS: usize = 4;
const DEFAULT_LOG_FILTER: &str = "info";

#[derive(Clone)]
pub struct Config {
    pub bot_token: Option<String>,
    pub database: PathBuf,
    pub game_bot_id: String,
    pub self_id: Option<String>,
    pub events: Option<PathBuf>,
    pub api_base: String,
    pub fetch_timeout: Duration,
    /// Threads downloading and hashing spawn images in `watch`.
    pub workers: usize,
    pub log_filter: String,
    pub log_json: bool,
    /// Problems found while reading values; logged once tracing is up.
    pub warnings: Vec<String>,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field(
                "bot_token",
                if self.bot_token.is_some() {
                    &"<redacted>"
                } else {
                    &"<not set>"
                },
            )
            .field("database", &self.database)
            .field("game_bot_id", &self.game_bot_id)
            .field("self_id", &self.self_id)
            .field("events", &self.events)
            .field("api_base", &self.api_base)
            .field("fetch_timeout", &self.fetch_timeout)
            .field("workers", &self.workers)
            .field("log_filter", &self.log_filter)
            .field("log_json", &self.log_json)
            .finish()
    }
}

impl Config {
    pub fn load() -> Self {
        let mut vars = parse_dotenv(Path::new(".env"));
        vars.extend(env::vars());
        Self::from_vars(&vars)
    }

    pub fn from_vars(vars: &HashMap<String, String>) -> Self {
        let mut warnings = Vec::new();
        let fetch_timeout_s = positive(
            vars,
            "SPAWNWATCH_FETCH_TIMEOUT_S",
            DEFAULT_FETCH_TIMEOUT_S,
            &mut warnings,
        );
        let workers = positive(vars, "SPAWNWATCH_WORKERS", DEFAULT_WORKERS, &mut warnings);

        Self {
            bot_token: non_empty(vars, "DISCORD_BOT_TOKEN"),
            database: non_empty(vars, "SPAWNWATCH_DATABASE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE)),
            game_bot_id: non_empty(vars, "SPAWNWATCH_GAME_BOT_ID")
                .unwrap_or_else(|| DEFAULT_GAME_BOT_ID.to_string()),
            self_id: non_empty(vars, "SPAWNWATCH_SELF_ID"),
            events: non_empty(vars, "SPAWNWATCH_EVENTS").map(PathBuf::from),
            api_base: non_empty(vars, "SPAWNWATCH_API_BASE")
                .map(|value| value.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            fetch_timeout: Duration::from_secs(fetch_timeout_s),
            workers,
            log_filter: non_empty(vars, "RUST_LOG")
                .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string()),
            log_json: non_empty(vars, "SPAWNWATCH_LOG_FORMAT")
                .is_some_and(|value| value.eq_ignore_ascii_case("json")),
            warnings,
        }
    }

    pub fn require_token(&self) -> anyhow::Result<&str> {
        match self.bot_token.as_deref() {
            Some(token) => Ok(token),
            None => bail!(
                "No Discord bot token found. Set DISCORD_BOT_TOKEN in the environment or a .env file."
            ),
        }
    }
}

fn non_empty(vars: &HashMap<String, String>, key: &str) -> Option<String> {
    vars.get(key)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn positive<T>(vars: &HashMap<String, String>, key: &str, default: T, warnings: &mut Vec<String>) -> T
where
    T: std::str::FromStr + PartialOrd + Default + fmt::Display,
{
    let Some(raw) = non_empty(vars, key) else {
        return default;
    };
    match raw.parse::<T>() {
        Ok(value) if value > T::default() => value,
        _ => {
            warnings.push(format!(
                "{key}={raw} is not a positive integer; using {default}"
            ));
            default
        }
    }
}

fn parse_dotenv(path: &Path) -> HashMap<String, String> {
    let Ok(content) = std::fs::read_to_string(path) else {
        return HashMap::new();
    };
    content.lines().filter_map(dotenv_pair).collect()
}

fn dotenv_pair(line: &str) -> Option<(String, String)> {
    let line = line.trim();
    if line.starts_with('#') {
        return None;
    }
    let line = line.strip_prefix("export ").map_or(line, str::trim_start);
    let (key, value) = line.split_once('=')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    Some((key.to_string(), unquote(value.trim()).to_string()))
}

fn unquote(value: &str) -> &str {
    ['"', '\'']
        .into_iter()
        .find_map(|quote| value.strip_prefix(quote)?.strip_suffix(quote))
        .unwrap_or(value)
}
