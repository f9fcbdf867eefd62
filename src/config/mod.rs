//! Key-value configuration storage backed by SQLite, and the resolved
//! [`Settings`] the skill runs with.
//!
//! Shares a database with [`CredentialStore`](crate::auth::CredentialStore).
//! Every stored key can be overridden from the environment as
//! `CARLOCK_<KEY>` (upper-cased), which is how a hosted deployment injects
//! configuration without touching the database.

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use rusqlite::Connection;

use crate::consts::{
    DEFAULT_API_BASE_URL, DEFAULT_AUTHORIZE_URL, DEFAULT_REDIRECT_URI, DEFAULT_SCOPES,
    DEFAULT_TOKEN_URL, ENV_PREFIX,
};
use crate::engine::VehicleSelector;
use crate::vehicle::lock::PollConfig;

/// Keys accepted by `carlock config set`.
pub const KNOWN_KEYS: &[&str] = &[
    "token_url",
    "authorize_url",
    "api_base_url",
    "redirect_uri",
    "scopes",
    "vehicle_id",
    "auth_mode",
    "max_commands",
    "initial_backoff_ms",
    "max_backoff_ms",
    "deadline_secs",
    "request_timeout_secs",
];

/// Persistent key-value configuration store.
pub struct Config {
    conn: Mutex<Connection>,
}

impl Config {
    /// Open or create the config table in the given database.
    /// Use `":memory:"` for tests.
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path).context("failed to open config database")?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS config (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
        )
        .context("failed to create config table")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("config connection poisoned"))
    }

    /// Get a config value by key.
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT value FROM config WHERE key = ?1")?;
        let mut rows = stmt.query([key])?;
        match rows.next()? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }

    /// Set a config value (upsert). Rejects keys the skill does not read.
    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        if !KNOWN_KEYS.contains(&key) {
            bail!("unknown config key: {key}");
        }
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO config (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            [key, value],
        )?;
        Ok(())
    }

    /// Remove a config key.
    pub fn remove(&self, key: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM config WHERE key = ?1", [key])?;
        Ok(())
    }

    /// All stored pairs, sorted by key.
    pub fn list(&self) -> Result<Vec<(String, String)>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT key, value FROM config ORDER BY key")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

/// Where the access token for an invocation comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    /// Exchange the stored authorization code or refresh token.
    Stored,
    /// The voice platform performs OAuth and hands over the access token.
    AccountLinking,
}

impl std::str::FromStr for AuthMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "stored" => Ok(Self::Stored),
            "account_linking" => Ok(Self::AccountLinking),
            other => bail!("invalid auth_mode: {other} (expected stored or account_linking)"),
        }
    }
}

/// Everything the skill needs to know at process start.
#[derive(Debug, Clone)]
pub struct Settings {
    pub token_url: String,
    pub authorize_url: String,
    pub api_base_url: String,
    pub redirect_uri: String,
    pub scopes: String,
    pub vehicle: VehicleSelector,
    pub auth_mode: AuthMode,
    pub poll: PollConfig,
    pub request_timeout: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            token_url: DEFAULT_TOKEN_URL.to_string(),
            authorize_url: DEFAULT_AUTHORIZE_URL.to_string(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            redirect_uri: DEFAULT_REDIRECT_URI.to_string(),
            scopes: DEFAULT_SCOPES.to_string(),
            vehicle: VehicleSelector::FirstListed,
            auth_mode: AuthMode::Stored,
            poll: PollConfig::default(),
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl Settings {
    /// Resolve settings from the config store with process environment overrides.
    pub fn load(config: &Config) -> Result<Self> {
        Self::resolve(config, |name| std::env::var(name).ok())
    }

    /// Resolve settings with an explicit environment lookup.
    pub fn resolve(config: &Config, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let lookup = |key: &str| -> Result<Option<String>> {
            let env_name = format!("{ENV_PREFIX}{}", key.to_ascii_uppercase());
            if let Some(value) = env(&env_name).filter(|v| !v.is_empty()) {
                return Ok(Some(value));
            }
            config.get(key)
        };

        let mut settings = Settings::default();
        if let Some(v) = lookup("token_url")? {
            settings.token_url = v;
        }
        if let Some(v) = lookup("authorize_url")? {
            settings.authorize_url = v;
        }
        if let Some(v) = lookup("api_base_url")? {
            settings.api_base_url = v.trim_end_matches('/').to_string();
        }
        if let Some(v) = lookup("redirect_uri")? {
            settings.redirect_uri = v;
        }
        if let Some(v) = lookup("scopes")? {
            settings.scopes = v;
        }
        if let Some(v) = lookup("vehicle_id")? {
            settings.vehicle = VehicleSelector::Fixed(v);
        }
        if let Some(v) = lookup("auth_mode")? {
            settings.auth_mode = v.parse()?;
        }
        if let Some(v) = lookup("max_commands")? {
            settings.poll.max_commands = u32::try_from(parse_number("max_commands", &v)?)
                .context("max_commands is too large")?;
        }
        if let Some(v) = lookup("initial_backoff_ms")? {
            settings.poll.initial_backoff =
                Duration::from_millis(parse_number("initial_backoff_ms", &v)?);
        }
        if let Some(v) = lookup("max_backoff_ms")? {
            settings.poll.max_backoff = Duration::from_millis(parse_number("max_backoff_ms", &v)?);
        }
        if let Some(v) = lookup("deadline_secs")? {
            settings.poll.deadline = Duration::from_secs(parse_number("deadline_secs", &v)?);
        }
        if let Some(v) = lookup("request_timeout_secs")? {
            settings.request_timeout =
                Duration::from_secs(parse_number("request_timeout_secs", &v)?);
        }
        Ok(settings)
    }
}

fn parse_number(key: &str, value: &str) -> Result<u64> {
    value
        .trim()
        .parse::<u64>()
        .with_context(|| format!("{key} must be a non-negative integer, got {value:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mem_config() -> Config {
        Config::open(":memory:").unwrap()
    }

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn get_returns_none_for_missing_key() {
        let config = mem_config();
        assert!(config.get("vehicle_id").unwrap().is_none());
    }

    #[test]
    fn set_and_get() {
        let config = mem_config();
        config.set("vehicle_id", "9CE2C8302183ADBD1A").unwrap();
        assert_eq!(
            config.get("vehicle_id").unwrap().unwrap(),
            "9CE2C8302183ADBD1A"
        );
    }

    #[test]
    fn set_overwrites_existing() {
        let config = mem_config();
        config.set("vehicle_id", "old").unwrap();
        config.set("vehicle_id", "new").unwrap();
        assert_eq!(config.get("vehicle_id").unwrap().unwrap(), "new");
    }

    #[test]
    fn set_rejects_unknown_key() {
        let config = mem_config();
        let err = config.set("client_secret", "oops").unwrap_err();
        assert!(err.to_string().contains("unknown config key"));
    }

    #[test]
    fn remove_deletes_key() {
        let config = mem_config();
        config.set("vehicle_id", "test").unwrap();
        config.remove("vehicle_id").unwrap();
        assert!(config.get("vehicle_id").unwrap().is_none());
    }

    #[test]
    fn list_is_sorted() {
        let config = mem_config();
        config.set("vehicle_id", "v").unwrap();
        config.set("auth_mode", "stored").unwrap();
        let keys: Vec<String> = config.list().unwrap().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["auth_mode", "vehicle_id"]);
    }

    #[test]
    fn persists_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config-test.db");
        let path_str = path.to_str().unwrap();

        {
            let config = Config::open(path_str).unwrap();
            config.set("vehicle_id", "persisted").unwrap();
        }

        {
            let config = Config::open(path_str).unwrap();
            assert_eq!(config.get("vehicle_id").unwrap().unwrap(), "persisted");
        }
    }

    #[test]
    fn defaults_without_config() {
        let settings = Settings::resolve(&mem_config(), no_env).unwrap();
        assert_eq!(settings.token_url, DEFAULT_TOKEN_URL);
        assert_eq!(settings.redirect_uri, "http://localhost");
        assert_eq!(settings.vehicle, VehicleSelector::FirstListed);
        assert_eq!(settings.auth_mode, AuthMode::Stored);
    }

    #[test]
    fn stored_values_are_applied() {
        let config = mem_config();
        config.set("vehicle_id", "WDD123").unwrap();
        config.set("max_commands", "7").unwrap();
        config.set("initial_backoff_ms", "250").unwrap();
        config.set("api_base_url", "http://127.0.0.1:9000/").unwrap();

        let settings = Settings::resolve(&config, no_env).unwrap();
        assert_eq!(settings.vehicle, VehicleSelector::Fixed("WDD123".into()));
        assert_eq!(settings.poll.max_commands, 7);
        assert_eq!(settings.poll.initial_backoff, Duration::from_millis(250));
        assert_eq!(settings.api_base_url, "http://127.0.0.1:9000");
    }

    #[test]
    fn env_takes_priority_over_stored() {
        let config = mem_config();
        config.set("vehicle_id", "from-db").unwrap();

        let settings = Settings::resolve(&config, |name| {
            (name == "CARLOCK_VEHICLE_ID").then(|| "from-env".to_string())
        })
        .unwrap();
        assert_eq!(settings.vehicle, VehicleSelector::Fixed("from-env".into()));
    }

    #[test]
    fn empty_env_is_ignored() {
        let config = mem_config();
        config.set("vehicle_id", "from-db").unwrap();

        let settings = Settings::resolve(&config, |_| Some(String::new())).unwrap();
        assert_eq!(settings.vehicle, VehicleSelector::Fixed("from-db".into()));
    }

    #[test]
    fn invalid_number_is_an_error() {
        let config = mem_config();
        config.set("deadline_secs", "soon").unwrap();
        let err = Settings::resolve(&config, no_env).unwrap_err();
        assert!(err.to_string().contains("deadline_secs"));
    }

    #[test]
    fn auth_mode_parses() {
        assert_eq!("stored".parse::<AuthMode>().unwrap(), AuthMode::Stored);
        assert_eq!(
            "account_linking".parse::<AuthMode>().unwrap(),
            AuthMode::AccountLinking
        );
        assert!("oauth".parse::<AuthMode>().is_err());
    }
}
