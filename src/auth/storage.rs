use std::sync::{Mutex, MutexGuard};

use anyhow::{Result, anyhow};
use rusqlite::{Connection, OptionalExtension};

use super::{ClientCredentials, CredentialSource, Credentials, Grant, TokenPair};
use crate::consts::ENV_PREFIX;

/// Names of the secrets the store knows about.
pub const SECRET_NAMES: &[&str] = &[
    CLIENT_ID,
    CLIENT_SECRET,
    AUTHORIZATION_CODE,
    REFRESH_TOKEN,
];

const CLIENT_ID: &str = "client_id";
const CLIENT_SECRET: &str = "client_secret";
const AUTHORIZATION_CODE: &str = "authorization_code";
const REFRESH_TOKEN: &str = "refresh_token";
/// Last authorization code retired, so an env-supplied code is used once.
const CONSUMED_CODE: &str = "consumed_authorization_code";

type EnvLookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Manages client credentials and grants in SQLite.
///
/// Shares a database with [`Config`](crate::config::Config). Every secret
/// falls back to `CARLOCK_<NAME>` from the environment when not stored.
pub struct CredentialStore {
    conn: Mutex<Connection>,
    env: EnvLookup,
}

impl CredentialStore {
    /// Open or create a credentials table in the given database path.
    /// Use `":memory:"` for tests.
    pub fn open(path: &str) -> Result<Self> {
        Self::with_env(path, |name| std::env::var(name).ok())
    }

    /// Like [`open`](Self::open) with an explicit environment lookup.
    pub fn with_env(
        path: &str,
        env: impl Fn(&str) -> Option<String> + Send + Sync + 'static,
    ) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS credentials (
                name  TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
            env: Box::new(env),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("credential store connection poisoned"))
    }

    fn stored(&self, name: &str) -> Result<Option<String>> {
        let conn = self.conn()?;
        let value = conn
            .query_row(
                "SELECT value FROM credentials WHERE name = ?1",
                [name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn from_env(&self, name: &str) -> Option<String> {
        let var = format!("{ENV_PREFIX}{}", name.to_ascii_uppercase());
        (self.env)(&var).filter(|v| !v.is_empty())
    }

    /// Stored value first, then the environment.
    pub fn get(&self, name: &str) -> Result<Option<String>> {
        if let Some(value) = self.stored(name)? {
            return Ok(Some(value));
        }
        Ok(self.from_env(name))
    }

    /// Store a secret (upsert).
    pub fn set(&self, name: &str, value: &str) -> Result<()> {
        if !SECRET_NAMES.contains(&name) {
            anyhow::bail!("unknown secret: {name}");
        }
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO credentials (name, value) VALUES (?1, ?2)
             ON CONFLICT(name) DO UPDATE SET value = excluded.value",
            [name, value],
        )?;
        Ok(())
    }

    /// Remove a stored secret. Environment values are unaffected.
    pub fn remove(&self, name: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM credentials WHERE name = ?1", [name])?;
        Ok(())
    }

    /// The registered OAuth client, if both halves are available.
    pub fn client(&self) -> Result<Option<ClientCredentials>> {
        match (self.get(CLIENT_ID)?, self.get(CLIENT_SECRET)?) {
            (Some(client_id), Some(client_secret)) => Ok(Some(ClientCredentials {
                client_id,
                client_secret,
            })),
            _ => Ok(None),
        }
    }

    /// The authorization code that has not been sent to the provider yet.
    ///
    /// Nothing is consumed here; see [`CredentialSource::retire`]. An
    /// environment code that was already retired is ignored until it changes.
    pub fn pending_authorization_code(&self) -> Result<Option<String>> {
        if let Some(code) = self.stored(AUTHORIZATION_CODE)? {
            return Ok(Some(code));
        }
        let Some(code) = self.from_env(AUTHORIZATION_CODE) else {
            return Ok(None);
        };
        if self.stored(CONSUMED_CODE)?.as_deref() == Some(code.as_str()) {
            tracing::warn!("authorization code from environment was already used");
            return Ok(None);
        }
        Ok(Some(code))
    }

    /// Delete stored tokens. Client credentials stay.
    pub fn clear_tokens(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "DELETE FROM credentials WHERE name IN (?1, ?2)",
            [AUTHORIZATION_CODE, REFRESH_TOKEN],
        )?;
        Ok(())
    }
}

impl CredentialSource for CredentialStore {
    /// A refresh token is preferred since it survives; otherwise the
    /// pending authorization code.
    fn load(&self) -> Result<Option<Credentials>> {
        let Some(client) = self.client()? else {
            tracing::warn!("client id or secret not configured");
            return Ok(None);
        };

        if let Some(token) = self.get(REFRESH_TOKEN)? {
            return Ok(Some(Credentials {
                client,
                grant: Grant::RefreshToken(token),
            }));
        }

        Ok(self.pending_authorization_code()?.map(|code| Credentials {
            client,
            grant: Grant::AuthorizationCode(code),
        }))
    }

    fn rotate(&self, tokens: &TokenPair) -> Result<()> {
        self.set(REFRESH_TOKEN, &tokens.refresh_token)
    }

    fn retire(&self, grant: &Grant) -> Result<()> {
        let conn = self.conn()?;
        match grant {
            Grant::AuthorizationCode(code) => {
                conn.execute(
                    "DELETE FROM credentials WHERE name = ?1 AND value = ?2",
                    [AUTHORIZATION_CODE, code.as_str()],
                )?;
                // Remembered so an environment code is not sent twice.
                conn.execute(
                    "INSERT INTO credentials (name, value) VALUES (?1, ?2)
                     ON CONFLICT(name) DO UPDATE SET value = excluded.value",
                    [CONSUMED_CODE, code.as_str()],
                )?;
            }
            Grant::RefreshToken(token) => {
                conn.execute(
                    "DELETE FROM credentials WHERE name = ?1 AND value = ?2",
                    [REFRESH_TOKEN, token.as_str()],
                )?;
            }
        }
        tracing::debug!(grant = ?grant, "grant retired");
        Ok(())
    }
}
