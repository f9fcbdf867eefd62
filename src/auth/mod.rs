//! OAuth2 credentials and the token exchange seam.

pub mod mock;
pub mod oauth;
pub mod storage;

pub use oauth::TokenClient;
pub use storage::CredentialStore;

use anyhow::{Context, Result};
use async_trait::async_trait;

/// Failures of the token endpoint.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// The authorization code or refresh token was rejected: already used,
    /// expired, or never valid. The user must authorize again out of band.
    #[error("authorization grant is invalid, expired or already used")]
    InvalidGrant,
    #[error("token endpoint request failed: {0}")]
    Transport(String),
}

/// The OAuth client registered with the provider.
#[derive(Clone, PartialEq, Eq)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: String,
}

impl std::fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"***")
            .finish()
    }
}

/// What gets traded for a token pair.
#[derive(Clone, PartialEq, Eq)]
pub enum Grant {
    /// Single use and short lived.
    AuthorizationCode(String),
    RefreshToken(String),
}

impl Grant {
    pub fn grant_type(&self) -> &'static str {
        match self {
            Grant::AuthorizationCode(_) => "authorization_code",
            Grant::RefreshToken(_) => "refresh_token",
        }
    }
}

impl std::fmt::Debug for Grant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Grant({})", self.grant_type())
    }
}

/// Everything one invocation needs to obtain its own access token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub client: ClientCredentials,
    pub grant: Grant,
}

/// Tokens issued by the provider. Owned by a single invocation.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Expiration timestamp in milliseconds since epoch, when the provider reports one.
    pub expires_at: Option<u64>,
}

impl TokenPair {
    pub fn is_expired(&self) -> bool {
        self.expires_at
            .is_some_and(|expires| oauth::now_ms() >= expires)
    }
}

impl std::fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &"***")
            .field("refresh_token", &"***")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Trades a grant for tokens at the provider's token endpoint.
#[async_trait]
pub trait TokenExchange: Send + Sync {
    async fn exchange(
        &self,
        client: &ClientCredentials,
        grant: &Grant,
    ) -> std::result::Result<TokenPair, AuthError>;
}

/// Supplies per-invocation credentials and takes back rotated tokens.
pub trait CredentialSource: Send + Sync {
    /// Credentials for one invocation, or `None` when the user has not
    /// authorized yet. Nothing is consumed until [`retire`](Self::retire).
    fn load(&self) -> Result<Option<Credentials>>;

    /// Keep the refresh token issued by a successful exchange.
    fn rotate(&self, tokens: &TokenPair) -> Result<()>;

    /// The provider answered for this grant, accepting or rejecting it.
    /// It must never be sent again.
    fn retire(&self, grant: &Grant) -> Result<()>;

    /// Record the outcome of one exchange: retire what was spent, then keep
    /// whatever was issued in its place.
    fn settle(&self, spent: Option<&Grant>, issued: Option<&TokenPair>) -> Result<()> {
        if let Some(grant) = spent {
            self.retire(grant)?;
        }
        if let Some(tokens) = issued {
            self.rotate(tokens)?;
        }
        Ok(())
    }
}

/// Complete a login: exchange the authorization code and keep the refresh
/// token so later invocations can use it as their grant.
///
/// This is the shared logic behind `carlock login`.
pub async fn login(
    store: &CredentialStore,
    exchange: &dyn TokenExchange,
    code: &str,
) -> Result<TokenPair> {
    let client = store
        .client()?
        .context("client id and secret must be configured before logging in")?;
    let tokens = exchange
        .exchange(&client, &Grant::AuthorizationCode(code.to_string()))
        .await
        .context("token exchange failed")?;
    store
        .rotate(&tokens)
        .context("failed to save refresh token")?;
    Ok(tokens)
}

/// Remove stored tokens. Client credentials are kept.
pub fn logout(store: &CredentialStore) -> Result<()> {
    store.clear_tokens().context("failed to remove tokens")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grant_type_names() {
        assert_eq!(
            Grant::AuthorizationCode("c".into()).grant_type(),
            "authorization_code"
        );
        assert_eq!(Grant::RefreshToken("r".into()).grant_type(), "refresh_token");
    }

    #[test]
    fn debug_output_hides_secrets() {
        let creds = Credentials {
            client: ClientCredentials {
                client_id: "id".into(),
                client_secret: "top-secret".into(),
            },
            grant: Grant::AuthorizationCode("one-time-code".into()),
        };
        let pair = TokenPair {
            access_token: "access-secret".into(),
            refresh_token: "refresh-secret".into(),
            expires_at: None,
        };
        let out = format!("{creds:?} {pair:?}");
        assert!(!out.contains("top-secret"));
        assert!(!out.contains("one-time-code"));
        assert!(!out.contains("access-secret"));
        assert!(!out.contains("refresh-secret"));
    }

    #[test]
    fn token_pair_expiry() {
        let mut pair = TokenPair {
            access_token: "a".into(),
            refresh_token: "r".into(),
            expires_at: None,
        };
        assert!(!pair.is_expired());
        pair.expires_at = Some(0);
        assert!(pair.is_expired());
        pair.expires_at = Some(u64::MAX);
        assert!(!pair.is_expired());
    }
}
