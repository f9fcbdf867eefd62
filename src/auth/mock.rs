use async_trait::async_trait;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::{AuthError, ClientCredentials, Grant, TokenExchange, TokenPair};

/// A scripted token endpoint for tests. Returns the same outcome every call
/// and counts how often it was asked.
pub struct MockTokenExchange {
    outcome: Result<TokenPair, AuthError>,
    reject_refresh: bool,
    calls: AtomicUsize,
    grants: Mutex<Vec<Grant>>,
}

impl MockTokenExchange {
    pub fn new(outcome: Result<TokenPair, AuthError>) -> Self {
        Self {
            outcome,
            reject_refresh: false,
            calls: AtomicUsize::new(0),
            grants: Mutex::new(Vec::new()),
        }
    }

    /// Issues `access`/`refresh` for any grant.
    pub fn issuing(access: &str, refresh: &str) -> Self {
        Self::new(Ok(TokenPair {
            access_token: access.to_string(),
            refresh_token: refresh.to_string(),
            expires_at: None,
        }))
    }

    pub fn failing(error: AuthError) -> Self {
        Self::new(Err(error))
    }

    /// Answer every refresh grant with `invalid_grant`, as for a revoked token.
    pub fn rejecting_refresh_tokens(mut self) -> Self {
        self.reject_refresh = true;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every grant presented so far, oldest first.
    pub fn grants(&self) -> Vec<Grant> {
        self.grants
            .lock()
            .map(|grants| grants.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl TokenExchange for MockTokenExchange {
    async fn exchange(
        &self,
        _client: &ClientCredentials,
        grant: &Grant,
    ) -> Result<TokenPair, AuthError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut grants) = self.grants.lock() {
            grants.push(grant.clone());
        }
        if self.reject_refresh && matches!(grant, Grant::RefreshToken(_)) {
            return Err(AuthError::InvalidGrant);
        }
        self.outcome.clone()
    }
}
