use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use super::{Request, RequestEnvelope, RequestHandler, SkillResponse};
use crate::auth::CredentialSource;
use crate::consts::LOCK_INTENTS;
use crate::engine::{Engine, Reply, TokenSource};

/// How the lock handler obtains the access token.
#[derive(Clone)]
pub enum TokenMode {
    /// Use the token the platform attaches to each request.
    AccountLinking,
    /// Exchange credentials from the local store.
    Stored(Arc<dyn CredentialSource>),
}

/// Launching the skill or asking it to lock both lock the car.
pub struct LockHandler {
    engine: Arc<dyn Engine>,
    tokens: TokenMode,
}

impl LockHandler {
    pub fn new(engine: Arc<dyn Engine>, tokens: TokenMode) -> Self {
        Self { engine, tokens }
    }
}

#[async_trait]
impl RequestHandler for LockHandler {
    fn name(&self) -> &str {
        "lock"
    }

    fn can_handle(&self, request: &Request) -> bool {
        matches!(request, Request::Launch {})
            || request
                .intent_name()
                .is_some_and(|name| LOCK_INTENTS.contains(&name))
    }

    async fn handle(&self, envelope: &RequestEnvelope) -> Result<SkillResponse> {
        let source = match &self.tokens {
            TokenMode::AccountLinking => {
                TokenSource::AccountLinked(envelope.access_token().map(str::to_string))
            }
            TokenMode::Stored(store) => TokenSource::Grant(store.load()?),
        };

        let report = self.engine.run_detailed(source).await;

        if let TokenMode::Stored(store) = &self.tokens {
            // The reply stands even if the store cannot be updated.
            if let Err(e) = store.settle(report.spent.as_ref(), report.issued.as_ref()) {
                tracing::warn!(error = %e, "failed to update stored credentials");
            }
        }

        let response = SkillResponse::speak(report.reply.text());
        Ok(match report.reply {
            Reply::LinkAccount => response.with_link_account_card(),
            _ => response,
        })
    }
}
