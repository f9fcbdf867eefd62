//! Voice platform request handlers.
//!
//! Handlers implement the [`RequestHandler`] trait and are registered in an
//! [`IntentRouter`]. The router picks the first handler that accepts a
//! request and is the outermost guard: handler errors, handler panics and
//! unhandled requests all become the same apologetic response.

pub mod envelope;
mod exit;
mod help;
mod lock;
mod session_ended;

pub use envelope::{Request, RequestEnvelope, ResponseEnvelope, SkillResponse};
pub use lock::{LockHandler, TokenMode};

use anyhow::Result;
use async_trait::async_trait;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use crate::consts::FALLBACK_MESSAGE;
use crate::engine::Engine;

/// Handles one kind of platform request.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    fn can_handle(&self, request: &Request) -> bool;

    async fn handle(&self, envelope: &RequestEnvelope) -> Result<SkillResponse>;
}

/// Holds registered handlers in priority order.
pub struct IntentRouter {
    handlers: Vec<Arc<dyn RequestHandler>>,
}

impl IntentRouter {
    /// A router with the lock, help, exit and session-ended handlers.
    pub fn new(engine: Arc<dyn Engine>, tokens: TokenMode) -> Self {
        let handlers: Vec<Arc<dyn RequestHandler>> = vec![
            Arc::new(LockHandler::new(engine, tokens)),
            Arc::new(help::HelpHandler),
            Arc::new(exit::ExitHandler),
            Arc::new(session_ended::SessionEndedHandler),
        ];
        Self { handlers }
    }

    /// A router for when the lock path cannot be set up, for example after a
    /// configuration error. Help and stop still answer; a lock request finds
    /// no handler and gets the catch-all response.
    pub fn without_lock() -> Self {
        let handlers: Vec<Arc<dyn RequestHandler>> = vec![
            Arc::new(help::HelpHandler),
            Arc::new(exit::ExitHandler),
            Arc::new(session_ended::SessionEndedHandler),
        ];
        Self { handlers }
    }

    /// Register an additional handler. Earlier handlers win.
    pub fn register(&mut self, handler: Arc<dyn RequestHandler>) {
        self.handlers.push(handler);
    }

    /// Dispatch a request. Never fails.
    pub async fn dispatch(&self, envelope: &RequestEnvelope) -> SkillResponse {
        let Some(handler) = self
            .handlers
            .iter()
            .find(|h| h.can_handle(&envelope.request))
        else {
            tracing::warn!(request = ?envelope.request, "no handler for request");
            return fallback();
        };

        tracing::debug!(handler = handler.name(), "dispatching request");
        match AssertUnwindSafe(handler.handle(envelope)).catch_unwind().await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                tracing::error!(handler = handler.name(), error = %e, "handler failed");
                fallback()
            }
            Err(_) => {
                tracing::error!(handler = handler.name(), "handler panicked");
                fallback()
            }
        }
    }

    /// Parse a raw request envelope and dispatch it. Malformed input gets the
    /// same apologetic response as any other failure.
    pub async fn dispatch_json(&self, raw: &str) -> ResponseEnvelope {
        match serde_json::from_str::<RequestEnvelope>(raw) {
            Ok(envelope) => self.dispatch(&envelope).await.into_envelope(),
            Err(e) => {
                tracing::error!(error = %e, "malformed request envelope");
                fallback().into_envelope()
            }
        }
    }

    /// All registered handler names (for testing).
    pub fn names(&self) -> Vec<&str> {
        self.handlers.iter().map(|h| h.name()).collect()
    }
}

/// Answer a raw request with the router that could be built, or with
/// [`IntentRouter::without_lock`] when building it failed.
pub async fn respond(raw: &str, router: Result<IntentRouter>) -> ResponseEnvelope {
    match router {
        Ok(router) => router.dispatch_json(raw).await,
        Err(e) => {
            tracing::error!(error = %e, "skill is not configured, only canned replies available");
            IntentRouter::without_lock().dispatch_json(raw).await
        }
    }
}

/// The catch-all response.
pub fn fallback() -> SkillResponse {
    SkillResponse::speak(FALLBACK_MESSAGE).with_reprompt(FALLBACK_MESSAGE)
}
