//! One invocation, start to finish: token, vehicle, lock, spoken reply.

use async_trait::async_trait;
use std::sync::Arc;

use crate::auth::{AuthError, Credentials, Grant, TokenExchange, TokenPair};
use crate::vehicle::{ApiError, LockController, PollConfig, VehicleApi};

/// Which vehicle to lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VehicleSelector {
    Fixed(String),
    /// Ask the API for the user's vehicles and take the first.
    FirstListed,
}

/// Where this invocation gets its access token.
#[derive(Debug, Clone)]
pub enum TokenSource {
    /// Supplied by the voice platform after account linking.
    AccountLinked(Option<String>),
    /// Exchanged at the token endpoint.
    Grant(Option<Credentials>),
}

/// The fixed set of things the skill says.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    Locked,
    NotLocked,
    /// The grant was rejected; the user has to authorize again.
    LockItYourself,
    LinkAccount,
}

impl Reply {
    pub fn text(self) -> &'static str {
        match self {
            Reply::Locked => "Your car has been locked.",
            Reply::NotLocked => {
                "There was an error communicating with your car. Your car has not been locked."
            }
            Reply::LockItYourself => {
                "Sorry, we couldn't connect to your car. Please lock your car yourself."
            }
            Reply::LinkAccount => {
                "Please link your account in the companion app, then ask me again to lock your car."
            }
        }
    }
}

impl std::fmt::Display for Reply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.text())
    }
}

/// What an invocation produced.
#[derive(Debug, Clone)]
pub struct InvocationReport {
    pub reply: Reply,
    /// Tokens issued by an exchange during this invocation, for rotation.
    pub issued: Option<TokenPair>,
    /// The grant the provider answered for, accepted or rejected.
    /// Left unset when the token endpoint was never reached.
    pub spent: Option<Grant>,
}

/// The outermost boundary the intent handlers talk to.
#[async_trait]
pub trait Engine: Send + Sync {
    async fn run_detailed(&self, source: TokenSource) -> InvocationReport;

    async fn run(&self, source: TokenSource) -> Reply {
        self.run_detailed(source).await.reply
    }
}

/// Exchanges the grant, resolves the vehicle and locks it.
///
/// Holds no token state; every invocation starts from its own [`TokenSource`].
pub struct LockEngine {
    exchange: Arc<dyn TokenExchange>,
    api: Arc<dyn VehicleApi>,
    controller: LockController,
    vehicle: VehicleSelector,
}

impl LockEngine {
    pub fn new(
        exchange: Arc<dyn TokenExchange>,
        api: Arc<dyn VehicleApi>,
        vehicle: VehicleSelector,
        poll: PollConfig,
    ) -> Self {
        let controller = LockController::new(Arc::clone(&api), poll);
        Self {
            exchange,
            api,
            controller,
            vehicle,
        }
    }

    async fn resolve_vehicle(&self, access_token: &str) -> Result<String, ApiError> {
        match &self.vehicle {
            VehicleSelector::Fixed(id) => Ok(id.clone()),
            VehicleSelector::FirstListed => self
                .api
                .list_vehicles(access_token)
                .await?
                .into_iter()
                .next()
                .map(|v| v.id)
                .ok_or(ApiError::NoVehicles),
        }
    }

    async fn lock(&self, access_token: &str) -> Reply {
        let result = match self.resolve_vehicle(access_token).await {
            Ok(vehicle_id) => self.controller.ensure_locked(&vehicle_id, access_token).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(_) => Reply::Locked,
            Err(ApiError::Unauthenticated) => {
                tracing::warn!("vehicle api rejected the access token");
                Reply::LinkAccount
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to lock vehicle");
                Reply::NotLocked
            }
        }
    }
}

#[async_trait]
impl Engine for LockEngine {
    async fn run_detailed(&self, source: TokenSource) -> InvocationReport {
        let (access_token, issued, spent) = match source {
            TokenSource::AccountLinked(Some(token)) if !token.is_empty() => (token, None, None),
            TokenSource::AccountLinked(_) | TokenSource::Grant(None) => {
                tracing::info!("no access token available, asking the user to link");
                return InvocationReport {
                    reply: Reply::LinkAccount,
                    issued: None,
                    spent: None,
                };
            }
            TokenSource::Grant(Some(credentials)) => {
                let outcome = self
                    .exchange
                    .exchange(&credentials.client, &credentials.grant)
                    .await;
                match outcome {
                    Ok(tokens) => (
                        tokens.access_token.clone(),
                        Some(tokens),
                        Some(credentials.grant),
                    ),
                    Err(AuthError::InvalidGrant) => {
                        tracing::warn!(grant = ?credentials.grant, "grant rejected by provider");
                        return InvocationReport {
                            reply: Reply::LockItYourself,
                            issued: None,
                            spent: Some(credentials.grant),
                        };
                    }
                    Err(e @ AuthError::Transport(_)) => {
                        tracing::error!(error = %e, "token exchange failed");
                        return InvocationReport {
                            reply: Reply::NotLocked,
                            issued: None,
                            spent: None,
                        };
                    }
                }
            }
        };

        let reply = self.lock(&access_token).await;
        tracing::info!(?reply, "invocation finished");
        InvocationReport {
            reply,
            issued,
            spent,
        }
    }
}
