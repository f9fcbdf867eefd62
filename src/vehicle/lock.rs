use std::sync::Arc;
use std::time::Duration;

use super::{ApiError, VehicleApi};

/// Bounds on the check/command loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollConfig {
    /// Lock commands to send before giving up.
    pub max_commands: u32,
    /// Wait after the first command before checking again; doubles per command.
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Budget for the whole loop, checks and commands included.
    pub deadline: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            max_commands: 3,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(4),
            deadline: Duration::from_secs(20),
        }
    }
}

/// Drives a vehicle to the locked state: check, lock if needed, check again.
pub struct LockController {
    api: Arc<dyn VehicleApi>,
    config: PollConfig,
}

impl LockController {
    pub fn new(api: Arc<dyn VehicleApi>, config: PollConfig) -> Self {
        Self { api, config }
    }

    /// Returns `Ok(true)` once the vehicle reports locked. Never returns
    /// `Ok(false)`: running out of commands is [`ApiError::StillUnlocked`],
    /// running out of time is [`ApiError::Timeout`].
    pub async fn ensure_locked(&self, vehicle_id: &str, access_token: &str) -> Result<bool, ApiError> {
        match tokio::time::timeout(self.config.deadline, self.poll(vehicle_id, access_token)).await
        {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(vehicle_id, deadline = ?self.config.deadline, "lock deadline exceeded");
                Err(ApiError::Timeout(self.config.deadline))
            }
        }
    }

    async fn poll(&self, vehicle_id: &str, access_token: &str) -> Result<bool, ApiError> {
        let mut commands = 0u32;
        let mut backoff = self.config.initial_backoff;

        loop {
            let state = self.api.lock_state(vehicle_id, access_token).await?;
            if state.is_locked() {
                tracing::info!(vehicle_id, commands, "all doors locked");
                return Ok(true);
            }

            if commands >= self.config.max_commands {
                tracing::warn!(vehicle_id, commands, ?state, "vehicle did not lock");
                return Err(ApiError::StillUnlocked { commands });
            }

            tracing::info!(vehicle_id, ?state, attempt = commands + 1, "sending lock command");
            self.api.send_lock(vehicle_id, access_token).await?;
            commands += 1;

            if !backoff.is_zero() {
                tokio::time::sleep(backoff).await;
            }
            backoff = (backoff * 2).min(self.config.max_backoff);
        }
    }
}
