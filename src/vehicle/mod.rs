//! The connected-vehicle API: lock state, lock command, vehicle list.

pub mod http;
pub mod lock;
pub mod mock;

pub use http::HttpVehicleApi;
pub use lock::{LockController, PollConfig};

use async_trait::async_trait;
use std::time::Duration;

/// Aggregate lock state across all doors, as reported by the vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(from = "String")]
pub enum LockState {
    Locked,
    Unlocked,
    /// Any value the API may add later. Treated like unlocked.
    Unknown,
}

impl From<String> for LockState {
    fn from(value: String) -> Self {
        match value.as_str() {
            "LOCKED" => LockState::Locked,
            "UNLOCKED" => LockState::Unlocked,
            _ => LockState::Unknown,
        }
    }
}

impl LockState {
    pub fn is_locked(self) -> bool {
        self == LockState::Locked
    }
}

/// A vehicle visible to the authenticated user.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
pub struct Vehicle {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    /// No access token, or the API rejected it.
    #[error("not authenticated with the vehicle api")]
    Unauthenticated,
    #[error("vehicle api unreachable: {0}")]
    Unreachable(String),
    /// The response did not have the expected shape.
    #[error("unexpected vehicle api payload: {0}")]
    Payload(String),
    #[error("no vehicles linked to this account")]
    NoVehicles,
    #[error("vehicle still unlocked after {commands} lock command(s)")]
    StillUnlocked { commands: u32 },
    #[error("vehicle did not report locked within {0:?}")]
    Timeout(Duration),
}

/// Remote operations on the user's vehicles. Every call is a fresh request;
/// nothing is cached.
#[async_trait]
pub trait VehicleApi: Send + Sync {
    async fn list_vehicles(&self, access_token: &str) -> Result<Vec<Vehicle>, ApiError>;

    async fn lock_state(&self, vehicle_id: &str, access_token: &str)
    -> Result<LockState, ApiError>;

    /// Ask the vehicle to lock. Success means the command was accepted,
    /// not that the doors are locked yet.
    async fn send_lock(&self, vehicle_id: &str, access_token: &str) -> Result<(), ApiError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_state_deserializes() {
        let locked: LockState = serde_json::from_str(r#""LOCKED""#).unwrap();
        let unlocked: LockState = serde_json::from_str(r#""UNLOCKED""#).unwrap();
        let other: LockState = serde_json::from_str(r#""SECURED""#).unwrap();
        assert_eq!(locked, LockState::Locked);
        assert_eq!(unlocked, LockState::Unlocked);
        assert_eq!(other, LockState::Unknown);
        assert!(locked.is_locked());
        assert!(!other.is_locked());
    }
}
