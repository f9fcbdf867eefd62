use async_trait::async_trait;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::{ApiError, LockState, Vehicle, VehicleApi};

/// A scripted vehicle for tests. Reports the given lock states in order and
/// repeats the last one once the script runs out.
pub struct MockVehicleApi {
    states: Vec<LockState>,
    vehicles: Vec<Vehicle>,
    failure: Option<ApiError>,
    status_delay: Duration,
    checks: AtomicUsize,
    commands: AtomicUsize,
    listings: AtomicUsize,
    seen_tokens: Mutex<Vec<String>>,
}

impl MockVehicleApi {
    pub fn new(states: Vec<LockState>) -> Self {
        Self {
            states,
            vehicles: vec![Vehicle {
                id: "MOCK-VEHICLE".to_string(),
            }],
            failure: None,
            status_delay: Duration::ZERO,
            checks: AtomicUsize::new(0),
            commands: AtomicUsize::new(0),
            listings: AtomicUsize::new(0),
            seen_tokens: Mutex::new(Vec::new()),
        }
    }

    /// Vehicles returned by `list_vehicles`.
    pub fn with_vehicles(mut self, ids: &[&str]) -> Self {
        self.vehicles = ids
            .iter()
            .map(|id| Vehicle { id: id.to_string() })
            .collect();
        self
    }

    /// Every call fails with `error`.
    pub fn with_failure(mut self, error: ApiError) -> Self {
        self.failure = Some(error);
        self
    }

    /// Each status check takes this long.
    pub fn with_status_delay(mut self, delay: Duration) -> Self {
        self.status_delay = delay;
        self
    }

    pub fn status_checks(&self) -> usize {
        self.checks.load(Ordering::SeqCst)
    }

    pub fn lock_commands(&self) -> usize {
        self.commands.load(Ordering::SeqCst)
    }

    pub fn listings(&self) -> usize {
        self.listings.load(Ordering::SeqCst)
    }

    /// Total requests made, of any kind.
    pub fn requests(&self) -> usize {
        self.status_checks() + self.lock_commands() + self.listings()
    }

    /// Access tokens presented, in call order.
    pub fn seen_tokens(&self) -> Vec<String> {
        self.seen_tokens
            .lock()
            .map(|tokens| tokens.clone())
            .unwrap_or_default()
    }

    fn record(&self, token: &str) -> Result<(), ApiError> {
        if let Ok(mut tokens) = self.seen_tokens.lock() {
            tokens.push(token.to_string());
        }
        self.failure.clone().map_or(Ok(()), Err)
    }
}

#[async_trait]
impl VehicleApi for MockVehicleApi {
    async fn list_vehicles(&self, access_token: &str) -> Result<Vec<Vehicle>, ApiError> {
        self.listings.fetch_add(1, Ordering::SeqCst);
        self.record(access_token)?;
        Ok(self.vehicles.clone())
    }

    async fn lock_state(
        &self,
        _vehicle_id: &str,
        access_token: &str,
    ) -> Result<LockState, ApiError> {
        let i = self.checks.fetch_add(1, Ordering::SeqCst);
        self.record(access_token)?;
        if !self.status_delay.is_zero() {
            tokio::time::sleep(self.status_delay).await;
        }
        self.states
            .get(i)
            .or(self.states.last())
            .copied()
            .ok_or_else(|| ApiError::Payload("MockVehicleApi: no states scripted".to_string()))
    }

    async fn send_lock(&self, _vehicle_id: &str, access_token: &str) -> Result<(), ApiError> {
        self.commands.fetch_add(1, Ordering::SeqCst);
        self.record(access_token)
    }
}
