use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;

use super::{ApiError, LockState, Vehicle, VehicleApi};

/// Connected-vehicle REST API over reqwest, Bearer authenticated.
pub struct HttpVehicleApi {
    http: reqwest::Client,
    base_url: Url,
}

impl HttpVehicleApi {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::Unreachable(format!("failed to build http client: {e}")))?;
        let base_url = Url::parse(base_url)
            .ok()
            .filter(|url| !url.cannot_be_a_base())
            .ok_or_else(|| ApiError::Unreachable(format!("invalid api base url: {base_url}")))?;
        Ok(Self { http, base_url })
    }

    /// Base URL plus path segments. Each segment is percent-encoded, so an id
    /// cannot reach another resource.
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn doors_url(&self, vehicle_id: &str) -> Url {
        self.url(&["vehicles", vehicle_id, "doors"])
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<String, ApiError> {
        let resp = request
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| ApiError::Unreachable(e.to_string()))?;

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(ApiError::Unauthenticated);
        }

        let text = resp
            .text()
            .await
            .map_err(|e| ApiError::Unreachable(format!("failed to read response: {e}")))?;

        if !status.is_success() {
            return Err(ApiError::Unreachable(format!(
                "vehicle api returned {}: {}",
                status.as_u16(),
                text.chars().take(200).collect::<String>()
            )));
        }
        Ok(text)
    }
}

fn parse<T: DeserializeOwned>(text: &str) -> Result<T, ApiError> {
    serde_json::from_str(text).map_err(|e| ApiError::Payload(e.to_string()))
}

#[derive(Deserialize)]
struct DoorsResponse {
    doorlockstatusvehicle: StatusField,
}

#[derive(Deserialize)]
struct StatusField {
    value: LockState,
}

#[async_trait]
impl VehicleApi for HttpVehicleApi {
    async fn list_vehicles(&self, access_token: &str) -> Result<Vec<Vehicle>, ApiError> {
        let text = self
            .send(self.http.get(self.url(&["vehicles"])).bearer_auth(access_token))
            .await?;
        parse(&text)
    }

    async fn lock_state(
        &self,
        vehicle_id: &str,
        access_token: &str,
    ) -> Result<LockState, ApiError> {
        let text = self
            .send(
                self.http
                    .get(self.doors_url(vehicle_id))
                    .bearer_auth(access_token),
            )
            .await?;
        let doors: DoorsResponse = parse(&text)?;
        tracing::debug!(vehicle_id, state = ?doors.doorlockstatusvehicle.value, "door status");
        Ok(doors.doorlockstatusvehicle.value)
    }

    async fn send_lock(&self, vehicle_id: &str, access_token: &str) -> Result<(), ApiError> {
        // The acknowledgement only says the command was initiated; its body is ignored.
        self.send(
            self.http
                .post(self.doors_url(vehicle_id))
                .bearer_auth(access_token)
                .json(&serde_json::json!({ "command": "LOCK" })),
        )
        .await?;
        Ok(())
    }
}
