use anyhow::Result;
use async_trait::async_trait;

use super::{Request, RequestEnvelope, RequestHandler, SkillResponse};

pub struct SessionEndedHandler;

#[async_trait]
impl RequestHandler for SessionEndedHandler {
    fn name(&self) -> &str {
        "session_ended"
    }

    fn can_handle(&self, request: &Request) -> bool {
        matches!(request, Request::SessionEnded { .. })
    }

    async fn handle(&self, envelope: &RequestEnvelope) -> Result<SkillResponse> {
        if let Request::SessionEnded { reason } = &envelope.request {
            tracing::info!(reason = reason.as_deref().unwrap_or("unknown"), "session ended");
        }
        // The platform ignores speech here.
        Ok(SkillResponse {
            should_end_session: true,
            ..SkillResponse::default()
        })
    }
}
