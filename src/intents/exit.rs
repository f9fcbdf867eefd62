use anyhow::Result;
use async_trait::async_trait;

use super::{Request, RequestEnvelope, RequestHandler, SkillResponse};
use crate::consts::{CANCEL_INTENT, STOP_INTENT, STOP_MESSAGE};

/// Cancel and stop both say goodbye.
pub struct ExitHandler;

#[async_trait]
impl RequestHandler for ExitHandler {
    fn name(&self) -> &str {
        "exit"
    }

    fn can_handle(&self, request: &Request) -> bool {
        matches!(request.intent_name(), Some(CANCEL_INTENT | STOP_INTENT))
    }

    async fn handle(&self, _envelope: &RequestEnvelope) -> Result<SkillResponse> {
        Ok(SkillResponse::speak(STOP_MESSAGE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intents::tests::envelope;

    #[tokio::test]
    async fn stop_and_cancel_say_goodbye() {
        for name in [STOP_INTENT, CANCEL_INTENT] {
            let env = envelope(&format!(
                r#"{{"request":{{"type":"IntentRequest","intent":{{"name":"{name}"}}}}}}"#
            ));
            assert!(ExitHandler.can_handle(&env.request), "{name}");
            let response = ExitHandler.handle(&env).await.unwrap();
            assert_eq!(response.speech(), Some(STOP_MESSAGE));
            assert!(response.should_end_session);
        }
    }
}
