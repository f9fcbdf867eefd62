use anyhow::Result;
use async_trait::async_trait;

use super::{Request, RequestEnvelope, RequestHandler, SkillResponse};
use crate::consts::{HELP_INTENT, HELP_MESSAGE, HELP_REPROMPT};

pub struct HelpHandler;

#[async_trait]
impl RequestHandler for HelpHandler {
    fn name(&self) -> &str {
        "help"
    }

    fn can_handle(&self, request: &Request) -> bool {
        request.intent_name() == Some(HELP_INTENT)
    }

    async fn handle(&self, _envelope: &RequestEnvelope) -> Result<SkillResponse> {
        Ok(SkillResponse::speak(HELP_MESSAGE).with_reprompt(HELP_REPROMPT))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intents::tests::envelope;

    #[tokio::test]
    async fn speaks_help_and_reprompts() {
        let env = envelope(r#"{"request":{"type":"IntentRequest","intent":{"name":"AMAZON.HelpIntent"}}}"#);
        assert!(HelpHandler.can_handle(&env.request));

        let response = HelpHandler.handle(&env).await.unwrap();
        assert_eq!(response.speech(), Some(HELP_MESSAGE));
        assert!(!response.should_end_session);
    }

    #[test]
    fn ignores_other_requests() {
        let launch = envelope(r#"{"request":{"type":"LaunchRequest"}}"#);
        assert!(!HelpHandler.can_handle(&launch.request));
    }
}
