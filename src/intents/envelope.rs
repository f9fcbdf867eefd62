//! Request and response envelopes exchanged with the voice platform.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
pub struct RequestEnvelope {
    #[serde(default)]
    pub session: Option<Session>,
    #[serde(default)]
    pub context: Option<Context>,
    pub request: Request,
}

impl RequestEnvelope {
    /// Access token from account linking, if the user has linked.
    pub fn access_token(&self) -> Option<&str> {
        let from_context = self
            .context
            .as_ref()
            .and_then(|c| c.system.as_ref())
            .and_then(|s| s.user.as_ref())
            .and_then(|u| u.access_token.as_deref());
        let from_session = self
            .session
            .as_ref()
            .and_then(|s| s.user.as_ref())
            .and_then(|u| u.access_token.as_deref());
        from_context.or(from_session).filter(|t| !t.is_empty())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Session {
    #[serde(default)]
    pub user: Option<User>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Context {
    #[serde(rename = "System", default)]
    pub system: Option<System>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct System {
    #[serde(default)]
    pub user: Option<User>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub access_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum Request {
    #[serde(rename = "LaunchRequest")]
    Launch {},
    #[serde(rename = "IntentRequest")]
    Intent { intent: Intent },
    #[serde(rename = "SessionEndedRequest")]
    SessionEnded {
        #[serde(default)]
        reason: Option<String>,
    },
    #[serde(other)]
    Unknown,
}

impl Request {
    /// Intent name for intent requests.
    pub fn intent_name(&self) -> Option<&str> {
        match self {
            Request::Intent { intent } => Some(intent.name.as_str()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Intent {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResponseEnvelope {
    pub version: &'static str,
    pub response: SkillResponse,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_speech: Option<OutputSpeech>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reprompt: Option<Reprompt>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub card: Option<Card>,
    pub should_end_session: bool,
}

impl SkillResponse {
    /// Say `text` and end the session.
    pub fn speak(text: &str) -> Self {
        Self {
            output_speech: Some(OutputSpeech::plain(text)),
            should_end_session: true,
            ..Self::default()
        }
    }

    /// Keep the session open and say `text` again if the user stays silent.
    pub fn with_reprompt(mut self, text: &str) -> Self {
        self.reprompt = Some(Reprompt {
            output_speech: OutputSpeech::plain(text),
        });
        self.should_end_session = false;
        self
    }

    /// Ask the platform to show its account linking card.
    pub fn with_link_account_card(mut self) -> Self {
        self.card = Some(Card::LinkAccount);
        self
    }

    /// What will be spoken, if anything.
    pub fn speech(&self) -> Option<&str> {
        self.output_speech.as_ref().map(|s| s.text.as_str())
    }

    pub fn into_envelope(self) -> ResponseEnvelope {
        ResponseEnvelope {
            version: "1.0",
            response: self,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputSpeech {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub text: String,
}

impl OutputSpeech {
    pub fn plain(text: &str) -> Self {
        Self {
            kind: "PlainText",
            text: text.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Reprompt {
    pub output_speech: OutputSpeech,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum Card {
    LinkAccount,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_launch_request() {
        let env: RequestEnvelope = serde_json::from_str(
            r#"{"version":"1.0","request":{"type":"LaunchRequest","requestId":"r1","locale":"en-US"}}"#,
        )
        .unwrap();
        assert!(matches!(env.request, Request::Launch {}));
        assert_eq!(env.access_token(), None);
    }

    #[test]
    fn parses_intent_with_linked_token() {
        let env: RequestEnvelope = serde_json::from_str(
            r#"{
                "session": {"user": {"userId": "u1", "accessToken": "session-token"}},
                "context": {"System": {"user": {"userId": "u1", "accessToken": "context-token"}}},
                "request": {"type": "IntentRequest", "intent": {"name": "LockMyCar", "slots": {}}}
            }"#,
        )
        .unwrap();
        assert_eq!(env.request.intent_name(), Some("LockMyCar"));
        assert_eq!(env.access_token(), Some("context-token"));
    }

    #[test]
    fn session_token_used_without_context() {
        let env: RequestEnvelope = serde_json::from_str(
            r#"{"session":{"user":{"accessToken":"session-token"}},"request":{"type":"LaunchRequest"}}"#,
        )
        .unwrap();
        assert_eq!(env.access_token(), Some("session-token"));
    }

    #[test]
    fn parses_session_ended_and_unknown() {
        let ended: RequestEnvelope = serde_json::from_str(
            r#"{"request":{"type":"SessionEndedRequest","reason":"USER_INITIATED"}}"#,
        )
        .unwrap();
        assert!(matches!(
            ended.request,
            Request::SessionEnded { reason: Some(ref r) } if r == "USER_INITIATED"
        ));

        let other: RequestEnvelope =
            serde_json::from_str(r#"{"request":{"type":"Display.ElementSelected"}}"#).unwrap();
        assert!(matches!(other.request, Request::Unknown));
    }

    #[test]
    fn response_serializes_platform_shape() {
        let json = serde_json::to_value(
            SkillResponse::speak("hi")
                .with_reprompt("again?")
                .into_envelope(),
        )
        .unwrap();
        assert_eq!(json["version"], "1.0");
        assert_eq!(json["response"]["outputSpeech"]["type"], "PlainText");
        assert_eq!(json["response"]["outputSpeech"]["text"], "hi");
        assert_eq!(
            json["response"]["reprompt"]["outputSpeech"]["text"],
            "again?"
        );
        assert_eq!(json["response"]["shouldEndSession"], false);
        assert!(json["response"].get("card").is_none());
    }

    #[test]
    fn link_account_card_serializes() {
        let json =
            serde_json::to_value(SkillResponse::speak("link").with_link_account_card()).unwrap();
        assert_eq!(json["card"]["type"], "LinkAccount");
        assert_eq!(json["shouldEndSession"], true);
    }
}
