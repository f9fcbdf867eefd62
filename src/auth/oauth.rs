use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngExt;
use std::time::Duration;

use super::{AuthError, ClientCredentials, Grant, TokenExchange, TokenPair};

/// HTTP client for the provider's token endpoint.
pub struct TokenClient {
    http: reqwest::Client,
    token_url: String,
    redirect_uri: String,
}

impl TokenClient {
    pub fn new(token_url: &str, redirect_uri: &str, timeout: Duration) -> Result<Self, AuthError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AuthError::Transport(format!("failed to build http client: {e}")))?;
        Ok(Self {
            http,
            token_url: token_url.to_string(),
            redirect_uri: redirect_uri.to_string(),
        })
    }
}

#[async_trait]
impl TokenExchange for TokenClient {
    async fn exchange(
        &self,
        client: &ClientCredentials,
        grant: &Grant,
    ) -> Result<TokenPair, AuthError> {
        let form: Vec<(&str, &str)> = match grant {
            Grant::AuthorizationCode(code) => vec![
                ("grant_type", grant.grant_type()),
                ("code", code.as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
            ],
            Grant::RefreshToken(token) => vec![
                ("grant_type", grant.grant_type()),
                ("refresh_token", token.as_str()),
            ],
        };

        tracing::debug!(grant_type = grant.grant_type(), url = %self.token_url, "exchanging grant");

        let resp = self
            .http
            .post(&self.token_url)
            .header(reqwest::header::AUTHORIZATION, basic_authorization(client))
            .form(&form)
            .send()
            .await
            .map_err(|e| AuthError::Transport(e.to_string()))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| AuthError::Transport(format!("failed to read token response: {e}")))?;

        let pair = parse_token_response(status, &text, grant)?;
        tracing::info!(grant_type = grant.grant_type(), "token exchange succeeded");
        Ok(pair)
    }
}

#[derive(serde::Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(serde::Deserialize)]
struct ErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// Interpret a token endpoint response.
///
/// `invalid_grant` in the body wins over the HTTP status: some providers
/// report it with a 200.
fn parse_token_response(
    status: reqwest::StatusCode,
    body: &str,
    grant: &Grant,
) -> Result<TokenPair, AuthError> {
    if let Ok(err) = serde_json::from_str::<ErrorResponse>(body) {
        if err.error == "invalid_grant" {
            tracing::warn!(
                grant_type = grant.grant_type(),
                "authorization grant was invalid or already used"
            );
            return Err(AuthError::InvalidGrant);
        }
        let detail = err.error_description.unwrap_or_default();
        return Err(AuthError::Transport(format!(
            "token endpoint returned {} ({}): {detail}",
            err.error,
            status.as_u16()
        )));
    }

    if !status.is_success() {
        return Err(AuthError::Transport(format!(
            "token endpoint returned status {}",
            status.as_u16()
        )));
    }

    let data: TokenResponse = serde_json::from_str(body)
        .map_err(|e| AuthError::Transport(format!("malformed token response: {e}")))?;

    if data.access_token.trim().is_empty() {
        return Err(AuthError::Transport(
            "token response has an empty access_token".to_string(),
        ));
    }

    // A refresh grant may come back without a new refresh token; keep the old one.
    let refresh_token = match (data.refresh_token.filter(|t| !t.is_empty()), grant) {
        (Some(token), _) => token,
        (None, Grant::RefreshToken(previous)) => previous.clone(),
        (None, Grant::AuthorizationCode(_)) => {
            return Err(AuthError::Transport(
                "token response is missing refresh_token".to_string(),
            ));
        }
    };

    Ok(TokenPair {
        access_token: data.access_token,
        refresh_token,
        expires_at: data.expires_in.map(|secs| now_ms() + secs * 1000),
    })
}

/// `Basic base64(client_id:client_secret)`.
pub fn basic_authorization(client: &ClientCredentials) -> String {
    let raw = format!("{}:{}", client.client_id, client.client_secret);
    format!("Basic {}", STANDARD.encode(raw))
}

pub(crate) fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Random value echoed back by the provider on redirect.
fn generate_state() -> String {
    let mut rng = rand::rng();
    let bytes: [u8; 16] = rng.random();
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Build the authorization URL for the user to visit.
/// Returns (url, state); the caller compares the state echoed on redirect.
pub fn build_authorize_url(
    authorize_url: &str,
    client_id: &str,
    redirect_uri: &str,
    scopes: &str,
) -> (String, String) {
    let state = generate_state();

    let params = [
        ("response_type", "code"),
        ("client_id", client_id),
        ("redirect_uri", redirect_uri),
        ("scope", scopes),
        ("state", state.as_str()),
    ];

    let query = params
        .iter()
        .map(|(k, v)| format!("{}={}", k, urlencoded(v)))
        .collect::<Vec<_>>()
        .join("&");

    (format!("{authorize_url}?{query}"), state)
}

/// Code and state pasted back by the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    pub code: String,
    pub state: Option<String>,
}

/// Accept either the bare code or the whole redirect URL
/// (`http://localhost/?code=...&state=...`).
pub fn parse_redirect(input: &str) -> Option<Redirect> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }

    let url = match reqwest::Url::parse(input) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => url,
        _ => {
            return (!input.contains('?')).then(|| Redirect {
                code: input.to_string(),
                state: None,
            });
        }
    };

    let mut code = None;
    let mut state = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" if !value.is_empty() => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            _ => {}
        }
    }
    code.map(|code| Redirect { code, state })
}

/// Minimal URL encoding for query parameters.
fn urlencoded(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char);
            }
            _ => {
                out.push_str(&format!("%{:02X}", b));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    fn code() -> Grant {
        Grant::AuthorizationCode("35f3eae4".into())
    }

    #[test]
    fn basic_authorization_encodes_id_and_secret() {
        let client = ClientCredentials {
            client_id: "id".into(),
            client_secret: "secret".into(),
        };
        assert_eq!(basic_authorization(&client), "Basic aWQ6c2VjcmV0");
    }

    #[test]
    fn invalid_grant_body_wins_over_status() {
        let body = r#"{"error":"invalid_grant","error_description":"code already used"}"#;
        assert_eq!(
            parse_token_response(StatusCode::BAD_REQUEST, body, &code()),
            Err(AuthError::InvalidGrant)
        );
        assert_eq!(
            parse_token_response(StatusCode::OK, body, &code()),
            Err(AuthError::InvalidGrant)
        );
    }

    #[test]
    fn other_oauth_error_is_transport() {
        let body = r#"{"error":"invalid_client"}"#;
        assert!(matches!(
            parse_token_response(StatusCode::UNAUTHORIZED, body, &code()),
            Err(AuthError::Transport(msg)) if msg.contains("invalid_client")
        ));
    }

    #[test]
    fn server_error_without_body_is_transport() {
        assert!(matches!(
            parse_token_response(StatusCode::BAD_GATEWAY, "<html>", &code()),
            Err(AuthError::Transport(_))
        ));
    }

    #[test]
    fn malformed_success_body_is_transport() {
        assert!(matches!(
            parse_token_response(StatusCode::OK, r#"{"token":"x"}"#, &code()),
            Err(AuthError::Transport(_))
        ));
    }

    #[test]
    fn success_extracts_tokens() {
        let body = r#"{"access_token":"acc","refresh_token":"ref","expires_in":3600}"#;
        let pair = parse_token_response(StatusCode::OK, body, &code()).unwrap();
        assert_eq!(pair.access_token, "acc");
        assert_eq!(pair.refresh_token, "ref");
        assert!(pair.expires_at.unwrap() > now_ms());
    }

    #[test]
    fn refresh_grant_keeps_previous_refresh_token() {
        let body = r#"{"access_token":"acc"}"#;
        let grant = Grant::RefreshToken("old-refresh".into());
        let pair = parse_token_response(StatusCode::OK, body, &grant).unwrap();
        assert_eq!(pair.refresh_token, "old-refresh");
        assert_eq!(pair.expires_at, None);
    }

    #[test]
    fn code_grant_requires_refresh_token() {
        let body = r#"{"access_token":"acc"}"#;
        assert!(parse_token_response(StatusCode::OK, body, &code()).is_err());
    }

    #[test]
    fn authorize_url_contains_encoded_params() {
        let (url, state) = build_authorize_url(
            "https://auth.example/authorize",
            "client-1",
            "http://localhost",
            "a:b c:d",
        );
        assert!(url.starts_with("https://auth.example/authorize?response_type=code&"));
        assert!(url.contains("client_id=client-1"));
        assert!(url.contains("redirect_uri=http%3A%2F%2Flocalhost"));
        assert!(url.contains("scope=a%3Ab%20c%3Ad"));
        assert!(url.ends_with(&format!("state={state}")));
    }

    #[test]
    fn authorize_state_is_unique_per_call() {
        let (_, s1) = build_authorize_url("https://a", "c", "http://localhost", "s");
        let (_, s2) = build_authorize_url("https://a", "c", "http://localhost", "s");
        assert_ne!(s1, s2);
    }

    #[test]
    fn parse_bare_code() {
        assert_eq!(
            parse_redirect("  9217fd84-2600  \n"),
            Some(Redirect {
                code: "9217fd84-2600".into(),
                state: None
            })
        );
    }

    #[test]
    fn parse_full_redirect_url() {
        let r = parse_redirect("http://localhost/?code=9217fd84&state=ab%2Dc").unwrap();
        assert_eq!(r.code, "9217fd84");
        assert_eq!(r.state.as_deref(), Some("ab-c"));
    }

    #[test]
    fn parse_redirect_decodes_query_values() {
        let r = parse_redirect("https://example.com/cb?state=a+b%3D&code=c%2Fd%25").unwrap();
        assert_eq!(r.code, "c/d%");
        assert_eq!(r.state.as_deref(), Some("a b="));
    }

    #[test]
    fn parse_code_with_colon_is_bare() {
        assert_eq!(parse_redirect("ab:12").map(|r| r.code).as_deref(), Some("ab:12"));
    }

    #[test]
    fn parse_redirect_without_code() {
        assert_eq!(parse_redirect("http://localhost/?error=access_denied"), None);
        assert_eq!(parse_redirect(""), None);
    }
}
