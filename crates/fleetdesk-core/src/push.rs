//! Push notifications through Firebase Cloud Messaging (HTTP v1).
//!
//! Authentication uses a Google service account: a short-lived RS256
//! assertion is exchanged for an OAuth2 access token, which is cached and
//! reused until shortly before it expires.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::config::PushConfig;
use crate::error::{DeskError, Result};

const SCOPE: &str = "https://www.googleapis.com/auth/firebase.messaging";
const DEFAULT_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const DEFAULT_SEND_BASE_URL: &str = "https://fcm.googleapis.com";
const TOKEN_CACHE: Duration = Duration::from_secs(3300);
const TIMEOUT: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// Messages and results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebAction {
    pub action: String,
    pub title: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PushMessage {
    pub title: String,
    pub body: String,
    /// FCM only accepts string values here.
    pub data: BTreeMap<String, String>,
    pub actions: Vec<WebAction>,
}

impl PushMessage {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            ..Self::default()
        }
    }

    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Merge caller-supplied JSON, stringifying non-string values.
    pub fn merge_data(mut self, extra: Option<&serde_json::Map<String, Value>>) -> Self {
        for (k, v) in extra.into_iter().flatten() {
            let s = match v {
                Value::String(s) => s.clone(),
                Value::Null => String::new(),
                other => other.to_string(),
            };
            self.data.insert(k.clone(), s);
        }
        self
    }

    pub fn with_action(mut self, action: impl Into<String>, title: impl Into<String>) -> Self {
        self.actions.push(WebAction {
            action: action.into(),
            title: title.into(),
        });
        self
    }

    fn to_fcm(&self, token: &str) -> Value {
        let mut message = json!({
            "token": token,
            "notification": { "title": self.title, "body": self.body },
            "webpush": {
                "notification": {
                    "title": self.title,
                    "body": self.body,
                    "icon": "/icon-192x192.png",
                    "badge": "/badge-72x72.png",
                    "requireInteraction": true,
                    "actions": self.actions,
                }
            }
        });
        if !self.data.is_empty() {
            message["data"] = json!(self.data);
        }
        json!({ "message": message })
    }
}

/// Device tokens are credentials; only a prefix is ever echoed or logged.
pub fn mask_token(token: &str) -> String {
    format!("{}...", token.chars().take(20).collect::<String>())
}

#[derive(Debug, Clone, Serialize)]
pub struct PushOutcome {
    pub token: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PushSummary {
    pub total_sent: usize,
    pub successful: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct PushReport {
    pub results: Vec<PushOutcome>,
    pub summary: PushSummary,
}

impl PushReport {
    pub fn from_outcomes(results: Vec<PushOutcome>) -> Self {
        let successful = results.iter().filter(|r| r.success).count();
        let summary = PushSummary {
            total_sent: results.len(),
            successful,
            failed: results.len() - successful,
        };
        Self { results, summary }
    }
}

pub trait PushSender: Send + Sync {
    /// Deliver to one device, returning the provider's response body.
    fn send_to_one(&self, token: &str, message: &PushMessage) -> Result<Value>;

    /// Deliver to each token in turn. A failure for one token never stops
    /// the others.
    fn send_to_many(&self, tokens: &[String], message: &PushMessage) -> PushReport {
        let results = tokens
            .iter()
            .map(|token| match self.send_to_one(token, message) {
                Ok(result) => PushOutcome {
                    token: mask_token(token),
                    success: true,
                    result: Some(result),
                    error: None,
                },
                Err(e) => PushOutcome {
                    token: mask_token(token),
                    success: false,
                    result: None,
                    error: Some(e.to_string()),
                },
            })
            .collect();
        PushReport::from_outcomes(results)
    }
}

/// Used when no FCM project is configured; every send fails.
pub struct DisabledPush;

impl PushSender for DisabledPush {
    fn send_to_one(&self, _token: &str, _message: &PushMessage) -> Result<Value> {
        Err(DeskError::Push("push notifications are not configured".to_string()))
    }
}

// ---------------------------------------------------------------------------
// FCM
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccount {
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub token_uri: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
}

impl ServiceAccount {
    pub fn load(path: &std::path::Path) -> Result<Self> {
        let data = std::fs::read_to_string(path).map_err(|e| {
            DeskError::Push(format!(
                "service account key file not found: {}: {e}",
                path.display()
            ))
        })?;
        serde_json::from_str(&data)
            .map_err(|e| DeskError::Push(format!("invalid service account key file: {e}")))
    }
}

#[derive(Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

struct CachedToken {
    value: String,
    fetched: Instant,
}

pub struct FcmClient {
    project_id: String,
    account: ServiceAccount,
    token_url: String,
    send_base_url: String,
    cached: Mutex<Option<CachedToken>>,
}

impl FcmClient {
    pub fn new(project_id: impl Into<String>, account: ServiceAccount) -> Self {
        let token_url = account
            .token_uri
            .clone()
            .unwrap_or_else(|| DEFAULT_TOKEN_URL.to_string());
        Self {
            project_id: project_id.into(),
            account,
            token_url,
            send_base_url: DEFAULT_SEND_BASE_URL.to_string(),
            cached: Mutex::new(None),
        }
    }

    pub fn with_token_url(mut self, url: impl Into<String>) -> Self {
        self.token_url = url.into();
        self
    }

    pub fn with_send_base_url(mut self, url: impl Into<String>) -> Self {
        self.send_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    fn client() -> Result<Client> {
        Ok(Client::builder().timeout(TIMEOUT).build()?)
    }

    fn assertion(&self) -> Result<String> {
        let now = Utc::now().timestamp();
        let claims = AssertionClaims {
            iss: &self.account.client_email,
            scope: SCOPE,
            aud: &self.token_url,
            iat: now,
            exp: now + 3600,
        };
        let key = EncodingKey::from_rsa_pem(self.account.private_key.as_bytes())
            .map_err(|e| DeskError::Push(format!("invalid service account private key: {e}")))?;
        encode(&Header::new(Algorithm::RS256), &claims, &key)
            .map_err(|e| DeskError::Push(format!("failed to sign assertion: {e}")))
    }

    fn access_token(&self) -> Result<String> {
        let mut cached = self
            .cached
            .lock()
            .map_err(|_| DeskError::Push("token cache poisoned".to_string()))?;
        if let Some(t) = cached.as_ref() {
            if t.fetched.elapsed() < TOKEN_CACHE {
                return Ok(t.value.clone());
            }
        }

        let assertion = self.assertion()?;
        let resp = Self::client()?
            .post(&self.token_url)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", assertion.as_str()),
            ])
            .send()?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().unwrap_or_default();
            return Err(DeskError::Push(format!(
                "failed to get access token ({status}): {body}"
            )));
        }
        let token: TokenResponse = resp.json()?;
        tracing::debug!("fcm access token refreshed");
        *cached = Some(CachedToken {
            value: token.access_token.clone(),
            fetched: Instant::now(),
        });
        Ok(token.access_token)
    }
}

impl PushSender for FcmClient {
    fn send_to_one(&self, token: &str, message: &PushMessage) -> Result<Value> {
        let access = self.access_token()?;
        let url = format!(
            "{}/v1/projects/{}/messages:send",
            self.send_base_url, self.project_id
        );
        let resp = Self::client()?
            .post(url)
            .bearer_auth(access)
            .json(&message.to_fcm(token))
            .send()?;
        let status = resp.status();
        if status.is_success() {
            let body: Value = resp.json()?;
            tracing::info!(token = %mask_token(token), title = %message.title, "push notification sent");
            return Ok(body);
        }
        let body = resp.text().unwrap_or_default();
        tracing::warn!(
            token = %mask_token(token),
            title = %message.title,
            status = status.as_u16(),
            error = %body,
            "push notification failed"
        );
        Err(DeskError::Push(body))
    }
}

/// FCM when a project and key file are configured, otherwise a sender that
/// refuses every message.
pub fn from_config(cfg: &PushConfig) -> Result<Box<dyn PushSender>> {
    let (Some(project_id), Some(path)) = (&cfg.project_id, &cfg.service_account_path) else {
        return Ok(Box::new(DisabledPush));
    };
    let mut client = FcmClient::new(project_id.clone(), ServiceAccount::load(path)?);
    if let Some(url) = &cfg.token_url {
        client = client.with_token_url(url.clone());
    }
    if let Some(url) = &cfg.send_base_url {
        client = client.with_send_base_url(url.clone());
    }
    Ok(Box::new(client))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    const TEST_KEY: &str = include_str!("testdata/fcm_test_key.pem");

    fn account() -> ServiceAccount {
        ServiceAccount {
            client_email: "push@demo.iam.gserviceaccount.com".into(),
            private_key: TEST_KEY.into(),
            token_uri: None,
            project_id: Some("demo".into()),
        }
    }

    fn client(server: &mockito::Server) -> FcmClient {
        FcmClient::new("demo", account())
            .with_token_url(format!("{}/token", server.url()))
            .with_send_base_url(server.url())
    }

    #[test]
    fn token_is_masked() {
        assert_eq!(
            mask_token("abcdefghijklmnopqrstuvwxyz"),
            "abcdefghijklmnopqrst..."
        );
        assert_eq!(mask_token("short"), "short...");
    }

    #[test]
    fn fcm_payload_shape() {
        let msg = PushMessage::new("Hi", "There")
            .with_data("type", "test_notification")
            .with_action("dismiss", "Dismiss");
        let v = msg.to_fcm("tok");
        assert_eq!(v["message"]["token"], "tok");
        assert_eq!(v["message"]["notification"]["title"], "Hi");
        assert_eq!(v["message"]["data"]["type"], "test_notification");
        assert_eq!(v["message"]["webpush"]["notification"]["requireInteraction"], true);
        assert_eq!(v["message"]["webpush"]["notification"]["actions"][0]["action"], "dismiss");

        let bare = PushMessage::new("a", "b").to_fcm("t");
        assert!(bare["message"].get("data").is_none());
    }

    #[test]
    fn merged_data_is_stringified() {
        let extra = json!({ "order": 42, "urgent": true, "note": "x" });
        let msg = PushMessage::new("t", "b").merge_data(extra.as_object());
        assert_eq!(msg.data["order"], "42");
        assert_eq!(msg.data["urgent"], "true");
        assert_eq!(msg.data["note"], "x");
    }

    #[test]
    fn sends_and_caches_access_token() {
        let mut server = mockito::Server::new();
        let token = server
            .mock("POST", "/token")
            .match_body(Matcher::UrlEncoded(
                "grant_type".into(),
                "urn:ietf:params:oauth:grant-type:jwt-bearer".into(),
            ))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token":"ya29.test","expires_in":3599}"#)
            .expect(1)
            .create();
        let send = server
            .mock("POST", "/v1/projects/demo/messages:send")
            .match_header("authorization", "Bearer ya29.test")
            .match_body(Matcher::PartialJson(json!({
                "message": { "token": "device-token-1", "notification": { "title": "Hello" } }
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"name":"projects/demo/messages/1"}"#)
            .expect(2)
            .create();

        let fcm = client(&server);
        let msg = PushMessage::new("Hello", "World");
        let first = fcm.send_to_one("device-token-1", &msg).unwrap();
        assert_eq!(first["name"], "projects/demo/messages/1");
        fcm.send_to_one("device-token-1", &msg).unwrap();

        token.assert();
        send.assert();
    }

    #[test]
    fn send_to_many_reports_each_token() {
        let mut server = mockito::Server::new();
        server
            .mock("POST", "/token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token":"ya29.test"}"#)
            .create();
        server
            .mock("POST", "/v1/projects/demo/messages:send")
            .match_body(Matcher::PartialJson(json!({ "message": { "token": "good-token" } })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"name":"ok"}"#)
            .create();
        server
            .mock("POST", "/v1/projects/demo/messages:send")
            .match_body(Matcher::PartialJson(json!({ "message": { "token": "stale-token" } })))
            .with_status(404)
            .with_body(r#"{"error":{"status":"NOT_FOUND"}}"#)
            .create();

        let report = client(&server).send_to_many(
            &["good-token".to_string(), "stale-token".to_string()],
            &PushMessage::new("t", "b"),
        );
        assert_eq!(
            report.summary,
            PushSummary {
                total_sent: 2,
                successful: 1,
                failed: 1
            }
        );
        assert!(report.results[0].success);
        assert_eq!(report.results[1].token, "stale-token...");
        assert!(report.results[1].error.as_deref().unwrap().contains("NOT_FOUND"));
    }

    #[test]
    fn token_exchange_failure_is_push_error() {
        let mut server = mockito::Server::new();
        server
            .mock("POST", "/token")
            .with_status(400)
            .with_body(r#"{"error":"invalid_grant"}"#)
            .create();
        let err = client(&server)
            .send_to_one("t", &PushMessage::new("t", "b"))
            .unwrap_err();
        assert!(matches!(err, DeskError::Push(ref m) if m.contains("invalid_grant")));
    }

    #[test]
    fn unconfigured_push_is_disabled() {
        let sender = from_config(&PushConfig::default()).unwrap();
        let report = sender.send_to_many(&["abc".to_string()], &PushMessage::new("t", "b"));
        assert_eq!(report.summary.failed, 1);
    }

    #[test]
    fn missing_key_file_is_reported() {
        let cfg = PushConfig {
            project_id: Some("demo".into()),
            service_account_path: Some("/nonexistent/key.json".into()),
            ..PushConfig::default()
        };
        assert!(matches!(from_config(&cfg), Err(DeskError::Push(_))));
    }
}
