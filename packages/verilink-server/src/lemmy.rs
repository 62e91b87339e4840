//! Lemmy content platform client.
//!
//! Resolves usernames and sends private messages through the Lemmy v3 REST
//! API.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use verilink_core::linking::ContentAccount;
use verilink_core::ports::ContentPlatform;
use verilink_core::{Error, Result};

/// Person as returned by `GET /api/v3/user`.
#[derive(Debug, Deserialize)]
struct Person {
    id: i64,
    name: String,
}

#[derive(Debug, Deserialize)]
struct PersonView {
    person: Person,
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    person_view: PersonView,
}

#[derive(Debug, Serialize)]
struct CreatePrivateMessage<'a> {
    content: &'a str,
    recipient_id: i64,
}

/// REST client for a Lemmy instance.
#[derive(Clone)]
pub struct LemmyClient {
    http: Client,
    base_url: String,
    token: Option<String>,
}

impl LemmyClient {
    /// Create a client for the instance at `base_url`.
    ///
    /// `token` is the bot account's JWT; without it messages cannot be sent.
    pub fn new(base_url: &str, token: Option<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        }
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/api/v3/{}", self.base_url, path)
    }
}

/// Lemmy reports unknown users with 404 or with 400 `couldnt_find_person`.
fn is_unknown_user(status: StatusCode) -> bool {
    status == StatusCode::NOT_FOUND || status == StatusCode::BAD_REQUEST
}

fn account_from(response: UserResponse) -> ContentAccount {
    let person = response.person_view.person;
    ContentAccount::new(person.id, person.name)
}

#[async_trait]
impl ContentPlatform for LemmyClient {
    async fn lookup_identity(&self, username: &str) -> Result<Option<ContentAccount>> {
        let response = self
            .http
            .get(self.api_url("user"))
            .query(&[("username", username)])
            .send()
            .await
            .map_err(|e| Error::ContentPlatform(format!("User lookup failed: {}", e)))?;

        let status = response.status();
        if is_unknown_user(status) {
            tracing::debug!(username, %status, "Content platform does not know this user");
            return Ok(None);
        }
        if !status.is_success() {
            return Err(Error::ContentPlatform(format!(
                "User lookup returned {}",
                status
            )));
        }

        let body: UserResponse = response
            .json()
            .await
            .map_err(|e| Error::ContentPlatform(format!("Invalid user response: {}", e)))?;

        Ok(Some(account_from(body)))
    }

    async fn send_direct_message(&self, account_id: i64, text: &str) -> Result<()> {
        let token = self
            .token
            .as_deref()
            .ok_or_else(|| Error::NotConfigured("content platform token".into()))?;

        let response = self
            .http
            .post(self.api_url("private_message"))
            .bearer_auth(token)
            .json(&CreatePrivateMessage {
                content: text,
                recipient_id: account_id,
            })
            .send()
            .await
            .map_err(|e| Error::DeliveryFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Error::DeliveryFailed(format!(
                "Private message returned {}",
                response.status()
            )));
        }

        tracing::info!(account_id, "Private message delivered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_url_strips_trailing_slash() {
        let client = LemmyClient::new("https://lemmy.example/", None);
        assert_eq!(client.api_url("user"), "https://lemmy.example/api/v3/user");
    }

    #[test]
    fn test_parse_user_response() {
        let body = serde_json::json!({
            "person_view": {
                "person": { "id": 7, "name": "nimrod", "actor_id": "https://lemmy.example/u/nimrod" },
                "counts": { "post_count": 3 }
            },
            "moderates": []
        });
        let parsed: UserResponse = serde_json::from_value(body).unwrap();
        assert_eq!(account_from(parsed), ContentAccount::new(7, "nimrod"));
    }

    #[test]
    fn test_unknown_user_statuses() {
        assert!(is_unknown_user(StatusCode::NOT_FOUND));
        assert!(is_unknown_user(StatusCode::BAD_REQUEST));
        assert!(!is_unknown_user(StatusCode::INTERNAL_SERVER_ERROR));
    }

    #[tokio::test]
    async fn test_send_without_token_is_not_configured() {
        let client = LemmyClient::new("http://127.0.0.1:9", None);
        let err = client.send_direct_message(7, "hi").await.unwrap_err();
        assert!(matches!(err, Error::NotConfigured(_)));
    }

    #[test]
    fn test_private_message_body() {
        let body = serde_json::to_value(CreatePrivateMessage {
            content: "hello",
            recipient_id: 7,
        })
        .unwrap();
        assert_eq!(body, serde_json::json!({ "content": "hello", "recipient_id": 7 }));
    }
}
