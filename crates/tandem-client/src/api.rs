//! Typed HTTP client for the Tandem API.

use std::collections::HashMap;

use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use tandem_shared::api::{
    AuthResponse, Candidate, LogInRequest, PendingRequest, PendingRequestsResponse,
    ProfileResponse, SearchResponse, SendMessageRequest, SendMessageResponse, SidebarResponse,
    SignUpRequest, UpdateProfileRequest,
};
use tandem_shared::constants::WS_PATH;
use tandem_shared::models::{Message, UserProfile};
use tandem_shared::types::{MessageId, RequestId, UserId};

use crate::error::{ClientError, Result};

/// One method per server operation. Holds the bearer token once signed
/// up or logged in.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Resume with a token kept from an earlier session.
    pub fn set_token(&mut self, token: impl Into<String>) {
        self.token = Some(token.into());
    }

    pub fn clear_token(&mut self) {
        self.token = None;
    }

    /// Address of the realtime socket for the current token.
    pub fn socket_url(&self) -> Result<String> {
        let token = self.token.as_deref().ok_or(ClientError::NotLoggedIn)?;
        let ws_base = if let Some(rest) = self.base_url.strip_prefix("https") {
            format!("wss{rest}")
        } else if let Some(rest) = self.base_url.strip_prefix("http") {
            format!("ws{rest}")
        } else {
            self.base_url.clone()
        };
        Ok(format!("{ws_base}{WS_PATH}?token={token}"))
    }

    // ─── Accounts ───

    pub async fn sign_up(&mut self, req: &SignUpRequest) -> Result<UserProfile> {
        let resp: AuthResponse = self
            .send(self.request(Method::POST, "/api/auth/signup").json(req))
            .await?;
        self.token = Some(resp.token);
        Ok(resp.user_data)
    }

    pub async fn log_in(&mut self, email: &str, password: &str) -> Result<UserProfile> {
        let req = LogInRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        let resp: AuthResponse = self
            .send(self.request(Method::POST, "/api/auth/login").json(&req))
            .await?;
        self.token = Some(resp.token);
        Ok(resp.user_data)
    }

    pub async fn check_auth(&self) -> Result<UserProfile> {
        let resp: ProfileResponse = self.authed(Method::GET, "/api/auth/check", None::<&()>).await?;
        Ok(resp.user)
    }

    pub async fn update_profile(&self, req: &UpdateProfileRequest) -> Result<UserProfile> {
        let resp: ProfileResponse = self
            .authed(Method::PUT, "/api/auth/update-profile", Some(req))
            .await?;
        Ok(resp.user)
    }

    // ─── Messages ───

    /// Friends and the sparse unseen-count map.
    pub async fn sidebar(&self) -> Result<(Vec<UserProfile>, HashMap<UserId, u32>)> {
        let resp: SidebarResponse = self.authed(Method::GET, "/api/messages/user", None::<&()>).await?;
        Ok((resp.users, resp.unseen_messages))
    }

    /// Conversation with `friend`. Entries that fail to decode are
    /// skipped rather than failing the whole history.
    pub async fn conversation(&self, friend: UserId) -> Result<Vec<Message>> {
        let path = format!("/api/messages/{friend}");
        let value: Value = self.authed(Method::GET, &path, None::<&()>).await?;
        let raw = match value.get("messages") {
            Some(Value::Array(items)) => items.clone(),
            _ => Vec::new(),
        };

        let mut messages = Vec::with_capacity(raw.len());
        for item in raw {
            match serde_json::from_value::<Message>(item) {
                Ok(message) => messages.push(message),
                Err(e) => debug!(error = %e, "Skipping undecodable history entry"),
            }
        }
        Ok(messages)
    }

    pub async fn mark_seen(&self, message: MessageId) -> Result<()> {
        let path = format!("/api/messages/mark/{message}");
        let _: Value = self.authed(Method::PUT, &path, None::<&()>).await?;
        Ok(())
    }

    pub async fn send_message(
        &self,
        to: UserId,
        text: Option<String>,
        image: Option<String>,
    ) -> Result<Message> {
        let path = format!("/api/messages/send/{to}");
        let body = SendMessageRequest { text, image };
        let resp: SendMessageResponse = self.authed(Method::POST, &path, Some(&body)).await?;
        Ok(resp.new_message)
    }

    // ─── Friends ───

    pub async fn search(&self, query: &str, include_friends: bool) -> Result<Vec<Candidate>> {
        let token = self.token.as_deref().ok_or(ClientError::NotLoggedIn)?;
        let builder = self
            .request(Method::GET, "/api/friends/search")
            .bearer_auth(token)
            .query(&[
                ("query", query.to_string()),
                ("includeFriends", include_friends.to_string()),
            ]);
        let resp: SearchResponse = self.send(builder).await?;
        Ok(resp.users)
    }

    pub async fn pending_requests(&self) -> Result<Vec<PendingRequest>> {
        let resp: PendingRequestsResponse = self
            .authed(Method::GET, "/api/friends/requests", None::<&()>)
            .await?;
        Ok(resp.requests)
    }

    pub async fn send_request(&self, to: UserId) -> Result<()> {
        let path = format!("/api/friends/request/{to}");
        let _: Value = self.authed(Method::POST, &path, None::<&()>).await?;
        Ok(())
    }

    pub async fn accept_request(&self, id: RequestId) -> Result<()> {
        let path = format!("/api/friends/accept/{id}");
        let _: Value = self.authed(Method::PUT, &path, None::<&()>).await?;
        Ok(())
    }

    pub async fn reject_request(&self, id: RequestId) -> Result<()> {
        let path = format!("/api/friends/reject/{id}");
        let _: Value = self.authed(Method::PUT, &path, None::<&()>).await?;
        Ok(())
    }

    // ─── Plumbing ───

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http.request(method, format!("{}{}", self.base_url, path))
    }

    async fn authed<B, T>(&self, method: Method, path: &str, body: Option<&B>) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let token = self.token.as_deref().ok_or(ClientError::NotLoggedIn)?;
        let mut builder = self.request(method, path).bearer_auth(token);
        if let Some(body) = body {
            builder = builder.json(body);
        }
        self.send(builder).await
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T> {
        let resp = builder.send().await?;
        let status = resp.status();
        let body = resp.bytes().await?;
        decode_envelope(status.as_u16(), parse_body(&body))
    }
}

/// Plain-text error bodies (extractor rejections, body-limit 413s) carry no
/// envelope; they decode as `Null` so the status code becomes the message.
fn parse_body(body: &[u8]) -> Value {
    serde_json::from_slice(body).unwrap_or(Value::Null)
}

/// Turn a `{success, ...}` body into `T`, or into `Rejected` with the
/// server's message.
fn decode_envelope<T: DeserializeOwned>(status: u16, value: Value) -> Result<T> {
    if value.get("success").and_then(Value::as_bool) != Some(true) {
        let message = value
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("HTTP {status}"));
        return Err(ClientError::Rejected(message));
    }
    Ok(serde_json::from_value(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_socket_url() {
        let mut api = ApiClient::new("http://localhost:5000/");
        assert!(matches!(api.socket_url(), Err(ClientError::NotLoggedIn)));

        api.set_token("abc.def.ghi");
        assert_eq!(
            api.socket_url().unwrap(),
            "ws://localhost:5000/ws?token=abc.def.ghi"
        );

        let mut secure = ApiClient::new("https://chat.example.com");
        secure.set_token("t");
        assert_eq!(secure.socket_url().unwrap(), "wss://chat.example.com/ws?token=t");
    }

    #[test]
    fn test_failure_envelope_becomes_rejected() {
        let err = decode_envelope::<Value>(
            403,
            json!({ "success": false, "message": "You can only send messages to friends" }),
        )
        .unwrap_err();
        match err {
            ClientError::Rejected(msg) => assert_eq!(msg, "You can only send messages to friends"),
            other => panic!("unexpected {other:?}"),
        }

        let err = decode_envelope::<Value>(500, json!({})).unwrap_err();
        assert!(matches!(err, ClientError::Rejected(m) if m == "HTTP 500"));
    }

    #[test]
    fn test_plain_text_body_becomes_rejected_with_status() {
        let body = parse_body(b"Failed to buffer the request body: length limit exceeded");
        assert_eq!(body, Value::Null);
        let err = decode_envelope::<Value>(413, body).unwrap_err();
        assert!(matches!(err, ClientError::Rejected(m) if m == "HTTP 413"));

        let err = decode_envelope::<Value>(400, parse_body(b"")).unwrap_err();
        assert!(matches!(err, ClientError::Rejected(m) if m == "HTTP 400"));

        let ok = parse_body(br#"{"success":true}"#);
        assert_eq!(ok, json!({ "success": true }));
    }

    #[test]
    fn test_success_envelope_decodes() {
        let friend = UserId::new();
        let resp: SidebarResponse = decode_envelope(
            200,
            json!({
                "success": true,
                "users": [],
                "unseenMessages": { (friend.to_string()): 2 },
            }),
        )
        .unwrap();
        assert_eq!(resp.unseen_messages.get(&friend), Some(&2));
    }
}
