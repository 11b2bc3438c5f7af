//! Stateless request/response wrappers over the backend's JSON API.
//!
//! Every route answers with the `{success, data|message}` envelope, so each
//! wrapper parses the body regardless of HTTP status and branches on
//! `success`: a reachable server reporting a domain failure becomes
//! [`ClientError::Domain`], while transport failures become
//! [`ClientError::Network`].

use reqwest::Client;
use serde::{de::DeserializeOwned, Serialize};
use shared::{
    domain::{RequestId, UserId},
    protocol::{
        ApiEnvelope, Friend, FriendRequest, FriendRequestBody, LoginRequest, Message,
        RegisterRequest, SendMessageRequest, Session, UserMatch,
    },
};

use crate::ClientError;

#[derive(Clone)]
pub struct Api {
    http: Client,
    base_url: String,
}

impl Api {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Creates the account only; the response carries no identity, so the
    /// caller signs in afterwards to obtain a [`Session`].
    pub async fn register(&self, username: &str, password: &str) -> Result<(), ClientError> {
        let envelope: ApiEnvelope<serde_json::Value> = self
            .post_json(
                "/api/register",
                &RegisterRequest {
                    username: username.to_string(),
                    password: password.to_string(),
                },
            )
            .await?;
        expect_ok(envelope)
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<Session, ClientError> {
        let envelope = self
            .post_json(
                "/api/login",
                &LoginRequest {
                    username: username.to_string(),
                    password: password.to_string(),
                },
            )
            .await?;
        expect_data(envelope)
    }

    pub async fn list_friends(&self, user_id: UserId) -> Result<Vec<Friend>, ClientError> {
        let envelope = self
            .get("/api/friends", &[("user_id", user_id.0.to_string())])
            .await?;
        expect_data(envelope)
    }

    /// Loads the full thread with `friend_id`, oldest first. The server
    /// marks the thread read as a side effect, which is why callers follow
    /// up with a friend-list reload.
    pub async fn list_messages(
        &self,
        friend_id: UserId,
        user_id: UserId,
    ) -> Result<Vec<Message>, ClientError> {
        let envelope = self
            .get(
                &format!("/api/messages/{}", friend_id.0),
                &[("user_id", user_id.0.to_string())],
            )
            .await?;
        expect_data(envelope)
    }

    pub async fn send_message(
        &self,
        sender_id: UserId,
        recipient_id: UserId,
        text: &str,
    ) -> Result<Message, ClientError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ClientError::Validation("message must not be empty".into()));
        }

        let envelope = self
            .post_json(
                "/api/messages",
                &SendMessageRequest {
                    sender_id,
                    recipient_id,
                    message: text.to_string(),
                },
            )
            .await?;
        expect_data(envelope)
    }

    /// Server-side the result excludes the requesting user and existing
    /// friends already.
    pub async fn search_users(
        &self,
        query: &str,
        user_id: UserId,
    ) -> Result<Vec<UserMatch>, ClientError> {
        let envelope = self
            .get(
                "/api/friends/search",
                &[
                    ("q", query.to_string()),
                    ("user_id", user_id.0.to_string()),
                ],
            )
            .await?;
        expect_data(envelope)
    }

    pub async fn send_friend_request(
        &self,
        user_id: UserId,
        username: &str,
    ) -> Result<(), ClientError> {
        let envelope: ApiEnvelope<serde_json::Value> = self
            .post_json(
                "/api/friends/request",
                &FriendRequestBody {
                    user_id,
                    username: username.to_string(),
                },
            )
            .await?;
        expect_ok(envelope)
    }

    pub async fn list_friend_requests(
        &self,
        user_id: UserId,
    ) -> Result<Vec<FriendRequest>, ClientError> {
        let envelope = self
            .get(
                "/api/friends/requests",
                &[("user_id", user_id.0.to_string())],
            )
            .await?;
        expect_data(envelope)
    }

    pub async fn accept_friend_request(&self, request_id: RequestId) -> Result<(), ClientError> {
        let envelope = self
            .post_empty(&format!("/api/friends/accept/{}", request_id.0))
            .await?;
        expect_ok(envelope)
    }

    pub async fn reject_friend_request(&self, request_id: RequestId) -> Result<(), ClientError> {
        let envelope = self
            .post_empty(&format!("/api/friends/reject/{}", request_id.0))
            .await?;
        expect_ok(envelope)
    }

    pub async fn remove_friend(
        &self,
        friend_id: UserId,
        user_id: UserId,
    ) -> Result<(), ClientError> {
        let envelope: ApiEnvelope<serde_json::Value> = self
            .http
            .delete(format!(
                "{}/api/friends/remove/{}",
                self.base_url, friend_id.0
            ))
            .query(&[("user_id", user_id.0)])
            .send()
            .await?
            .json()
            .await?;
        expect_ok(envelope)
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<ApiEnvelope<T>, ClientError> {
        let envelope = self
            .http
            .get(format!("{}{path}", self.base_url))
            .query(query)
            .send()
            .await?
            .json()
            .await?;
        Ok(envelope)
    }

    async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<ApiEnvelope<T>, ClientError> {
        let envelope = self
            .http
            .post(format!("{}{path}", self.base_url))
            .json(body)
            .send()
            .await?
            .json()
            .await?;
        Ok(envelope)
    }

    async fn post_empty(&self, path: &str) -> Result<ApiEnvelope<serde_json::Value>, ClientError> {
        let envelope = self
            .http
            .post(format!("{}{path}", self.base_url))
            .send()
            .await?
            .json()
            .await?;
        Ok(envelope)
    }
}

fn expect_data<T>(envelope: ApiEnvelope<T>) -> Result<T, ClientError> {
    if !envelope.success {
        return Err(ClientError::Domain(domain_reason(envelope.message)));
    }
    envelope
        .data
        .ok_or_else(|| ClientError::Domain("server reported success without data".into()))
}

fn expect_ok<T>(envelope: ApiEnvelope<T>) -> Result<(), ClientError> {
    if !envelope.success {
        return Err(ClientError::Domain(domain_reason(envelope.message)));
    }
    Ok(())
}

fn domain_reason(message: Option<String>) -> String {
    message.unwrap_or_else(|| "request failed".to_string())
}
