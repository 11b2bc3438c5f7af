//! Push channel manager: one live WebSocket per session, reconnected on a
//! fixed delay for as long as the session stays active.
//!
//! The channel walks `Disconnected -> Connecting -> Connected` and falls
//! back to `Disconnected` on any close or error. Each drop schedules the
//! next attempt after [`RECONNECT_DELAY`]; there is no backoff, no jitter
//! and no retry cap. The whole loop runs inside one task owned by the
//! client, so `teardown` (logout) cancels both the connection and any
//! pending reconnect timer by aborting that task.

use std::{sync::Arc, time::Duration};

use futures::StreamExt;
use shared::{domain::UserId, protocol::PushEvent};
use tokio_tungstenite::{connect_async, tungstenite::Message as WsFrame};
use tracing::{debug, warn};
use url::Url;

use crate::{ChatClient, ClientError};

pub const RECONNECT_DELAY: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Disconnected,
    Connecting,
    Connected,
}

/// Derives the channel address from the HTTP base URL and the session's
/// user id: `http(s)://host` becomes `ws(s)://host/ws/{user_id}`.
pub(crate) fn push_channel_url(base_url: &str, user_id: UserId) -> Result<String, ClientError> {
    let mut url = Url::parse(base_url)
        .map_err(|err| ClientError::Validation(format!("invalid server url: {err}")))?;
    let scheme = match url.scheme() {
        "http" => "ws",
        "https" => "wss",
        other => {
            return Err(ClientError::Validation(format!(
                "server url must be http or https, got {other}"
            )))
        }
    };
    url.set_scheme(scheme)
        .map_err(|()| ClientError::Validation("server url scheme cannot be rewritten".into()))?;
    url.set_path(&format!("/ws/{}", user_id.0));
    url.set_query(None);
    Ok(url.to_string())
}

/// Body of the channel task. Exits only when the session is deactivated;
/// every other failure is logged and retried.
pub(crate) async fn run_push_channel(client: Arc<ChatClient>, ws_url: String) {
    loop {
        if !client.session_active().await {
            break;
        }
        client.set_channel_state(ChannelState::Connecting).await;

        match connect_async(&ws_url).await {
            Ok((stream, _)) => {
                client.set_channel_state(ChannelState::Connected).await;
                debug!(url = %ws_url, "push: channel connected");

                let (_, mut reader) = stream.split();
                while let Some(frame) = reader.next().await {
                    match frame {
                        Ok(WsFrame::Text(text)) => match serde_json::from_str::<PushEvent>(&text) {
                            Ok(event) => client.handle_push_event(event).await,
                            Err(err) => {
                                warn!("push: dropping malformed frame: {err}");
                            }
                        },
                        Ok(WsFrame::Close(_)) => break,
                        Ok(_) => {}
                        Err(err) => {
                            warn!("push: receive failed: {err}");
                            break;
                        }
                    }
                }
            }
            Err(err) => {
                warn!(url = %ws_url, "push: connect failed: {err}");
            }
        }

        client.set_channel_state(ChannelState::Disconnected).await;
        if !client.session_active().await {
            break;
        }
        tokio::time::sleep(client.reconnect_delay()).await;
    }
}

#[cfg(test)]
#[path = "tests/push_tests.rs"]
mod tests;
