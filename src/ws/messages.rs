//! WebSocket message types: envelope, commands, and server messages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::MarketError;

/// Top-level WebSocket message envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsMessage {
    /// Client-provided ID for requests; server-generated for events.
    pub id: String,
    /// Message type discriminator.
    #[serde(rename = "type")]
    pub msg_type: WsMessageType,
    /// ISO-8601 timestamp.
    pub timestamp: DateTime<Utc>,
    /// Variant-specific payload.
    pub payload: serde_json::Value,
}

impl WsMessage {
    /// Server-generated message with a fresh id.
    #[must_use]
    pub fn server(msg_type: WsMessageType, payload: serde_json::Value) -> Self {
        Self::reply(uuid::Uuid::new_v4().to_string(), msg_type, payload)
    }

    /// Message answering the request identified by `id`.
    #[must_use]
    pub fn reply(id: String, msg_type: WsMessageType, payload: serde_json::Value) -> Self {
        Self {
            id,
            msg_type,
            timestamp: Utc::now(),
            payload,
        }
    }

    /// Error reply carrying the same code and message as the REST body.
    #[must_use]
    pub fn error(id: String, err: &MarketError) -> Self {
        Self::reply(
            id,
            WsMessageType::Error,
            serde_json::json!({
                "code": err.error_code(),
                "message": err.to_string(),
            }),
        )
    }
}

/// Discriminator for WebSocket message types.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WsMessageType {
    /// Client → Server command.
    Command,
    /// Server → Client response to a command.
    Response,
    /// Server → Client broadcast [`crate::domain::MarketEvent`].
    Event,
    /// Server → Client home view snapshot from `watch_home`.
    HomeView,
    /// Server → Client error.
    Error,
}

/// Commands that a client can send in the payload of a `command` message.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum WsCommand {
    /// Subscribe to events for specific jobs.
    Subscribe {
        /// Job IDs to subscribe to. Use `["*"]` for all jobs.
        job_ids: Vec<String>,
    },
    /// Unsubscribe from events for specific jobs.
    Unsubscribe {
        /// Job IDs to unsubscribe from.
        job_ids: Vec<String>,
    },
    /// Stream the caller's home view. Requires `x-user-uid` on the upgrade
    /// request. Sent again while watching, it moves the running watch.
    WatchHome {
        /// Viewer latitude.
        #[serde(default)]
        lat: Option<f64>,
        /// Viewer longitude.
        #[serde(default)]
        lon: Option<f64>,
    },
    /// Stop streaming the home view.
    UnwatchHome,
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn parses_subscribe_command() {
        let Ok(cmd) = serde_json::from_value::<WsCommand>(serde_json::json!({
            "command": "subscribe",
            "job_ids": ["*"]
        })) else {
            panic!("command parses");
        };
        assert_eq!(
            cmd,
            WsCommand::Subscribe {
                job_ids: vec!["*".to_string()]
            }
        );
    }

    #[test]
    fn watch_home_position_is_optional() {
        let Ok(cmd) = serde_json::from_value::<WsCommand>(serde_json::json!({
            "command": "watch_home"
        })) else {
            panic!("command parses");
        };
        assert_eq!(cmd, WsCommand::WatchHome { lat: None, lon: None });
    }

    #[test]
    fn error_reply_carries_code() {
        let msg = WsMessage::error("req-1".to_string(), &MarketError::MissingIdentity);
        assert_eq!(msg.id, "req-1");
        assert_eq!(msg.msg_type, WsMessageType::Error);
        assert_eq!(msg.payload.get("code"), Some(&serde_json::json!(1002)));
    }
}
