//! WebSocket connection state machine.
//!
//! Handles the read/write loop for a single WebSocket connection,
//! dispatching incoming commands, forwarding filtered events and
//! streaming the caller's home view.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use super::messages::{WsCommand, WsMessage, WsMessageType};
use super::subscription::{SubscriptionManager, parse_job_ids};
use crate::api::dto::PositionParams;
use crate::domain::{HomeView, JobId, MarketEvent, Uid};
use crate::error::MarketError;
use crate::service::{HomeWatch, MarketService};

/// What woke the connection loop.
enum Input {
    Client(Option<Result<Message, axum::Error>>),
    Event(Result<MarketEvent, RecvError>),
    View(Option<HomeView>),
}

/// Per-connection state.
#[derive(Debug)]
struct Session {
    service: Arc<MarketService>,
    viewer: Option<Uid>,
    subs: SubscriptionManager,
    home: Option<HomeWatch>,
}

/// Runs the read/write loop for a single WebSocket connection.
///
/// - Reads commands from the client and dispatches them.
/// - Forwards matching events from the [`broadcast::Receiver`] to the client.
/// - Pushes a `home_view` message whenever a running home watch emits.
pub async fn run_connection(
    socket: WebSocket,
    mut event_rx: broadcast::Receiver<MarketEvent>,
    service: Arc<MarketService>,
    viewer: Option<Uid>,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let mut session = Session {
        service,
        viewer,
        subs: SubscriptionManager::new(),
        home: None,
    };

    loop {
        let input = tokio::select! {
            msg = ws_rx.next() => Input::Client(msg),
            event = event_rx.recv() => Input::Event(event),
            view = next_view(&mut session.home) => Input::View(view),
        };

        let outgoing = match input {
            Input::Client(Some(Ok(Message::Text(text)))) => Some(session.handle_text(&text)),
            Input::Client(Some(Ok(Message::Close(_))) | None) => break,
            Input::Client(Some(Err(err))) => {
                debug!(error = %err, "ws read failed");
                break;
            }
            Input::Client(Some(Ok(_))) => None,
            Input::Event(Ok(event)) => session
                .subs
                .matches(event.job_id())
                .then(|| event_message(&event)),
            Input::Event(Err(RecvError::Lagged(n))) => {
                warn!(lagged = n, "ws client lagged behind event bus");
                None
            }
            Input::Event(Err(RecvError::Closed)) => break,
            Input::View(Some(view)) => Some(view_message(&view)),
            Input::View(None) => {
                debug!("home watch ended");
                session.home = None;
                None
            }
        };

        if let Some(msg) = outgoing {
            let Ok(json) = serde_json::to_string(&msg) else {
                continue;
            };
            if ws_tx.send(Message::text(json)).await.is_err() {
                break;
            }
        }
    }

    debug!(viewer = ?session.viewer, "ws connection closed");
}

impl Session {
    /// Handles a text frame, returning the reply to send.
    fn handle_text(&mut self, text: &str) -> WsMessage {
        let Ok(msg) = serde_json::from_str::<WsMessage>(text) else {
            return WsMessage::error(
                String::new(),
                &MarketError::Validation("malformed JSON".to_string()),
            );
        };
        if msg.msg_type != WsMessageType::Command {
            return WsMessage::error(
                msg.id,
                &MarketError::Validation("expected a command message".to_string()),
            );
        }
        let command = match serde_json::from_value::<WsCommand>(msg.payload) {
            Ok(command) => command,
            Err(err) => {
                return WsMessage::error(
                    msg.id,
                    &MarketError::Validation(format!("unknown command: {err}")),
                );
            }
        };
        match self.dispatch(command) {
            Ok(payload) => WsMessage::reply(msg.id, WsMessageType::Response, payload),
            Err(err) => WsMessage::error(msg.id, &err),
        }
    }

    fn dispatch(&mut self, command: WsCommand) -> Result<serde_json::Value, MarketError> {
        match command {
            WsCommand::Subscribe { job_ids } => {
                let (ids, wildcard) = parse_ids(&job_ids)?;
                self.subs.subscribe(&ids, wildcard);
                Ok(serde_json::json!({
                    "subscribed": ids.iter().map(ToString::to_string).collect::<Vec<_>>(),
                    "count": self.subs.count(),
                    "wildcard": self.subs.is_subscribed_all(),
                }))
            }
            WsCommand::Unsubscribe { job_ids } => {
                let (ids, wildcard) = parse_ids(&job_ids)?;
                self.subs.unsubscribe(&ids, wildcard);
                Ok(serde_json::json!({
                    "unsubscribed": ids.iter().map(ToString::to_string).collect::<Vec<_>>(),
                    "remaining_count": self.subs.count(),
                    "wildcard": self.subs.is_subscribed_all(),
                }))
            }
            WsCommand::WatchHome { lat, lon } => {
                let viewer = self.viewer.clone().ok_or(MarketError::MissingIdentity)?;
                let position = PositionParams { lat, lon }.position()?;
                if let Some(running) = &self.home {
                    let moved = running.move_to(position);
                    return Ok(serde_json::json!({ "watching_home": true, "moved": moved }));
                }
                debug!(viewer = %viewer, "home watch started");
                self.home = Some(self.service.watch_home(viewer, position));
                Ok(serde_json::json!({ "watching_home": true, "moved": false }))
            }
            WsCommand::UnwatchHome => {
                let was_watching = self.home.take().map(|mut watch| watch.cancel()).is_some();
                Ok(serde_json::json!({ "watching_home": false, "stopped": was_watching }))
            }
        }
    }
}

fn parse_ids(raw: &[String]) -> Result<(Vec<JobId>, bool), MarketError> {
    parse_job_ids(raw).map_err(|value| MarketError::Validation(format!("invalid job id {value:?}")))
}

/// Waits on the home watch, or forever when none is running.
async fn next_view(home: &mut Option<HomeWatch>) -> Option<HomeView> {
    match home {
        Some(watch) => watch.next().await,
        None => std::future::pending().await,
    }
}

fn event_message(event: &MarketEvent) -> WsMessage {
    WsMessage::server(
        WsMessageType::Event,
        serde_json::to_value(event).unwrap_or_default(),
    )
}

fn view_message(view: &HomeView) -> WsMessage {
    WsMessage::server(
        WsMessageType::HomeView,
        serde_json::to_value(view).unwrap_or_default(),
    )
}
