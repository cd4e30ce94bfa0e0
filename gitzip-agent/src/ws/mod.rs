//! WebSocket endpoint for real-time job events.
//!
//! - Agent → client: every [`QueueEvent`] as `{"type": "job:status" | "job:progress", "payload": ...}`
//! - Client → agent: [`Request`] frames, answered with `{"type": "response" | "error", "payload": ...}`

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use serde_json::json;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use crate::api::requests::{dispatch, Request, Response};
use crate::api::AppState;
use crate::queue::QueueEvent;
use crate::utils::errors::GitzipError;

/// Maximum number of replies waiting for the writer
const REPLY_CAPACITY: usize = 64;

/// Reply to a request frame
#[derive(Debug, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum Reply {
    Response(Response),
    Error(serde_json::Value),
}

impl Reply {
    fn from_result(result: crate::Result<Response>) -> Self {
        match result {
            Ok(response) => Reply::Response(response),
            Err(e) => Reply::Error(error_payload(&e)),
        }
    }
}

fn error_payload(error: &GitzipError) -> serde_json::Value {
    json!({
        "kind": error.kind(),
        "message": error.to_string(),
        "recoverable": error.is_user_recoverable(),
    })
}

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle a WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState) {
    info!("New WebSocket client connected");

    let (mut sender, mut receiver) = socket.split();
    let mut events = state.queue.subscribe();
    let (reply_tx, mut reply_rx) = mpsc::channel::<String>(REPLY_CAPACITY);

    // Forward queue events and request replies to this client
    let mut send_task = tokio::spawn(async move {
        loop {
            let text = tokio::select! {
                event = events.recv() => match event {
                    Ok(event) => match encode_event(&event) {
                        Ok(json) => json,
                        Err(e) => {
                            error!("Failed to serialize event: {:?}", e);
                            continue;
                        }
                    },
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("WebSocket client lagged, {} event(s) dropped", skipped);
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                reply = reply_rx.recv() => match reply {
                    Some(json) => json,
                    None => break,
                },
            };
            if sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    // Handle incoming requests from the client
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            let Message::Text(text) = msg else {
                continue;
            };
            let reply = handle_frame(&state, text.as_str()).await;
            match serde_json::to_string(&reply) {
                Ok(json) => {
                    if reply_tx.send(json).await.is_err() {
                        break;
                    }
                }
                Err(e) => error!("Failed to serialize reply: {:?}", e),
            }
        }
    });

    // Wait for either task to finish (connection closed or error)
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    info!("WebSocket client disconnected");
}

/// Parse and run one request frame.
pub async fn handle_frame(state: &AppState, text: &str) -> Reply {
    match serde_json::from_str::<Request>(text) {
        Ok(request) => Reply::from_result(dispatch(state, request).await),
        Err(e) => {
            debug!("Failed to parse WebSocket request: {:?}", e);
            Reply::Error(error_payload(&GitzipError::Validation(format!(
                "malformed request: {e}"
            ))))
        }
    }
}

/// Serialize an event the way it goes over the wire.
pub fn encode_event(event: &QueueEvent) -> crate::Result<String> {
    Ok(serde_json::to_string(event)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_state;
    use crate::forge::memory::MemoryForge;
    use crate::transfer::progress::TransferProgress;

    #[tokio::test]
    async fn test_frame_dispatches_request() {
        let state = test_state(MemoryForge::new());
        let reply = handle_frame(&state, r#"{"type":"credential_status"}"#).await;
        let json = serde_json::to_value(&reply).unwrap();
        assert_eq!(json["type"], "response");
        assert_eq!(json["payload"]["type"], "credential");
        assert_eq!(json["payload"]["payload"]["configured"], false);
    }

    #[tokio::test]
    async fn test_malformed_frame_is_validation_error() {
        let state = test_state(MemoryForge::new());
        let reply = handle_frame(&state, r#"{"type":"pause"}"#).await;
        let json = serde_json::to_value(&reply).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["payload"]["kind"], "validation");
    }

    #[tokio::test]
    async fn test_failed_request_is_error_reply() {
        let state = test_state(MemoryForge::new());
        let reply = handle_frame(&state, r#"{"type":"retry","payload":{"job_id":"nope"}}"#).await;
        let json = serde_json::to_value(&reply).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["payload"]["kind"], "job_not_found");
    }

    #[test]
    fn test_event_encoding() {
        let json = encode_event(&QueueEvent::Progress {
            job_id: "test-job".to_string(),
            progress: TransferProgress::default(),
        })
        .unwrap();
        assert!(json.contains("job:progress"));
        assert!(json.contains("test-job"));
    }
}
