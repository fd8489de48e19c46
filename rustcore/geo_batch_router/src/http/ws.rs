//! Live progress WebSocket (C8 boundary, `spec.md` §4.8, §6). A client
//! connects, sends a `{"subscribe": "<jobId>"}` message, and receives a
//! stream of `JobEvent`s for that job until it unsubscribes or
//! disconnects.

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use serde::Deserialize;

use crate::model::job::JobEvent;

use super::state::AppState;

pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ClientMessage {
    Subscribe { subscribe: String },
    Unsubscribe { unsubscribe: String },
}

async fn handle_socket(mut socket: WebSocket, state: AppState) {
    let client_id = state.next_client_id();
    let mut subscribed_job: Option<String> = None;
    let mut events: Option<tokio::sync::mpsc::Receiver<JobEvent>> = None;

    loop {
        tokio::select! {
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(ClientMessage::Subscribe { subscribe: job_id }) => {
                                if let Some(previous) = subscribed_job.take() {
                                    state.broadcaster.unsubscribe(&previous, client_id);
                                }
                                events = Some(state.broadcaster.subscribe(&job_id, client_id));
                                subscribed_job = Some(job_id);
                            }
                            Ok(ClientMessage::Unsubscribe { unsubscribe: job_id }) => {
                                state.broadcaster.unsubscribe(&job_id, client_id);
                                if subscribed_job.as_deref() == Some(job_id.as_str()) {
                                    subscribed_job = None;
                                    events = None;
                                }
                            }
                            Err(_) => {
                                let _ = socket
                                    .send(Message::Text(r#"{"error":"unrecognized message"}"#.to_string()))
                                    .await;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
            event = recv_optional(&mut events) => {
                if let Some(event) = event {
                    let Ok(payload) = serde_json::to_string(&event) else { continue };
                    if socket.send(Message::Text(payload)).await.is_err() {
                        break;
                    }
                }
            }
        }
    }

    if let Some(job_id) = subscribed_job {
        state.broadcaster.unsubscribe(&job_id, client_id);
    }
}

/// Awaits the current subscription's next event, or never resolves when
/// there is no active subscription — lets the `select!` above treat "not
/// subscribed yet" as a branch that simply never wins.
async fn recv_optional(events: &mut Option<tokio::sync::mpsc::Receiver<JobEvent>>) -> Option<JobEvent> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
