//! WebSocket transport for upload sessions.
//!
//! The socket only feeds the session queue and forwards what comes back.
//!  Authentication happens inside the session with a `token` message.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};

use common::upload::{spawn_session, Inbound, Outbound};

use crate::ServiceState;

pub async fn handler(State(state): State<ServiceState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| run(socket, state))
}

async fn run(socket: WebSocket, state: ServiceState) {
    let (mut sender, mut receiver) = socket.split();
    let (handle, replies, session) = spawn_session(state.session_context());

    let mut forward = tokio::spawn(async move {
        while let Ok(outbound) = replies.recv_async().await {
            let message = match outbound {
                Outbound::Reply(reply) => Message::Text(reply.to_json()),
                Outbound::Close => {
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }
            };
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    let feeder = handle.clone();
    let mut feed = tokio::spawn(async move {
        while let Some(Ok(message)) = receiver.next().await {
            let inbound = match message {
                Message::Text(text) => Inbound::Text(text),
                Message::Binary(data) => Inbound::Binary(Bytes::from(data)),
                Message::Close(_) => break,
                Message::Ping(_) | Message::Pong(_) => continue,
            };
            if !feeder.push(inbound) {
                break;
            }
        }
    });

    let forward_done = tokio::select! {
        _ = &mut forward => {
            feed.abort();
            true
        }
        _ = &mut feed => false,
    };
    handle.close().await;
    drop(handle);

    match session.await {
        Ok(ended) => tracing::debug!(state = ?ended, "upload session ended"),
        Err(e) => tracing::error!(error = %e, "upload session task failed"),
    }
    // the reply channel is closed now, so the forwarder drains and exits
    if !forward_done {
        let _ = forward.await;
    }
}
