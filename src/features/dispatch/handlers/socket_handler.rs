use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{
    stream::{SplitSink, StreamExt},
    SinkExt,
};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::features::auth::guards::RequireDriver;
use crate::features::dispatch::models::ServerMessage;
use crate::features::dispatch::services::DispatchSessionService;

/// State for the real-time dispatch channel
#[derive(Clone)]
pub struct DispatchSocketState {
    pub session_service: Arc<DispatchSessionService>,
    pub outbox_capacity: usize,
}

/// Open the responder's real-time dispatch channel
///
/// Frames are JSON `{ "event": ..., "data": ... }` in both directions.
#[utoipa::path(
    get,
    path = "/ws/dispatch",
    responses(
        (status = 101, description = "Switching to the WebSocket protocol"),
        (status = 401, description = "Missing or invalid token"),
        (status = 403, description = "Driver access required")
    ),
    security(("bearer_auth" = [])),
    tag = "dispatch"
)]
pub async fn dispatch_socket(
    RequireDriver(user): RequireDriver,
    State(state): State<DispatchSocketState>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| run_session(socket, state, user.sub))
}

async fn run_session(socket: WebSocket, state: DispatchSocketState, responder_id: String) {
    let (sink, mut frames) = socket.split();
    let (outbox, queue) = mpsc::channel::<ServerMessage>(state.outbox_capacity);

    let directory = state.session_service.directory();
    let connection_id = directory.connect(&responder_id, outbox.clone()).await;
    tracing::info!(
        "Responder {} connected to dispatch channel (connection {})",
        responder_id,
        connection_id
    );

    let mut writer = tokio::spawn(drain_outbox(sink, queue));

    loop {
        tokio::select! {
            _ = &mut writer => break,
            frame = frames.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    let reply = state
                        .session_service
                        .handle_frame(&responder_id, connection_id, text.as_str())
                        .await;
                    let Some(reply) = reply else { continue };
                    if outbox.send(reply).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Binary(_))) => {
                    let reply = ServerMessage::error("Binary frames are not supported");
                    if outbox.send(reply).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                // Ping/pong are answered by the protocol layer
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!("Dispatch socket error for {}: {}", responder_id, e);
                    break;
                }
            },
        }
    }

    let removed = directory.disconnect(&responder_id, connection_id).await;
    drop(outbox);
    writer.abort();
    tracing::info!(
        "Responder {} disconnected (connection {}, session removed: {})",
        responder_id,
        connection_id,
        removed
    );
}

/// Single writer per connection, so frames leave in queue order
async fn drain_outbox(mut sink: SplitSink<WebSocket, Message>, queue: mpsc::Receiver<ServerMessage>) {
    let mut queue = ReceiverStream::new(queue);

    while let Some(message) = queue.next().await {
        let replaced = matches!(message, ServerMessage::SessionReplaced);
        if sink.send(Message::Text(message.to_json().into())).await.is_err() {
            break;
        }
        if replaced {
            let _ = sink.send(Message::Close(None)).await;
            break;
        }
    }
}
