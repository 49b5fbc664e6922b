use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use coordinator::{Connection, Dispatch};
use futures::{SinkExt, StreamExt};
use shared::{
    error::ProtocolError,
    protocol::{ClientRequest, ServerEvent},
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::app_state::AppState;

pub(crate) async fn serve_connection(state: Arc<AppState>, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();
    let (outbox, mut inbox) = mpsc::unbounded_channel::<ServerEvent>();
    let mut conn = Connection::new(state.next_connection_id(), outbox);
    let connection_id = conn.id();
    info!(%connection_id, "connection opened");

    let send_task = tokio::spawn(async move {
        while let Some(event) = inbox.recv().await {
            let text = match event.encode() {
                Ok(v) => v,
                Err(error) => {
                    warn!(%connection_id, %error, "dropping unencodable event");
                    continue;
                }
            };
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(frame) = receiver.next().await {
        let text = match frame {
            Ok(Message::Text(text)) => text,
            Ok(Message::Binary(_)) => {
                debug!(%connection_id, error = %ProtocolError::BinaryFrame, "frame ignored");
                continue;
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(error) => {
                debug!(%connection_id, %error, "websocket receive failed");
                break;
            }
        };

        let request = match ClientRequest::decode(&text) {
            Ok(request) => request,
            Err(error) => {
                debug!(%connection_id, %error, "frame ignored");
                continue;
            }
        };
        debug!(%connection_id, kind = request.kind(), "request received");

        if let Dispatch::Execute(pending) = state.coordinator.dispatch(&mut conn, request).await {
            tokio::spawn(pending.run());
        }
    }

    state.coordinator.leave(&mut conn).await;
    send_task.abort();
    info!(%connection_id, "connection closed");
}
