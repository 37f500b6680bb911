use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, info, warn};

use crate::handle::BridgeHandle;

/// Serve one websocket client: every broadcast batch becomes one text frame.
/// Anything the client sends is ignored apart from close.
pub async fn handle_websocket(socket: WebSocket, bridge: BridgeHandle) {
    let (mut sender, mut receiver) = socket.split();

    let mut conn = match bridge.connect().await {
        Ok(conn) => conn,
        Err(e) => {
            warn!("Failed to register websocket client: {}", e);
            let _ = sender.send(Message::Close(None)).await;
            return;
        }
    };
    let client = conn.client;
    info!(%client, "WebSocket client attached");

    loop {
        tokio::select! {
            payload = conn.inbox.recv() => {
                let Some(payload) = payload else {
                    debug!(%client, "bridge closed client outbox");
                    break;
                };
                if sender.send(Message::Text(payload.as_str().into())).await.is_err() {
                    debug!(%client, "send failed, dropping connection");
                    break;
                }
            }
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => {
                        info!(%client, "WebSocket connection closed");
                        break;
                    }
                    Some(Ok(Message::Text(_))) | Some(Ok(Message::Binary(_))) => {
                        debug!(%client, "ignoring message from client");
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(%client, "WebSocket error: {}", e);
                        break;
                    }
                }
            }
        }
    }

    if let Err(e) = bridge.disconnect(client).await {
        debug!(%client, "bridge gone before disconnect: {}", e);
    }
}
