//! WebSocket stream of hub events.

use std::sync::Arc;

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;

use remoteswitch_app::ports::SwitchDevice;
use remoteswitch_app::services::hub::{Hub, HubSubscription};
use remoteswitch_domain::event::HubEvent;

/// `GET /ws`: upgrade to a stream of JSON-encoded [`HubEvent`]s.
///
/// A new client first receives one `add` event per registered switch, then
/// every event the hub emits until either side closes the connection.
pub async fn upgrade<D: SwitchDevice>(
    State(state): State<crate::state::AppState<D>>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| client(socket, state.hub))
}

async fn client<D: SwitchDevice>(socket: WebSocket, hub: Arc<Hub<D>>) {
    let HubSubscription {
        replay,
        mut receiver,
    } = hub.subscribe();
    drop(hub);
    let (mut sink, mut incoming) = socket.split();
    tracing::debug!("websocket client connected");

    for event in &replay {
        if let Err(err) = send(&mut sink, event).await {
            tracing::debug!(error = %err, "websocket client gone during replay");
            return;
        }
    }

    loop {
        tokio::select! {
            message = incoming.next() => match message {
                Some(Ok(Message::Close(_)) | Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
            event = receiver.recv() => match event {
                Ok(event) => {
                    if let Err(err) = send(&mut sink, &event).await {
                        tracing::debug!(error = %err, "websocket write failed, dropping client");
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "websocket client lagged, some events were dropped");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }
    tracing::debug!("websocket client disconnected");
}

async fn send(
    sink: &mut SplitSink<WebSocket, Message>,
    event: &HubEvent,
) -> Result<(), axum::Error> {
    match serde_json::to_string(event) {
        Ok(json) => sink.send(Message::Text(json.into())).await,
        Err(err) => {
            tracing::warn!(%err, "failed to serialize hub event for websocket");
            Ok(())
        }
    }
}
