//! WebSocket connection handling
//!
//! Each text frame carries one JSON protocol message. The socket is adapted
//! into a message sink and stream and handed to the sync server, which owns
//! the connection until either side closes.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::future::ready;
use futures::{SinkExt, StreamExt};
use statesync_core::{codec, ClientMessage, ServerMessage};
use std::sync::Arc;
use tracing::{debug, info};

use crate::AppState;

/// Handle WebSocket upgrade
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Handle individual WebSocket connection
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    info!("New WebSocket connection established");
    let max_size = state.sync.config().max_message_size;
    let (sender, receiver) = socket.split();

    let sink = sender.with(|msg: ServerMessage| {
        ready(
            codec::encode(&msg)
                .map(Message::Text)
                .map_err(axum::Error::new),
        )
    });

    let stream = receiver
        .take_while(|frame| ready(!matches!(frame, Ok(Message::Close(_)) | Err(_))))
        .filter_map(move |frame| {
            ready(match frame {
                Ok(Message::Text(text)) => Some(codec::decode::<ClientMessage>(&text, max_size)),
                Ok(Message::Binary(data)) => {
                    debug!("Ignoring {} byte binary frame", data.len());
                    None
                }
                _ => None,
            })
        });

    state.sync.clone().serve_connection(sink, stream).await;
}
