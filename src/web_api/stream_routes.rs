//! WebSocket routes
//!
//! `/stream/:camera_id` attaches a viewer to a running pipeline and sends one
//! binary message per JPEG frame. Cameras without a pipeline get an empty
//! 404 and no upgrade. `/events` carries lifecycle events as JSON text.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use futures::{SinkExt, StreamExt};

use crate::error::{Error, Result};
use crate::frame_broadcast::Subscription;
use crate::state::AppState;

pub fn stream_routes() -> Router<AppState> {
    Router::new()
        .route("/stream/:camera_id", get(stream_handler))
        .route("/events", get(events_handler))
}

async fn stream_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(camera_id): Path<String>,
) -> Result<Response> {
    let pipeline = state
        .registry()
        .get(&camera_id)
        .await
        .ok_or_else(|| Error::RouteNotFound(camera_id.clone()))?;

    // Fails if the pipeline was torn down after the lookup
    let subscription = pipeline.broadcaster().register()?;

    Ok(ws.on_upgrade(move |socket| serve_viewer(socket, camera_id, subscription)))
}

async fn serve_viewer(socket: WebSocket, camera_id: String, mut subscription: Subscription) {
    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            frame = subscription.recv() => match frame {
                Some(frame) => {
                    if sender.send(Message::Binary(frame.to_vec())).await.is_err() {
                        break;
                    }
                }
                None => {
                    // Pipeline stopped
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }
            },
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    tracing::debug!(camera_id = %camera_id, error = %e, "Viewer socket error");
                    break;
                }
                // Client payloads are ignored
                Some(Ok(_)) => {}
            },
        }
    }

    tracing::debug!(
        camera_id = %camera_id,
        viewer_id = subscription.id(),
        "Viewer connection closed"
    );
}

async fn events_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_events(socket, state))
}

async fn handle_events(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let (conn_id, mut rx) = state.realtime.register().await;

    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sender.send(Message::Text(msg)).await.is_err() {
                break;
            }
        }
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = receiver.next().await {
            match result {
                Ok(Message::Close(_)) => break,
                Err(e) => {
                    tracing::warn!(connection_id = %conn_id, error = %e, "Event socket error");
                    break;
                }
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    state.realtime.unregister(&conn_id).await;
}
