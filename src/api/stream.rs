//! Live snapshot streaming
//!
//! Both transports push the same immutable snapshots the engine publishes
//! after each step. The watch channel keeps only the latest value, so a slow
//! client skips intermediate steps instead of building a backlog.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use futures::stream::{SplitSink, Stream};
use futures_util::{SinkExt, StreamExt};
use tracing::debug;

use crate::controller::{AppState, StepSnapshot};

/// Server-sent events: one `snapshot` event per published step.
pub async fn sse_snapshots(
    State(st): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = st.engine.subscribe();
    let stream = futures::stream::unfold(rx, |mut rx| async move {
        if rx.changed().await.is_err() {
            return None;
        }
        let snapshot = rx.borrow_and_update().clone();
        let event = Event::default()
            .event("snapshot")
            .json_data(snapshot.as_ref())
            .ok()?;
        Some((Ok::<_, Infallible>(event), rx))
    });
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

/// WebSocket: sends the current snapshot on connect, then every published
/// step as a JSON text frame. Inbound frames are ignored apart from close.
pub async fn ws_snapshots(ws: WebSocketUpgrade, State(st): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| push_snapshots(socket, st))
}

async fn push_snapshots(socket: WebSocket, st: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let mut rx = st.engine.subscribe();

    let current = rx.borrow_and_update().clone();
    if send_snapshot(&mut sender, &current).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = rx.borrow_and_update().clone();
                if send_snapshot(&mut sender, &snapshot).await.is_err() {
                    break;
                }
            }
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }
    debug!("websocket subscriber disconnected");
}

async fn send_snapshot(
    sender: &mut SplitSink<WebSocket, Message>,
    snapshot: &StepSnapshot,
) -> Result<(), axum::Error> {
    match serde_json::to_string(snapshot) {
        Ok(payload) => sender.send(Message::Text(payload)).await,
        Err(e) => Err(axum::Error::new(e)),
    }
}
