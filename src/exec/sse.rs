// src/exec/sse.rs

//! Push-style notification sink.
//!
//! Serves accepted watch events to long-lived HTTP subscribers at `/event`,
//! one JSON object per line. Delivery is best-effort and live-only: each
//! subscriber buffers at most one pending event, and a subscriber that falls
//! behind misses older events instead of blocking the coordinator's fan-out.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::body::Body;
use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::stream;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::exec::{Executor, ExecutorFuture, WatchEvent};

pub struct SseExecutor {
    inner: Arc<SseState>,
}

struct SseState {
    addr: SocketAddr,
    events: broadcast::Sender<WatchEvent>,
    shutdown: CancellationToken,
}

impl SseExecutor {
    pub fn new(addr: SocketAddr, parent: CancellationToken) -> Self {
        // Capacity 1: at most one buffered event per subscriber.
        let (events, _) = broadcast::channel(1);
        Self {
            inner: Arc::new(SseState {
                addr,
                events,
                shutdown: parent.child_token(),
            }),
        }
    }
}

impl Executor for SseExecutor {
    fn start(&self) -> ExecutorFuture<'_> {
        let state = Arc::clone(&self.inner);
        Box::pin(async move {
            let app = Router::new()
                .route("/event", get(event_stream))
                .with_state(Arc::clone(&state));

            let listener = TcpListener::bind(state.addr)
                .await
                .with_context(|| format!("binding notification sink on {}", state.addr))?;
            info!(addr = %state.addr, "notification sink listening");

            let shutdown = state.shutdown.clone();
            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown.cancelled_owned())
                .await
                .context("serving notification sink")?;

            debug!("notification sink closed");
            Ok(())
        })
    }

    fn stop(&self) -> ExecutorFuture<'_> {
        let state = Arc::clone(&self.inner);
        Box::pin(async move {
            state.shutdown.cancel();
            Ok(())
        })
    }

    fn on_watch_event(&self, event: WatchEvent) -> ExecutorFuture<'_> {
        let state = Arc::clone(&self.inner);
        Box::pin(async move {
            if state.events.send(event).is_err() {
                debug!("no notification subscribers, event dropped");
            }
            Ok(())
        })
    }
}

async fn event_stream(State(state): State<Arc<SseState>>) -> impl IntoResponse {
    debug!("notification subscriber connected");
    let rx = state.events.subscribe();

    let body = stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let mut line = match serde_json::to_vec(&event) {
                        Ok(line) => line,
                        Err(_) => continue,
                    };
                    // Subscribers read line-framed JSON.
                    line.push(b'\n');
                    return Some((Ok::<_, Infallible>(line), rx));
                }
                // A slow subscriber only ever misses older events.
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    });

    (
        [(header::CONTENT_TYPE, "application/x-ndjson")],
        Body::from_stream(body),
    )
}
