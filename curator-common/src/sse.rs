//! Server-Sent Events (SSE) utilities
//!
//! Bridges the broadcast [`EventBus`](crate::events::EventBus) onto an
//! axum SSE response so web clients observe automation progress without
//! polling.

use crate::events::EventBus;
use axum::response::sse::{Event, Sse};
use futures::stream::Stream;
use std::convert::Infallible;
use std::time::Duration;
use tracing::{debug, info};

/// Create an SSE stream that forwards every bus event to the client
///
/// Events are serialized as JSON with the SSE event type set to the
/// variant name. Lagged receivers skip dropped events and continue.
pub fn event_bus_sse_stream(
    service_name: &'static str,
    bus: &EventBus,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!("New SSE client connected to {} events", service_name);
    let mut rx = bus.subscribe();

    let stream = async_stream::stream! {
        // Initial connected status so clients can show link state
        yield Ok(Event::default().event("ConnectionStatus").data("connected"));

        loop {
            match rx.recv().await {
                Ok(event) => {
                    let name = event.name();
                    match serde_json::to_string(&event) {
                        Ok(json) => yield Ok(Event::default().event(name).data(json)),
                        Err(e) => debug!("SSE: failed to serialize {}: {}", name, e),
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!("SSE: receiver lagged, skipped {} events", skipped);
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    };

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("heartbeat"),
    )
}
