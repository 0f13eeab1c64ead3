//! Server-Sent Events endpoint

use axum::response::sse::{Event, Sse};
use axum::{extract::State, routing::get, Router};
use futures::stream::Stream;
use std::convert::Infallible;

use crate::AppState;

/// GET /events
///
/// Streams every bus event to the client as JSON.
pub async fn events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    curator_common::sse::event_bus_sse_stream("curator-mc", &state.event_bus)
}

/// Build SSE routes
pub fn sse_routes() -> Router<AppState> {
    Router::new().route("/events", get(events))
}
