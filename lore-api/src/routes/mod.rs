pub mod ask;
mod error;
pub mod resources;

use axum::response::sse::Event;
use serde::Serialize;

pub use error::ApiError;

/// Build a named SSE event with a JSON body.
pub(crate) fn sse_event<T: Serialize>(name: &str, data: &T) -> Event {
    match serde_json::to_string(data) {
        Ok(json) => Event::default().event(name).data(json),
        Err(err) => {
            tracing::error!("failed to serialize {} event: {}", name, err);
            Event::default()
                .event("error")
                .data("{\"error\":\"serialization failed\"}")
        }
    }
}
