use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::{delete, get, post},
    Json, Router,
};
use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::{mpsc, oneshot};
use tracing::instrument;
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    domain::services::AnswerStream,
    domain::{ProcessRegistry, SearchResult},
    AppState,
};

use super::{sse_event, ApiError};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(ask))
        .route("/stream", get(ask_stream))
        .route("/stream/cancel/:process_id", delete(cancel_stream))
}

#[derive(Debug, Deserialize)]
struct AskBody {
    question: String,
}

#[derive(Debug, Serialize)]
struct AskResponse {
    result: SearchResult,
}

#[instrument(name = "POST /ask", skip(app_state, auth_user, body), fields(user_id = %auth_user.user_id))]
async fn ask(
    State(app_state): State<AppState>,
    auth_user: AuthUser,
    Json(body): Json<AskBody>,
) -> Result<Json<AskResponse>, ApiError> {
    // The blocking variant has no separate reference listener; the
    // references arrive embedded in the result.
    let (refs_tx, _refs_rx) = mpsc::channel(1);

    let result = app_state
        .search_service
        .get_answer(&body.question, refs_tx)
        .await?;

    Ok(Json(AskResponse { result }))
}

#[derive(Debug, Deserialize)]
struct AskStreamQuery {
    question: String,
}

/// Removes the process-registry entry on every exit path, including the
/// client silently disconnecting mid-stream.
struct ProcessGuard {
    registry: Arc<ProcessRegistry>,
    process_id: Uuid,
}

impl Drop for ProcessGuard {
    fn drop(&mut self) {
        self.registry.remove(self.process_id);
    }
}

/// Streams an answer: a `resources` event with the references, `chunk`
/// events in generation order, then exactly one terminal `complete`,
/// `error` or `cancelled` event.
#[instrument(name = "GET /ask/stream", skip(app_state, auth_user, query), fields(user_id = %auth_user.user_id))]
async fn ask_stream(
    State(app_state): State<AppState>,
    auth_user: AuthUser,
    Query(query): Query<AskStreamQuery>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    // Register before invoking the service so a cancel can never race the
    // stream's first poll.
    let (process_id, cancel_rx) = app_state.process_registry.register();
    let answer = app_state.search_service.get_answer_stream(query.question);

    let stream = answer_event_stream(
        process_id,
        cancel_rx,
        answer,
        app_state.process_registry.clone(),
    );

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keepalive"),
    )
}

fn answer_event_stream(
    process_id: Uuid,
    mut cancel_rx: oneshot::Receiver<()>,
    mut answer: AnswerStream,
    registry: Arc<ProcessRegistry>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    // Constructed outside the generator so the entry is released even if
    // the stream is dropped before its first poll.
    let guard = ProcessGuard {
        registry,
        process_id,
    };

    async_stream::stream! {
        let _guard = guard;

        loop {
            // Biased so cancellation wins immediately and buffered chunks
            // always drain before the final result.
            tokio::select! {
                biased;
                _ = &mut cancel_rx => {
                    yield Ok(sse_event("cancelled", &json!({ "processId": process_id })));
                    break;
                }
                Some(err) = answer.errors.recv() => {
                    yield Ok(sse_event(
                        "error",
                        &json!({ "processId": process_id, "error": err.to_string() }),
                    ));
                    break;
                }
                Some(chunk) = answer.chunks.recv() => {
                    yield Ok(sse_event(
                        "chunk",
                        &json!({ "processId": process_id, "content": chunk, "complete": false }),
                    ));
                }
                Some(references) = answer.references.recv() => {
                    yield Ok(sse_event("resources", &references));
                }
                result = answer.results.recv() => {
                    // None means the service task ended without a result; a
                    // buffered error would have matched the arm above first.
                    if let Some(result) = result {
                        yield Ok(sse_event(
                            "complete",
                            &json!({ "processId": process_id, "result": result, "complete": true }),
                        ));
                    }
                    break;
                }
            }
        }
    }
}

#[instrument(name = "DELETE /ask/stream/cancel/:process_id", skip(app_state, _auth_user))]
async fn cancel_stream(
    State(app_state): State<AppState>,
    _auth_user: AuthUser,
    Path(process_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if app_state.process_registry.cancel(process_id) {
        Ok(Json(json!({ "cancelled": process_id })))
    } else {
        Err(ApiError::not_found(format!(
            "no in-flight stream with process id {}",
            process_id
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    use crate::domain::services::SearchService;
    use crate::domain::vector_store::MockVectorStore;
    use crate::domain::Reference;

    fn references() -> Vec<Reference> {
        vec![Reference {
            resource_id: Some(Uuid::new_v4()),
            content: "context".to_string(),
            score: 0.8,
        }]
    }

    fn stream_for(
        vector_store: MockVectorStore,
        registry: &Arc<ProcessRegistry>,
    ) -> (Uuid, impl Stream<Item = Result<Event, Infallible>>) {
        let service = SearchService::with_defaults(Arc::new(vector_store));
        let (process_id, cancel_rx) = registry.register();
        let answer = service.get_answer_stream("question".to_string());
        let stream = answer_event_stream(process_id, cancel_rx, answer, registry.clone());
        (process_id, stream)
    }

    #[tokio::test]
    async fn stream_terminates_after_the_final_result() {
        let registry = Arc::new(ProcessRegistry::new());
        let (process_id, stream) = stream_for(
            MockVectorStore::new()
                .with_answer("one two")
                .with_references(references()),
            &registry,
        );

        // references + one chunk per word + complete, then end of stream.
        let events: Vec<_> = stream.collect().await;
        assert_eq!(events.len(), 4);
        assert!(!registry.contains(process_id));
    }

    #[tokio::test]
    async fn cancel_terminates_the_stream_within_one_poll() {
        let registry = Arc::new(ProcessRegistry::new());
        let (process_id, stream) = stream_for(
            MockVectorStore::new()
                .with_references(references())
                .stalling_generation(),
            &registry,
        );
        let mut stream = Box::pin(stream);

        // References arrive while generation is stuck.
        assert!(stream.next().await.is_some());

        assert!(registry.cancel(process_id));

        // The very next poll yields the terminal event and ends the stream,
        // with no polling delay.
        tokio::time::timeout(Duration::from_secs(1), async {
            assert!(stream.next().await.is_some());
            assert!(stream.next().await.is_none());
        })
        .await
        .expect("stream did not terminate after cancel");

        assert!(!registry.contains(process_id));
    }

    #[tokio::test]
    async fn dropping_the_stream_releases_the_registry_entry() {
        let registry = Arc::new(ProcessRegistry::new());
        let (process_id, stream) = stream_for(
            MockVectorStore::new()
                .with_references(references())
                .stalling_generation(),
            &registry,
        );

        // Client disconnects before the stream is ever polled.
        drop(stream);

        assert!(!registry.contains(process_id));
    }

    #[tokio::test]
    async fn retrieval_failure_yields_a_single_error_event() {
        let registry = Arc::new(ProcessRegistry::new());
        let (process_id, stream) =
            stream_for(MockVectorStore::new().failing_retrieval(), &registry);

        let events: Vec<_> = stream.collect().await;
        assert_eq!(events.len(), 1);
        assert!(!registry.contains(process_id));
    }
}
