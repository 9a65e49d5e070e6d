use std::convert::Infallible;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Json, Router,
};
use futures::Stream;
use serde::Deserialize;
use serde_json::json;
use serde_with::serde_as;
use tokio::sync::mpsc;
use tracing::instrument;
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    domain::services::ResourceUpdate,
    domain::{NewResource, Resource, ResourceStatus, ResourceType, STATUS_CHANNEL_CAPACITY},
    AppState,
};

use super::{sse_event, ApiError};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(save_resource).get(list_resources))
        .route(
            "/:id",
            get(get_resource)
                .patch(update_resource)
                .delete(delete_resource),
        )
}

#[serde_as]
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SaveResourceBody {
    #[serde(rename = "type")]
    resource_type: ResourceType,
    #[serde_as(as = "serde_with::base64::Base64")]
    #[serde(default)]
    content: Vec<u8>,
    name: Option<String>,
    url: Option<String>,
}

impl From<SaveResourceBody> for NewResource {
    fn from(body: SaveResourceBody) -> Self {
        Self {
            name: body.name,
            resource_type: body.resource_type,
            content: body.content,
            url: body.url,
        }
    }
}

/// Accepts a submission and streams the pipeline's progress: a `resource`
/// event for the accepted row, `status_update` events for each transition,
/// then a terminal `completed` or `error` event.
#[instrument(name = "POST /resources", skip(app_state, auth_user, body), fields(user_id = %auth_user.user_id))]
async fn save_resource(
    State(app_state): State<AppState>,
    auth_user: AuthUser,
    Json(body): Json<SaveResourceBody>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (status_tx, mut status_rx) = mpsc::channel(STATUS_CHANNEL_CAPACITY);
    let service = app_state.resource_service.clone();

    let stream = async_stream::stream! {
        let resource = match service
            .save_resource(auth_user.user_id, body.into(), status_tx)
            .await
        {
            Ok(resource) => resource,
            Err(err) => {
                yield Ok(sse_event("error", &json!({ "error": err.to_string() })));
                return;
            }
        };

        yield Ok(sse_event("resource", &resource));

        while let Some(update) = status_rx.recv().await {
            yield Ok(sse_event("status_update", &update));

            match update.status {
                ResourceStatus::Completed => {
                    yield Ok(sse_event("completed", &json!({ "resourceId": update.resource_id })));
                    break;
                }
                ResourceStatus::Failed => {
                    yield Ok(sse_event(
                        "error",
                        &json!({ "resourceId": update.resource_id, "error": "indexing failed" }),
                    ));
                    break;
                }
                _ => {}
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keepalive"),
    )
}

#[instrument(name = "GET /resources", skip(app_state, auth_user), fields(user_id = %auth_user.user_id))]
async fn list_resources(
    State(app_state): State<AppState>,
    auth_user: AuthUser,
) -> Result<Json<Vec<Resource>>, ApiError> {
    let resources = app_state
        .resource_service
        .list_resources(auth_user.user_id)
        .await?;

    Ok(Json(resources))
}

#[instrument(name = "GET /resources/:id", skip(app_state, auth_user))]
async fn get_resource(
    State(app_state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Resource>, ApiError> {
    let resource = app_state
        .resource_service
        .get_resource(auth_user.user_id, id)
        .await?;

    Ok(Json(resource))
}

#[serde_as]
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateResourceBody {
    name: Option<String>,
    #[serde_as(as = "Option<serde_with::base64::Base64>")]
    #[serde(default)]
    content: Option<Vec<u8>>,
    url: Option<String>,
}

#[instrument(name = "PATCH /resources/:id", skip(app_state, auth_user, body))]
async fn update_resource(
    State(app_state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateResourceBody>,
) -> Result<Json<Resource>, ApiError> {
    let resource = app_state
        .resource_service
        .update_resource(
            auth_user.user_id,
            id,
            ResourceUpdate {
                name: body.name,
                content: body.content,
                url: body.url,
            },
        )
        .await?;

    Ok(Json(resource))
}

#[instrument(name = "DELETE /resources/:id", skip(app_state, auth_user))]
async fn delete_resource(
    State(app_state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    app_state
        .resource_service
        .delete_resource(auth_user.user_id, id)
        .await?;

    Ok(Json(json!({ "deleted": id })))
}
