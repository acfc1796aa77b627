use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{sse::Event, Json, Sse},
    routing::{get, post, put},
    Router,
};
use engine::composition::CompositionSettings;
use engine::materials::MaterialCandidate;
use engine::selection::FinalizedMaterials;
use engine::PipelineStep;
use futures::stream::{self, Stream};
use serde::Serialize;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tracing::debug;
use uuid::Uuid;

use super::status_for;
use crate::db::CompositionRecord;
use crate::pipeline::{PipelineController, PipelineSnapshot, PrepareRequest};
use crate::sessions::SessionRegistry;

#[derive(Serialize)]
pub struct CreatedSession {
    session_id: Uuid,
}

pub fn router(registry: Arc<SessionRegistry>) -> Router {
    Router::new()
        .route("/", post(create_session))
        .route("/:id", get(get_session).delete(delete_session))
        .route("/:id/start", post(start))
        .route("/:id/steps/:step/retry", post(retry_step))
        .route("/:id/reset", post(reset))
        .route("/:id/selections/:segment_id", put(select))
        .route("/:id/finalize", post(finalize))
        .route("/:id/compose", post(compose))
        .route("/:id/compositions", get(list_compositions))
        .route("/:id/events", get(events))
        .with_state(registry)
}

async fn session(registry: &SessionRegistry, id: Uuid) -> Result<Arc<PipelineController>, StatusCode> {
    registry.get(id).await.ok_or(StatusCode::NOT_FOUND)
}

/// POST /sessions
async fn create_session(
    State(registry): State<Arc<SessionRegistry>>,
) -> (StatusCode, Json<CreatedSession>) {
    let controller = registry.create().await;
    (
        StatusCode::CREATED,
        Json(CreatedSession {
            session_id: controller.session_id(),
        }),
    )
}

/// GET /sessions/:id
async fn get_session(
    State(registry): State<Arc<SessionRegistry>>,
    Path(id): Path<Uuid>,
) -> Result<Json<PipelineSnapshot>, StatusCode> {
    let controller = session(&registry, id).await?;
    Ok(Json(controller.snapshot().await))
}

/// DELETE /sessions/:id
async fn delete_session(
    State(registry): State<Arc<SessionRegistry>>,
    Path(id): Path<Uuid>,
) -> StatusCode {
    if registry.remove(id).await {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

/// POST /sessions/:id/start
async fn start(
    State(registry): State<Arc<SessionRegistry>>,
    Path(id): Path<Uuid>,
    Json(request): Json<PrepareRequest>,
) -> Result<Json<PipelineSnapshot>, StatusCode> {
    let controller = session(&registry, id).await?;
    let snapshot = controller.start(request).await.map_err(|e| status_for(&e))?;
    Ok(Json(snapshot))
}

/// POST /sessions/:id/steps/:step/retry
async fn retry_step(
    State(registry): State<Arc<SessionRegistry>>,
    Path((id, step)): Path<(Uuid, String)>,
) -> Result<Json<PipelineSnapshot>, StatusCode> {
    let controller = session(&registry, id).await?;
    let step: PipelineStep = step.parse().map_err(|_| StatusCode::BAD_REQUEST)?;
    let snapshot = controller.retry_step(step).await.map_err(|e| status_for(&e))?;
    Ok(Json(snapshot))
}

/// POST /sessions/:id/reset
async fn reset(
    State(registry): State<Arc<SessionRegistry>>,
    Path(id): Path<Uuid>,
) -> Result<Json<PipelineSnapshot>, StatusCode> {
    let controller = session(&registry, id).await?;
    Ok(Json(controller.reset().await))
}

/// PUT /sessions/:id/selections/:segment_id
async fn select(
    State(registry): State<Arc<SessionRegistry>>,
    Path((id, segment_id)): Path<(Uuid, u32)>,
    Json(material): Json<MaterialCandidate>,
) -> Result<Json<PipelineSnapshot>, StatusCode> {
    let controller = session(&registry, id).await?;
    let snapshot = controller
        .select(segment_id, material)
        .await
        .map_err(|e| status_for(&e))?;
    Ok(Json(snapshot))
}

/// POST /sessions/:id/finalize
async fn finalize(
    State(registry): State<Arc<SessionRegistry>>,
    Path(id): Path<Uuid>,
) -> Result<Json<FinalizedMaterials>, StatusCode> {
    let controller = session(&registry, id).await?;
    let finalized = controller.finalize().await.map_err(|e| status_for(&e))?;
    Ok(Json(finalized))
}

/// POST /sessions/:id/compose
///
/// Rendering continues in the background; follow it through the snapshot,
/// the event stream or `/compositions/:task_id`.
async fn compose(
    State(registry): State<Arc<SessionRegistry>>,
    Path(id): Path<Uuid>,
    Json(settings): Json<CompositionSettings>,
) -> Result<(StatusCode, Json<PipelineSnapshot>), StatusCode> {
    let controller = session(&registry, id).await?;
    controller.compose(settings).await.map_err(|e| status_for(&e))?;
    Ok((StatusCode::ACCEPTED, Json(controller.snapshot().await)))
}

/// GET /sessions/:id/compositions
async fn list_compositions(
    State(registry): State<Arc<SessionRegistry>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<CompositionRecord>>, StatusCode> {
    session(&registry, id).await?;
    let db = registry.db().ok_or(StatusCode::SERVICE_UNAVAILABLE)?;
    let records = db
        .list_compositions_for_session(id)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(Json(records))
}

/// GET /sessions/:id/events - SSE stream of pipeline events
async fn events(
    State(registry): State<Arc<SessionRegistry>>,
    Path(id): Path<Uuid>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, StatusCode> {
    let controller = session(&registry, id).await?;
    let rx = controller.subscribe();

    let event_stream = BroadcastStream::new(rx).map(|received| match received {
        Ok(event) => {
            let json = serde_json::to_string(&event).unwrap_or_else(|_| "{}".to_string());
            Ok::<_, Infallible>(Event::default().event(event.name()).data(json))
        }
        Err(BroadcastStreamRecvError::Lagged(skipped)) => {
            debug!(skipped, "SSE subscriber lagged");
            Ok(Event::default().comment(format!("lagged {}", skipped)))
        }
    });

    let keep_alive = stream::unfold((), |_| async {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Some((Ok(Event::default().comment("keep-alive")), ()))
    });

    let combined = stream::select(event_stream, keep_alive);

    Ok(Sse::new(combined).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive-text"),
    ))
}
