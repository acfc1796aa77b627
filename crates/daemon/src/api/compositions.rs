use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use std::sync::Arc;

use crate::db::CompositionRecord;
use crate::sessions::SessionRegistry;

pub fn router(registry: Arc<SessionRegistry>) -> Router {
    Router::new()
        .route("/:task_id", get(get_composition))
        .with_state(registry)
}

async fn get_composition(
    State(registry): State<Arc<SessionRegistry>>,
    Path(task_id): Path<String>,
) -> Result<Json<CompositionRecord>, StatusCode> {
    let db = registry.db().ok_or(StatusCode::SERVICE_UNAVAILABLE)?;
    let record = db
        .get_composition(&task_id)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(record))
}
