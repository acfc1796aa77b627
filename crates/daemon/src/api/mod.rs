use axum::{http::StatusCode, response::Json, routing::get, Router};
use engine::EngineError;
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

use crate::error::PrepError;
use crate::sessions::SessionRegistry;

pub mod compositions;
pub mod sessions;

#[derive(Serialize)]
struct HealthResponse {
    ok: bool,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        ok: true,
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub fn router(registry: Arc<SessionRegistry>) -> Router {
    Router::new().route("/health", get(health)).nest(
        "/api",
        Router::new()
            .nest("/sessions", sessions::router(registry.clone()))
            .nest("/compositions", compositions::router(registry)),
    )
}

/// Map a pipeline error to the status code a handler answers with.
pub(crate) fn status_for(err: &PrepError) -> StatusCode {
    let status = match err {
        PrepError::InvalidInput(_)
        | PrepError::Engine(EngineError::InvalidInput(_))
        | PrepError::Engine(EngineError::UnknownSegment(_)) => StatusCode::BAD_REQUEST,
        PrepError::Engine(EngineError::InvalidTransition { .. })
        | PrepError::Engine(EngineError::IncompleteSelection { .. }) => StatusCode::CONFLICT,
        PrepError::Provider { .. }
        | PrepError::Composition { .. }
        | PrepError::CompositionTimeout { .. } => StatusCode::BAD_GATEWAY,
        PrepError::Cancelled { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };
    warn!(status = status.as_u16(), error = %err, "Request failed");
    status
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine::PipelineStep;

    #[test]
    fn errors_map_to_statuses() {
        assert_eq!(status_for(&PrepError::invalid_input("empty")), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_for(&EngineError::UnknownSegment(7).into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&EngineError::IncompleteSelection { missing: vec![1] }.into()),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_for(
                &EngineError::InvalidTransition {
                    step: PipelineStep::Voice,
                    reason: "step is in flight".into()
                }
                .into()
            ),
            StatusCode::CONFLICT
        );
        assert_eq!(status_for(&PrepError::provider("render", "503")), StatusCode::BAD_GATEWAY);
    }
}
