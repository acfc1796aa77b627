pub mod requestor;

use async_trait::async_trait;
use engine::composition::{CompositionPayload, RenderStatus};
use serde::Deserialize;

use crate::error::{PrepError, PrepResult};
use crate::http::ServiceClient;

pub use requestor::{CompositionRequestor, CompositionResult};

/// Asynchronous video render service: submit once, then poll by task id.
#[async_trait]
pub trait RenderBackend: Send + Sync {
    async fn submit(&self, payload: &CompositionPayload) -> PrepResult<String>;
    async fn status(&self, task_id: &str) -> PrepResult<RenderStatus>;
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    #[serde(rename = "taskId", alias = "task_id")]
    task_id: String,
}

#[derive(Debug, Clone)]
pub struct HttpRenderBackend {
    service: ServiceClient,
}

impl HttpRenderBackend {
    pub fn new(service: ServiceClient) -> Self {
        HttpRenderBackend { service }
    }
}

#[async_trait]
impl RenderBackend for HttpRenderBackend {
    async fn submit(&self, payload: &CompositionPayload) -> PrepResult<String> {
        let response: SubmitResponse = self.service.post_json("render", "/compose", payload).await?;
        if response.task_id.trim().is_empty() {
            return Err(PrepError::provider("render", "submission returned no task id"));
        }
        Ok(response.task_id)
    }

    async fn status(&self, task_id: &str) -> PrepResult<RenderStatus> {
        self.service
            .get_json("render", &format!("/compose/{}", task_id))
            .await
    }
}
