use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::error::{PrepError, PrepResult};

/// JSON-over-HTTP client for one collaborator service.
#[derive(Debug, Clone)]
pub struct ServiceClient {
    base_url: String,
    client: reqwest::Client,
}

impl ServiceClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> PrepResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PrepError::invalid_input(format!("cannot build HTTP client: {}", e)))?;
        Ok(ServiceClient {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn post_json<B, R>(&self, service: &'static str, path: &str, body: &B) -> PrepResult<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        debug!(service, url = %url, "POST");
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| PrepError::provider(service, e.to_string()))?;
        Self::decode(service, response).await
    }

    pub async fn get_json<R>(&self, service: &'static str, path: &str) -> PrepResult<R>
    where
        R: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        debug!(service, url = %url, "GET");
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| PrepError::provider(service, e.to_string()))?;
        Self::decode(service, response).await
    }

    async fn decode<R: DeserializeOwned>(
        service: &'static str,
        response: reqwest::Response,
    ) -> PrepResult<R> {
        let status = response.status();
        if status.is_success() {
            response
                .json()
                .await
                .map_err(|e| PrepError::provider(service, format!("malformed response: {}", e)))
        } else {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            Err(PrepError::provider(
                service,
                format!("returned error {}: {}", status, error_text),
            ))
        }
    }
}
