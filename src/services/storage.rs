// HTTP object storage client

use anyhow::Context;
use async_trait::async_trait;
use std::time::Duration;
use tracing::instrument;

use crate::core::errors::{StorageError, StorageResult};
use crate::utils::Metrics;

/// Object store speaking plain HTTP PUT/GET against a base URL
pub struct HttpObjectStore {
    base_url: String,
    http_client: reqwest::Client,
    metrics: Option<Metrics>,
}

impl HttpObjectStore {
    pub fn new(
        base_url: impl Into<String>,
        timeout_seconds: u64,
        metrics: Option<Metrics>,
    ) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .pool_max_idle_per_host(10)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context("Failed to create storage HTTP client")?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http_client,
            metrics,
        })
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/{}", self.base_url, key.trim_start_matches('/'))
    }
}

#[async_trait]
impl super::ObjectStore for HttpObjectStore {
    #[instrument(skip(self, bytes), fields(key = key, size = bytes.len()))]
    async fn put(&self, bytes: Vec<u8>, content_type: &str, key: &str) -> StorageResult<String> {
        let url = self.object_url(key);
        let result = self
            .http_client
            .put(&url)
            .header("content-type", content_type)
            .body(bytes)
            .send()
            .await;

        let outcome = match result {
            Ok(response) if response.status().is_success() => Ok(url.clone()),
            Ok(response) => Err(StorageError::UnexpectedStatus {
                status: response.status().as_u16(),
                url: url.clone(),
            }),
            Err(e) => Err(StorageError::RequestFailed(e)),
        };

        if let Some(ref metrics) = self.metrics {
            metrics.record_storage_put(outcome.is_ok());
        }
        outcome
    }

    #[instrument(skip(self))]
    async fn get(&self, url: &str) -> StorageResult<Vec<u8>> {
        let result = async {
            let response = self.http_client.get(url).send().await?;
            if !response.status().is_success() {
                return Err(StorageError::UnexpectedStatus {
                    status: response.status().as_u16(),
                    url: url.to_string(),
                });
            }
            Ok(response.bytes().await?.to_vec())
        }
        .await;

        if let Some(ref metrics) = self.metrics {
            metrics.record_storage_get(result.is_ok());
        }
        result
    }
}
