// HTTP client for the AI analysis and AI dedup collaborators
//
// Rotates over a pool of API keys, fails fast behind a shared circuit
// breaker, and retries transient failures up to the configured limit.

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, instrument, warn};

use crate::core::config::Config;
use crate::core::errors::{AnalysisError, AnalysisResult};
use crate::core::types::{AnalysisRequest, AnalyzedLot, DedupGroup, ImageRef, Lot};
use crate::middleware::api_key_pool::ApiKeyPool;
use crate::middleware::circuit_breaker::CircuitBreaker;
use crate::utils::Metrics;

/// Analysis collaborator client with key pool, circuit breaker, and metrics
pub struct HttpAnalysisClient {
    config: Arc<Config>,
    api_key_pool: Arc<ApiKeyPool>,
    http_client: reqwest::Client,
    circuit_breaker: CircuitBreaker,
    metrics: Option<Metrics>,
}

/// JSON envelope for an analysis response
#[derive(Debug, Deserialize)]
struct AnalyzeResponse {
    #[serde(default)]
    lots: Vec<AnalyzedLot>,
}

/// JSON envelope for a dedup response
#[derive(Debug, Deserialize)]
struct DedupResponse {
    #[serde(default)]
    groups: Vec<DedupGroup>,
}

/// Candidate lot summary sent to the dedup collaborator
#[derive(Debug, Serialize)]
struct DedupCandidate<'a> {
    lot_id: &'a str,
    title: &'a str,
    description: &'a str,
    image_urls: &'a [String],
}

#[derive(Debug, Serialize)]
struct DedupRequestBody<'a> {
    images: &'a [ImageRef],
    lots: Vec<DedupCandidate<'a>>,
}

impl HttpAnalysisClient {
    pub fn new(
        config: Arc<Config>,
        circuit_breaker: Option<CircuitBreaker>,
        metrics: Option<Metrics>,
    ) -> anyhow::Result<Self> {
        let api_key_pool = Arc::new(ApiKeyPool::new(config.api_keys().to_vec()));

        let timeout = Duration::from_secs(config.analysis.timeout_seconds);

        // HTTP client with timeout and connection pooling
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context("Failed to create HTTP client")?;

        let circuit_breaker = circuit_breaker.unwrap_or_default();

        Ok(Self {
            config,
            api_key_pool,
            http_client,
            circuit_breaker,
            metrics,
        })
    }

    pub async fn total_keys(&self) -> usize {
        self.api_key_pool.total_keys().await
    }

    /// POST a JSON body, rotating keys and retrying up to max_retries.
    /// Deserializes the 2xx body as T.
    async fn post_with_retries<T, B>(&self, url: &str, body: &B) -> AnalysisResult<T>
    where
        T: serde::de::DeserializeOwned,
        B: Serialize + Sync,
    {
        if !self.circuit_breaker.allow_request() {
            return Err(AnalysisError::CircuitOpen);
        }

        let max_attempts = self.config.max_retries().max(1);
        let mut last_error = None;

        for attempt in 0..max_attempts {
            let key = self.api_key_pool.acquire().await;
            if key.is_none() && self.api_key_pool.total_keys().await > 0 {
                // Keys exist but all are cooling down
                return Err(AnalysisError::AllKeysFailed {
                    key_count: self.api_key_pool.total_keys().await,
                    attempts: attempt as usize,
                });
            }

            let started = Instant::now();
            let mut request = self.http_client.post(url).json(body);
            if let Some((_, ref api_key)) = key {
                request = request.header("x-api-key", api_key.as_str());
            }

            match request.send().await {
                Ok(response) if response.status().is_success() => {
                    let parsed = response
                        .json::<T>()
                        .await
                        .map_err(|e| AnalysisError::InvalidResponse(e.to_string()));
                    match parsed {
                        Ok(value) => {
                            self.record_outcome(&key, true, started.elapsed()).await;
                            return Ok(value);
                        }
                        Err(e) => {
                            // A malformed body counts against the key too
                            self.record_outcome(&key, false, started.elapsed()).await;
                            last_error = Some(e);
                        }
                    }
                }
                Ok(response) => {
                    self.record_outcome(&key, false, started.elapsed()).await;
                    let status = response.status();
                    if status.as_u16() == 429 {
                        let retry_after = response
                            .headers()
                            .get("retry-after")
                            .and_then(|v| v.to_str().ok())
                            .and_then(|v| v.parse().ok())
                            .unwrap_or(30);
                        last_error = Some(AnalysisError::RateLimited(retry_after));
                    } else {
                        last_error = Some(AnalysisError::InvalidResponse(format!(
                            "collaborator returned status {}",
                            status
                        )));
                    }
                }
                Err(e) => {
                    self.record_outcome(&key, false, started.elapsed()).await;
                    last_error = Some(AnalysisError::RequestFailed(e));
                }
            }

            debug!("analysis attempt {}/{} failed, retrying", attempt + 1, max_attempts);
        }

        Err(last_error.unwrap_or(AnalysisError::AllKeysFailed {
            key_count: self.api_key_pool.total_keys().await,
            attempts: max_attempts as usize,
        }))
    }

    async fn record_outcome(&self, key: &Option<(usize, String)>, success: bool, elapsed: Duration) {
        if success {
            self.circuit_breaker.record_success();
        } else {
            self.circuit_breaker.record_failure();
        }
        if let Some((index, _)) = key {
            if success {
                self.api_key_pool.report_success(*index).await;
            } else {
                self.api_key_pool.report_failure(*index).await;
            }
        }
        if let Some(ref metrics) = self.metrics {
            metrics.record_analysis_call(success, elapsed);
        }
    }
}

#[async_trait]
impl super::LotAnalysisProvider for HttpAnalysisClient {
    #[instrument(skip(self, request), fields(images = request.image_urls.len(), sub_mode = request.sub_mode))]
    async fn analyze_segment(&self, request: AnalysisRequest) -> AnalysisResult<Vec<AnalyzedLot>> {
        let url = self.config.analysis.analyze_url.clone();
        let response: AnalyzeResponse = self.post_with_retries(&url, &request).await?;
        debug!("analysis returned {} lots", response.lots.len());
        Ok(response.lots)
    }

    #[instrument(skip(self, images, candidates), fields(candidates = candidates.len()))]
    async fn dedup_lots(
        &self,
        images: &[ImageRef],
        candidates: &[Lot],
    ) -> AnalysisResult<Vec<DedupGroup>> {
        let body = DedupRequestBody {
            images,
            lots: candidates
                .iter()
                .map(|lot| DedupCandidate {
                    lot_id: &lot.lot_id,
                    title: &lot.title,
                    description: &lot.description,
                    image_urls: &lot.image_urls,
                })
                .collect(),
        };

        let url = self.config.analysis.dedup_url.clone();
        let result: AnalysisResult<DedupResponse> = self.post_with_retries(&url, &body).await;
        if let Some(ref metrics) = self.metrics {
            metrics.record_dedup_call(result.is_ok());
        }
        match result {
            Ok(response) => Ok(response.groups),
            Err(e) => {
                warn!("dedup collaborator failed: {}", e);
                Err(e)
            }
        }
    }
}
