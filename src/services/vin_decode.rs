// HTTP client for the VIN decode collaborator

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument};

use crate::core::errors::{VinDecodeError, VinDecodeResult};
use crate::core::types::VinAttributes;
use crate::utils::Metrics;

pub struct HttpVinDecoder {
    decode_url: String,
    http_client: reqwest::Client,
    metrics: Option<Metrics>,
}

#[derive(Debug, Serialize)]
struct DecodeRequest<'a> {
    vin: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    year_hint: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct DecodeResponse {
    #[serde(default = "default_found")]
    found: bool,
    #[serde(flatten)]
    attributes: VinAttributes,
}

fn default_found() -> bool {
    true
}

impl HttpVinDecoder {
    pub fn new(decode_url: impl Into<String>, metrics: Option<Metrics>) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(20))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context("Failed to create VIN decode HTTP client")?;

        Ok(Self {
            decode_url: decode_url.into(),
            http_client,
            metrics,
        })
    }
}

#[async_trait]
impl super::VinDecoder for HttpVinDecoder {
    #[instrument(skip(self), fields(vin = vin))]
    async fn decode(
        &self,
        vin: &str,
        year_hint: Option<u32>,
    ) -> VinDecodeResult<Option<VinAttributes>> {
        let result = async {
            let response = self
                .http_client
                .post(&self.decode_url)
                .json(&DecodeRequest { vin, year_hint })
                .send()
                .await?;

            // Not-found is a normal outcome, distinct from transport failure
            if response.status().as_u16() == 404 {
                return Ok(None);
            }
            if !response.status().is_success() {
                return Err(VinDecodeError::InvalidResponse(format!(
                    "decode collaborator returned status {}",
                    response.status()
                )));
            }

            let decoded: DecodeResponse = response
                .json()
                .await
                .map_err(|e| VinDecodeError::InvalidResponse(e.to_string()))?;

            if !decoded.found {
                return Ok(None);
            }
            debug!("decoded VIN {}", vin);
            Ok(Some(decoded.attributes))
        }
        .await;

        if let Some(ref metrics) = self.metrics {
            metrics.record_vin_decode(result.is_ok());
        }
        result
    }
}
