// External collaborator services
//
// Each collaborator sits behind an async trait so the pipeline stages can be
// exercised against fakes; production impls are reqwest-backed HTTP clients.

pub mod analysis;
pub mod storage;
pub mod vin_decode;

pub use analysis::HttpAnalysisClient;
pub use storage::HttpObjectStore;
pub use vin_decode::HttpVinDecoder;

use async_trait::async_trait;

use crate::core::errors::{AnalysisResult, StorageResult, VinDecodeResult};
use crate::core::types::{AnalysisRequest, AnalyzedLot, DedupGroup, ImageRef, Lot, VinAttributes};

/// AI image-analysis and AI-deduplication collaborator
#[async_trait]
pub trait LotAnalysisProvider: Send + Sync {
    /// Analyze one segment's sub-list; returned lots carry indices local to
    /// `request.image_urls`
    async fn analyze_segment(&self, request: AnalysisRequest) -> AnalysisResult<Vec<AnalyzedLot>>;

    /// Group per-item candidate lots that depict the same physical item
    async fn dedup_lots(
        &self,
        images: &[ImageRef],
        candidates: &[Lot],
    ) -> AnalysisResult<Vec<DedupGroup>>;
}

/// Object storage collaborator
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Upload bytes under `key`, returning the canonical URL
    async fn put(&self, bytes: Vec<u8>, content_type: &str, key: &str) -> StorageResult<String>;

    /// Fetch the bytes behind a previously returned URL
    async fn get(&self, url: &str) -> StorageResult<Vec<u8>>;
}

/// VIN decode collaborator; Ok(None) is the distinct "not found" outcome
#[async_trait]
pub trait VinDecoder: Send + Sync {
    async fn decode(
        &self,
        vin: &str,
        year_hint: Option<u32>,
    ) -> VinDecodeResult<Option<VinAttributes>>;
}
