// Analysis coordination: one AI collaborator call per segment.
//
// Each segment's sub-list is capped for cost control; the segment's true
// main/extra counts used later for numbering and renaming are never
// truncated. A failed or empty response is non-fatal: the segment
// contributes zero lots and progress still advances by its share.

use tracing::{debug, warn};

use crate::core::types::{AnalysisRequest, ImageRef, Segment, SegmentLots};
use crate::services::LotAnalysisProvider;
use crate::utils::{ProgressTracker, StepKey};

/// Sub-list caps per segment class
#[derive(Debug, Clone, Copy)]
pub struct AnalysisCaps {
    pub basic: usize,
    pub catalogue: usize,
}

impl AnalysisCaps {
    fn for_segment(&self, segment: &Segment) -> usize {
        if segment.sub_mode.is_catalogue_like() {
            self.catalogue
        } else {
            self.basic
        }
    }
}

pub async fn analyze_segments(
    provider: &dyn LotAnalysisProvider,
    images: &[ImageRef],
    segments: &[Segment],
    locale: &str,
    currency: &str,
    caps: AnalysisCaps,
    progress: &ProgressTracker,
) -> Vec<SegmentLots> {
    let mut results = Vec::with_capacity(segments.len());

    for (done, segment) in segments.iter().enumerate() {
        let cap = caps.for_segment(segment);

        // Truncated sub-list; this is the AI-local index space
        let local_to_global: Vec<usize> =
            segment.main_range().filter(|&i| i < images.len()).take(cap).collect();

        let lots = if local_to_global.is_empty() {
            Vec::new()
        } else {
            let request = AnalysisRequest {
                image_urls: local_to_global.iter().map(|&i| images[i].url.clone()).collect(),
                sub_mode: segment.sub_mode.analysis_kind(),
                locale: locale.to_string(),
                currency: currency.to_string(),
            };

            match provider.analyze_segment(request).await {
                Ok(lots) => {
                    debug!(
                        "segment at offset {} produced {} lots",
                        segment.base_offset,
                        lots.len()
                    );
                    lots
                }
                Err(e) => {
                    warn!(
                        "analysis failed for segment at offset {}, continuing without it: {}",
                        segment.base_offset, e
                    );
                    Vec::new()
                }
            }
        };

        results.push(SegmentLots {
            segment: *segment,
            local_to_global,
            lots,
        });

        progress.publish_partial(StepKey::Analyze, done + 1, segments.len());
    }

    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::errors::{AnalysisError, AnalysisResult};
    use crate::core::types::{AnalyzedLot, DedupGroup, Lot, SubMode};
    use async_trait::async_trait;
    use parking_lot::Mutex;

    struct ScriptedProvider {
        requests: Mutex<Vec<AnalysisRequest>>,
        fail_offsets: Vec<usize>,
    }

    #[async_trait]
    impl LotAnalysisProvider for ScriptedProvider {
        async fn analyze_segment(
            &self,
            request: AnalysisRequest,
        ) -> AnalysisResult<Vec<AnalyzedLot>> {
            let call_index = {
                let mut requests = self.requests.lock();
                requests.push(request.clone());
                requests.len() - 1
            };
            if self.fail_offsets.contains(&call_index) {
                return Err(AnalysisError::InvalidResponse("scripted failure".into()));
            }
            Ok(vec![AnalyzedLot {
                title: format!("lot from call {}", call_index),
                image_indexes: vec![0],
                ..Default::default()
            }])
        }

        async fn dedup_lots(
            &self,
            _images: &[ImageRef],
            _candidates: &[Lot],
        ) -> AnalysisResult<Vec<DedupGroup>> {
            Ok(Vec::new())
        }
    }

    fn images(n: usize) -> Vec<ImageRef> {
        (0..n)
            .map(|i| ImageRef {
                url: format!("http://store/img-{}.jpg", i),
                name: format!("img-{}.jpg", i),
            })
            .collect()
    }

    fn segment(offset: usize, main: usize, sub_mode: SubMode) -> Segment {
        Segment {
            base_offset: offset,
            main_count: main,
            extra_count: 0,
            cover_index: offset,
            sub_mode,
        }
    }

    #[tokio::test]
    async fn test_sub_list_capped_but_counts_untouched() {
        let provider = ScriptedProvider {
            requests: Mutex::new(Vec::new()),
            fail_offsets: Vec::new(),
        };
        let images = images(30);
        let segments = vec![segment(0, 30, SubMode::PerPhoto)];
        let progress = ProgressTracker::new("t");

        let results = analyze_segments(
            &provider,
            &images,
            &segments,
            "en",
            "USD",
            AnalysisCaps { basic: 10, catalogue: 80 },
            &progress,
        )
        .await;

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].local_to_global.len(), 10);
        assert_eq!(results[0].local_to_global[9], 9);
        // The segment itself keeps its full main range
        assert_eq!(results[0].segment.main_count, 30);

        let requests = provider.requests.lock();
        assert_eq!(requests[0].image_urls.len(), 10);
        assert_eq!(requests[0].sub_mode, "per_photo");
    }

    #[tokio::test]
    async fn test_catalogue_cap_is_larger() {
        let provider = ScriptedProvider {
            requests: Mutex::new(Vec::new()),
            fail_offsets: Vec::new(),
        };
        let images = images(50);
        let segments = vec![segment(0, 50, SubMode::Mixed)];
        let progress = ProgressTracker::new("t");

        let results = analyze_segments(
            &provider,
            &images,
            &segments,
            "en",
            "USD",
            AnalysisCaps { basic: 10, catalogue: 40 },
            &progress,
        )
        .await;

        assert_eq!(results[0].local_to_global.len(), 40);
        // Mixed segments are analyzed as catalogues
        assert_eq!(provider.requests.lock()[0].sub_mode, "catalogue");
    }

    #[tokio::test]
    async fn test_failed_segment_contributes_zero_lots() {
        let provider = ScriptedProvider {
            requests: Mutex::new(Vec::new()),
            fail_offsets: vec![0],
        };
        let images = images(12);
        let segments = vec![
            segment(0, 5, SubMode::PerItem),
            segment(5, 7, SubMode::PerPhoto),
        ];
        let progress = ProgressTracker::new("t");
        progress.start();
        progress.begin_step(StepKey::Analyze);

        let results = analyze_segments(
            &provider,
            &images,
            &segments,
            "en",
            "USD",
            AnalysisCaps { basic: 24, catalogue: 80 },
            &progress,
        )
        .await;

        assert_eq!(results.len(), 2);
        assert!(results[0].lots.is_empty());
        assert_eq!(results[1].lots.len(), 1);
        // Progress advanced by the full analyze share despite the failure
        let expected = StepKey::Analyze.weight();
        assert!((progress.snapshot().progress - expected).abs() < 1e-9);
    }
}
