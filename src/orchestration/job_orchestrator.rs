// Job orchestrator: drives one appraisal job through the pipeline stages.
//
// Submission registers a progress record and spawns the job, returning the
// id immediately. Stages run strictly sequentially, each one handing its
// output to the next; the only unrecoverable errors surface here, where the
// job is marked failed. Already-uploaded images are never rolled back.

use anyhow::Result;
use dashmap::DashMap;
use futures::future::join_all;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tracing::{error, info, instrument};

use crate::core::config::Config;
use crate::core::errors::JobError;
use crate::core::types::{AppraisalReport, ImageRef, JobConfig, Lot, UploadedImage};
use crate::phases::analyze::{analyze_segments, AnalysisCaps};
use crate::phases::dedup::dedup_per_item_lots;
use crate::phases::numbering::{assign_catalogue_numbers, order_and_number};
use crate::phases::remap::remap_segment_lots;
use crate::phases::rename::execute_renames;
use crate::phases::segment_plan::{default_segment, plan_segments};
use crate::phases::vin::extract_and_decode;
use crate::services::{LotAnalysisProvider, ObjectStore, VinDecoder};
use crate::utils::{Metrics, ProgressRecord, ProgressRegistry, ProgressTracker, StepKey};

pub struct JobOrchestrator {
    config: Arc<Config>,
    analysis: Arc<dyn LotAnalysisProvider>,
    store: Arc<dyn ObjectStore>,
    vin_decoder: Arc<dyn VinDecoder>,
    progress: ProgressRegistry,
    reports: DashMap<String, AppraisalReport>,
    metrics: Metrics,
}

impl JobOrchestrator {
    pub fn new(
        config: Arc<Config>,
        analysis: Arc<dyn LotAnalysisProvider>,
        store: Arc<dyn ObjectStore>,
        vin_decoder: Arc<dyn VinDecoder>,
        metrics: Metrics,
    ) -> Self {
        Self {
            config,
            analysis,
            store,
            vin_decoder,
            progress: ProgressRegistry::new(),
            reports: DashMap::new(),
            metrics,
        }
    }

    /// Register and spawn a job; returns the id immediately
    pub fn submit(
        self: &Arc<Self>,
        images: Vec<UploadedImage>,
        job_config: JobConfig,
    ) -> Result<String, JobError> {
        if images.is_empty() {
            return Err(JobError::NoImages);
        }

        let job_id = job_config
            .job_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let tracker = self
            .progress
            .create(&job_id)
            .ok_or_else(|| JobError::DuplicateJob(job_id.clone()))?;

        self.metrics.record_job_submitted();
        info!("job {} submitted with {} images", job_id, images.len());

        let orchestrator = Arc::clone(self);
        let spawned_id = job_id.clone();
        tokio::spawn(async move {
            tracker.start();
            match orchestrator
                .run_job(&spawned_id, images, job_config, &tracker)
                .await
            {
                Ok(report) => {
                    orchestrator
                        .metrics
                        .record_job_finished(true, report.lots.len());
                    info!(
                        "job {} finished: {} lots from {} images in {:.2}s",
                        spawned_id,
                        report.lots.len(),
                        report.total_images,
                        report.processing_time_ms / 1000.0
                    );
                    orchestrator.reports.insert(spawned_id, report);
                    tracker.succeed();
                }
                Err(e) => {
                    orchestrator.metrics.record_job_finished(false, 0);
                    error!("job {} failed: {:?}", spawned_id, e);
                    tracker.fail(e.to_string());
                }
            }
        });

        Ok(job_id)
    }

    /// Progress snapshot; None means the job id was never submitted
    pub fn progress(&self, job_id: &str) -> Option<ProgressRecord> {
        self.progress.snapshot(job_id)
    }

    /// Finished report, once the job has succeeded
    pub fn report(&self, job_id: &str) -> Option<AppraisalReport> {
        self.reports.get(job_id).map(|r| r.value().clone())
    }

    #[instrument(skip(self, uploads, job_config, progress), fields(job_id = job_id, images = uploads.len()))]
    async fn run_job(
        &self,
        job_id: &str,
        uploads: Vec<UploadedImage>,
        job_config: JobConfig,
        progress: &ProgressTracker,
    ) -> Result<AppraisalReport> {
        let job_start = Instant::now();
        let total_images = uploads.len();

        // ===== UPLOAD: ingest originals into object storage =====
        let stage_start = Instant::now();
        progress.begin_step(StepKey::Upload);
        let images = self.ingest_images(job_id, uploads, progress).await?;
        progress.end_step(StepKey::Upload);
        self.metrics
            .record_stage_duration("upload", stage_start.elapsed());
        self.metrics.record_images_ingested(images.len());

        // ===== PLAN: declarations -> segments =====
        let stage_start = Instant::now();
        progress.begin_step(StepKey::Plan);
        let mut segments = plan_segments(images.len(), &job_config.declarations);
        if segments.is_empty() {
            // No usable declarations: one single-lot segment spans everything
            segments.push(default_segment(images.len()));
        }
        progress.end_step(StepKey::Plan);
        self.metrics
            .record_stage_duration("plan", stage_start.elapsed());
        info!("job {}: {} segments planned", job_id, segments.len());

        // ===== ANALYZE: one collaborator call per segment =====
        let stage_start = Instant::now();
        progress.begin_step(StepKey::Analyze);
        let caps = AnalysisCaps {
            basic: self.config.analysis_cap(false),
            catalogue: self.config.analysis_cap(true),
        };
        let segment_lots = analyze_segments(
            self.analysis.as_ref(),
            &images,
            &segments,
            &job_config.locale,
            &job_config.currency,
            caps,
            progress,
        )
        .await;
        progress.end_step(StepKey::Analyze);
        self.metrics
            .record_stage_duration("analyze", stage_start.elapsed());

        // ===== REMAP: reconcile index spaces =====
        let stage_start = Instant::now();
        progress.begin_step(StepKey::Remap);
        let mut lots = remap_segment_lots(&images, segment_lots);
        // Catalogue/mixed lots are numbered here, per segment
        assign_catalogue_numbers(&mut lots);
        progress.end_step(StepKey::Remap);
        self.metrics
            .record_stage_duration("remap", stage_start.elapsed());

        // ===== DEDUP: merge per-item lots depicting the same item =====
        let stage_start = Instant::now();
        progress.begin_step(StepKey::Dedup);
        let lots = dedup_per_item_lots(self.analysis.as_ref(), &images, lots).await;
        progress.end_step(StepKey::Dedup);
        self.metrics
            .record_stage_duration("dedup", stage_start.elapsed());

        // ===== NUMBER: sticker order, then detection order =====
        let stage_start = Instant::now();
        progress.begin_step(StepKey::Number);
        let mut lots: Vec<Lot> = order_and_number(lots);
        progress.end_step(StepKey::Number);
        self.metrics
            .record_stage_duration("number", stage_start.elapsed());

        // ===== VIN: scan free text, decode, merge =====
        let stage_start = Instant::now();
        progress.begin_step(StepKey::Vin);
        extract_and_decode(self.vin_decoder.as_ref(), &mut lots, progress).await;
        progress.end_step(StepKey::Vin);
        self.metrics
            .record_stage_duration("vin", stage_start.elapsed());

        // ===== RENAME: canonical filenames, rewired references =====
        let stage_start = Instant::now();
        progress.begin_step(StepKey::Rename);
        let original_urls: Vec<String> = images.iter().map(|img| img.url.clone()).collect();
        let images = execute_renames(
            self.store.as_ref(),
            &images,
            &mut lots,
            job_id,
            self.config.upload_concurrency(),
            progress,
        )
        .await;
        progress.end_step(StepKey::Rename);
        self.metrics
            .record_stage_duration("rename", stage_start.elapsed());
        let renamed = images
            .iter()
            .zip(original_urls.iter())
            .filter(|(img, old)| img.url != **old)
            .count();
        self.metrics.record_images_renamed(renamed);

        // ===== FINALIZE =====
        progress.begin_step(StepKey::Finalize);
        let report = AppraisalReport {
            job_id: job_id.to_string(),
            total_images,
            total_lots: lots.len(),
            images,
            lots,
            locale: job_config.locale,
            currency: job_config.currency,
            processing_time_ms: job_start.elapsed().as_secs_f64() * 1000.0,
        };
        progress.end_step(StepKey::Finalize);

        Ok(report)
    }

    /// Upload every original through the bounded worker pool. Any failure
    /// here is unrecoverable: the pipeline needs the full image array.
    async fn ingest_images(
        &self,
        job_id: &str,
        uploads: Vec<UploadedImage>,
        progress: &ProgressTracker,
    ) -> Result<Vec<ImageRef>, JobError> {
        let total = uploads.len();
        let semaphore = Arc::new(Semaphore::new(self.config.upload_concurrency()));
        let done = Arc::new(AtomicUsize::new(0));

        let tasks = uploads.into_iter().map(|upload| {
            let semaphore = Arc::clone(&semaphore);
            let done = Arc::clone(&done);
            async move {
                let _permit = semaphore.acquire().await.expect("semaphore closed");

                let name = sanitize_name(&upload.original_name);
                let key = format!("{}/src/{:03}-{}", job_id, upload.index, name);
                let content_type = content_type_for(&name);

                let result = self
                    .store
                    .put(upload.bytes.as_ref().clone(), content_type, &key)
                    .await;

                let finished = done.fetch_add(1, Ordering::Relaxed) + 1;
                progress.publish_partial(StepKey::Upload, finished, total);

                match result {
                    Ok(url) => Ok((
                        upload.index,
                        ImageRef {
                            url,
                            name: upload.original_name,
                        },
                    )),
                    Err(source) => Err(JobError::UploadFailed {
                        index: upload.index,
                        name: upload.original_name,
                        source,
                    }),
                }
            }
        });

        let mut images: Vec<Option<ImageRef>> = vec![None; total];
        for result in join_all(tasks).await {
            let (index, image) = result?;
            if index < images.len() {
                images[index] = Some(image);
            }
        }

        Ok(images.into_iter().flatten().collect())
    }
}

fn sanitize_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '-'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "image.jpg".to_string()
    } else {
        cleaned
    }
}

fn content_type_for(name: &str) -> &'static str {
    if name.to_lowercase().ends_with(".png") {
        "image/png"
    } else {
        "image/jpeg"
    }
}
