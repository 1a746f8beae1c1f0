use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Global metrics collector for the application.
///
/// Tracks collaborator usage, upload/rename volume, and per-stage durations.
/// Thread-safe and can be shared across the application.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    // Collaborator metrics
    analysis_calls_total: AtomicUsize,
    analysis_calls_failed: AtomicUsize,
    dedup_calls_total: AtomicUsize,
    dedup_calls_failed: AtomicUsize,
    vin_decodes_total: AtomicUsize,
    vin_decodes_failed: AtomicUsize,
    collaborator_latency_ms: RwLock<Vec<u64>>,

    // Storage metrics
    storage_puts: AtomicUsize,
    storage_gets: AtomicUsize,
    storage_failures: AtomicUsize,

    // Job metrics
    jobs_submitted: AtomicUsize,
    jobs_succeeded: AtomicUsize,
    jobs_failed: AtomicUsize,
    images_ingested: AtomicUsize,
    images_renamed: AtomicUsize,
    lots_produced: AtomicUsize,

    // Per-stage durations, keyed by step name
    stage_durations_ms: DashMap<&'static str, Vec<u64>>,

    // Start time for uptime calculation
    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner {
                analysis_calls_total: AtomicUsize::new(0),
                analysis_calls_failed: AtomicUsize::new(0),
                dedup_calls_total: AtomicUsize::new(0),
                dedup_calls_failed: AtomicUsize::new(0),
                vin_decodes_total: AtomicUsize::new(0),
                vin_decodes_failed: AtomicUsize::new(0),
                collaborator_latency_ms: RwLock::new(Vec::new()),
                storage_puts: AtomicUsize::new(0),
                storage_gets: AtomicUsize::new(0),
                storage_failures: AtomicUsize::new(0),
                jobs_submitted: AtomicUsize::new(0),
                jobs_succeeded: AtomicUsize::new(0),
                jobs_failed: AtomicUsize::new(0),
                images_ingested: AtomicUsize::new(0),
                images_renamed: AtomicUsize::new(0),
                lots_produced: AtomicUsize::new(0),
                stage_durations_ms: DashMap::new(),
                start_time: Instant::now(),
            }),
        }
    }

    pub fn record_analysis_call(&self, success: bool, duration: Duration) {
        self.inner.analysis_calls_total.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.inner.analysis_calls_failed.fetch_add(1, Ordering::Relaxed);
        }
        self.inner
            .collaborator_latency_ms
            .write()
            .push(duration.as_millis() as u64);
    }

    pub fn record_dedup_call(&self, success: bool) {
        self.inner.dedup_calls_total.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.inner.dedup_calls_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_vin_decode(&self, success: bool) {
        self.inner.vin_decodes_total.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.inner.vin_decodes_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_storage_put(&self, success: bool) {
        self.inner.storage_puts.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.inner.storage_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_storage_get(&self, success: bool) {
        self.inner.storage_gets.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.inner.storage_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_job_submitted(&self) {
        self.inner.jobs_submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_job_finished(&self, success: bool, lots: usize) {
        if success {
            self.inner.jobs_succeeded.fetch_add(1, Ordering::Relaxed);
            self.inner.lots_produced.fetch_add(lots, Ordering::Relaxed);
        } else {
            self.inner.jobs_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_images_ingested(&self, count: usize) {
        self.inner.images_ingested.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_images_renamed(&self, count: usize) {
        self.inner.images_renamed.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_stage_duration(&self, stage: &'static str, duration: Duration) {
        self.inner
            .stage_durations_ms
            .entry(stage)
            .or_default()
            .push(duration.as_millis() as u64);
    }

    // Get snapshot for reporting
    pub fn snapshot(&self) -> MetricsSnapshot {
        let latency = self.inner.collaborator_latency_ms.read();
        let latency_avg = avg(&latency);
        let latency_p95 = percentile(&latency, 0.95);
        drop(latency);

        let stage_avg_ms = self
            .inner
            .stage_durations_ms
            .iter()
            .map(|entry| (entry.key().to_string(), avg(entry.value())))
            .collect();

        MetricsSnapshot {
            analysis_calls_total: self.inner.analysis_calls_total.load(Ordering::Relaxed),
            analysis_calls_failed: self.inner.analysis_calls_failed.load(Ordering::Relaxed),
            dedup_calls_total: self.inner.dedup_calls_total.load(Ordering::Relaxed),
            dedup_calls_failed: self.inner.dedup_calls_failed.load(Ordering::Relaxed),
            vin_decodes_total: self.inner.vin_decodes_total.load(Ordering::Relaxed),
            vin_decodes_failed: self.inner.vin_decodes_failed.load(Ordering::Relaxed),
            collaborator_latency_avg_ms: latency_avg,
            collaborator_latency_p95_ms: latency_p95,
            storage_puts: self.inner.storage_puts.load(Ordering::Relaxed),
            storage_gets: self.inner.storage_gets.load(Ordering::Relaxed),
            storage_failures: self.inner.storage_failures.load(Ordering::Relaxed),
            jobs_submitted: self.inner.jobs_submitted.load(Ordering::Relaxed),
            jobs_succeeded: self.inner.jobs_succeeded.load(Ordering::Relaxed),
            jobs_failed: self.inner.jobs_failed.load(Ordering::Relaxed),
            images_ingested: self.inner.images_ingested.load(Ordering::Relaxed),
            images_renamed: self.inner.images_renamed.load(Ordering::Relaxed),
            lots_produced: self.inner.lots_produced.load(Ordering::Relaxed),
            stage_avg_ms,
            uptime_seconds: self.inner.start_time.elapsed().as_secs(),
        }
    }

    /// Generate Prometheus-format metrics
    pub fn to_prometheus(&self) -> String {
        let snapshot = self.snapshot();
        let mut out = format!(
            r#"# HELP analysis_calls_total Total AI analysis collaborator calls
# TYPE analysis_calls_total counter
analysis_calls_total {{}} {}

# HELP analysis_calls_failed Failed AI analysis collaborator calls
# TYPE analysis_calls_failed counter
analysis_calls_failed {{}} {}

# HELP dedup_calls_total Total AI dedup collaborator calls
# TYPE dedup_calls_total counter
dedup_calls_total {{}} {}

# HELP vin_decodes_total Total VIN decode collaborator calls
# TYPE vin_decodes_total counter
vin_decodes_total {{}} {}

# HELP collaborator_latency_avg_ms Average collaborator latency in milliseconds
# TYPE collaborator_latency_avg_ms gauge
collaborator_latency_avg_ms {{}} {}

# HELP storage_puts_total Total object storage uploads
# TYPE storage_puts_total counter
storage_puts_total {{}} {}

# HELP storage_failures_total Total object storage failures
# TYPE storage_failures_total counter
storage_failures_total {{}} {}

# HELP jobs_submitted_total Total jobs submitted
# TYPE jobs_submitted_total counter
jobs_submitted_total {{}} {}

# HELP jobs_succeeded_total Total jobs finished successfully
# TYPE jobs_succeeded_total counter
jobs_succeeded_total {{}} {}

# HELP jobs_failed_total Total jobs failed
# TYPE jobs_failed_total counter
jobs_failed_total {{}} {}

# HELP images_ingested_total Total images ingested into object storage
# TYPE images_ingested_total counter
images_ingested_total {{}} {}

# HELP images_renamed_total Total images renamed
# TYPE images_renamed_total counter
images_renamed_total {{}} {}

# HELP lots_produced_total Total lots produced across finished jobs
# TYPE lots_produced_total counter
lots_produced_total {{}} {}

# HELP uptime_seconds Application uptime in seconds
# TYPE uptime_seconds counter
uptime_seconds {{}} {}
"#,
            snapshot.analysis_calls_total,
            snapshot.analysis_calls_failed,
            snapshot.dedup_calls_total,
            snapshot.vin_decodes_total,
            snapshot.collaborator_latency_avg_ms,
            snapshot.storage_puts,
            snapshot.storage_failures,
            snapshot.jobs_submitted,
            snapshot.jobs_succeeded,
            snapshot.jobs_failed,
            snapshot.images_ingested,
            snapshot.images_renamed,
            snapshot.lots_produced,
            snapshot.uptime_seconds,
        );

        out.push_str("\n# HELP stage_avg_duration_ms Average stage duration in milliseconds\n# TYPE stage_avg_duration_ms gauge\n");
        let mut stages: Vec<_> = snapshot.stage_avg_ms.iter().collect();
        stages.sort_by(|a, b| a.0.cmp(b.0));
        for (stage, ms) in stages {
            out.push_str(&format!("stage_avg_duration_ms {{stage=\"{}\"}} {}\n", stage, ms));
        }

        out
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub analysis_calls_total: usize,
    pub analysis_calls_failed: usize,
    pub dedup_calls_total: usize,
    pub dedup_calls_failed: usize,
    pub vin_decodes_total: usize,
    pub vin_decodes_failed: usize,
    pub collaborator_latency_avg_ms: u64,
    pub collaborator_latency_p95_ms: u64,
    pub storage_puts: usize,
    pub storage_gets: usize,
    pub storage_failures: usize,
    pub jobs_submitted: usize,
    pub jobs_succeeded: usize,
    pub jobs_failed: usize,
    pub images_ingested: usize,
    pub images_renamed: usize,
    pub lots_produced: usize,
    pub stage_avg_ms: std::collections::HashMap<String, u64>,
    pub uptime_seconds: u64,
}

fn percentile(values: &[u64], p: f64) -> u64 {
    if values.is_empty() {
        return 0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    let idx = ((values.len() as f64 - 1.0) * p) as usize;
    sorted[idx]
}

fn avg(values: &[u64]) -> u64 {
    if values.is_empty() {
        return 0;
    }
    values.iter().sum::<u64>() / values.len() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_recording() {
        let metrics = Metrics::new();

        metrics.record_analysis_call(true, Duration::from_millis(120));
        metrics.record_analysis_call(false, Duration::from_millis(40));
        metrics.record_storage_put(true);
        metrics.record_storage_get(false);
        metrics.record_job_submitted();
        metrics.record_job_finished(true, 7);
        metrics.record_images_ingested(12);
        metrics.record_stage_duration("analyze", Duration::from_millis(500));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.analysis_calls_total, 2);
        assert_eq!(snapshot.analysis_calls_failed, 1);
        assert_eq!(snapshot.storage_puts, 1);
        assert_eq!(snapshot.storage_gets, 1);
        assert_eq!(snapshot.storage_failures, 1);
        assert_eq!(snapshot.jobs_submitted, 1);
        assert_eq!(snapshot.jobs_succeeded, 1);
        assert_eq!(snapshot.lots_produced, 7);
        assert_eq!(snapshot.images_ingested, 12);
        assert_eq!(snapshot.stage_avg_ms.get("analyze"), Some(&500));
    }

    #[test]
    fn test_prometheus_format() {
        let metrics = Metrics::new();
        metrics.record_analysis_call(true, Duration::from_millis(100));
        metrics.record_stage_duration("rename", Duration::from_millis(250));

        let prometheus = metrics.to_prometheus();
        assert!(prometheus.contains("analysis_calls_total {} 1"));
        assert!(prometheus.contains("stage_avg_duration_ms {stage=\"rename\"} 250"));
    }
}
