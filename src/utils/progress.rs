// Weighted, named-step progress model for long-running appraisal jobs.
//
// One ProgressTracker per job, shared across the pipeline stages and the
// upload worker pool. Published progress is monotonically non-decreasing
// under any interleaving; a finalized record accepts no further updates.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;

/// Pipeline step identifiers. Weights sum to 1.0 across one job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKey {
    Upload,
    Plan,
    Analyze,
    Remap,
    Dedup,
    Number,
    Vin,
    Rename,
    Finalize,
}

impl StepKey {
    /// Static share of total job progress contributed by closing this step
    pub fn weight(&self) -> f64 {
        match self {
            StepKey::Upload => 0.15,
            StepKey::Plan => 0.02,
            StepKey::Analyze => 0.33,
            StepKey::Remap => 0.08,
            StepKey::Dedup => 0.05,
            StepKey::Number => 0.04,
            StepKey::Vin => 0.08,
            StepKey::Rename => 0.20,
            StepKey::Finalize => 0.05,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            StepKey::Upload => "Uploading images",
            StepKey::Plan => "Planning segments",
            StepKey::Analyze => "Analyzing images",
            StepKey::Remap => "Resolving image references",
            StepKey::Dedup => "Merging duplicate lots",
            StepKey::Number => "Numbering lots",
            StepKey::Vin => "Decoding VINs",
            StepKey::Rename => "Renaming images",
            StepKey::Finalize => "Finalizing report",
        }
    }
}

/// Lifecycle phase of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
}

/// One named step inside a ProgressRecord
#[derive(Debug, Clone, Serialize)]
pub struct ProgressStep {
    pub key: StepKey,
    pub label: &'static str,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

/// Snapshot of one job's progress, served to pollers
#[derive(Debug, Clone, Serialize)]
pub struct ProgressRecord {
    pub id: String,
    pub phase: JobPhase,
    /// Monotonically non-decreasing, in [0, 1]
    pub progress: f64,
    pub steps: Vec<ProgressStep>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

struct TrackerInner {
    record: ProgressRecord,
    /// Sum of weights of closed steps, clamped to 1.0
    completed: f64,
    finalized: bool,
}

/// Shared, thread-safe progress handle for one job
#[derive(Clone)]
pub struct ProgressTracker {
    inner: Arc<RwLock<TrackerInner>>,
}

impl ProgressTracker {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(TrackerInner {
                record: ProgressRecord {
                    id: id.into(),
                    phase: JobPhase::Pending,
                    progress: 0.0,
                    steps: Vec::new(),
                    message: None,
                },
                completed: 0.0,
                finalized: false,
            })),
        }
    }

    /// Transition pending -> running at job start
    pub fn start(&self) {
        let mut inner = self.inner.write();
        if !inner.finalized && inner.record.phase == JobPhase::Pending {
            inner.record.phase = JobPhase::Running;
        }
    }

    /// Append an open step for `key`
    pub fn begin_step(&self, key: StepKey) {
        let mut inner = self.inner.write();
        if inner.finalized {
            return;
        }
        inner.record.steps.push(ProgressStep {
            key,
            label: key.label(),
            started_at: Utc::now(),
            ended_at: None,
            duration_ms: None,
        });
    }

    /// Close the most recent open step for `key` and publish its weight.
    /// Closing an already-closed key is a no-op; the duration is computed
    /// exactly once, on the first close.
    pub fn end_step(&self, key: StepKey) {
        let mut inner = self.inner.write();
        if inner.finalized {
            return;
        }
        let Some(step) = inner
            .record
            .steps
            .iter_mut()
            .rev()
            .find(|s| s.key == key && s.ended_at.is_none())
        else {
            return;
        };
        let ended = Utc::now();
        step.duration_ms = Some((ended - step.started_at).num_milliseconds().max(0) as u64);
        step.ended_at = Some(ended);

        inner.completed = (inner.completed + key.weight()).min(1.0);
        let value = inner.completed;
        Self::publish(&mut inner, value);
    }

    /// Publish a provisional value for a step with internal sub-progress
    /// (e.g. per-image upload loops): completed + fraction * weight.
    pub fn publish_partial(&self, key: StepKey, done: usize, total: usize) {
        if total == 0 {
            return;
        }
        let mut inner = self.inner.write();
        if inner.finalized {
            return;
        }
        let fraction = (done as f64 / total as f64).clamp(0.0, 1.0);
        let value = inner.completed + fraction * key.weight();
        Self::publish(&mut inner, value);
    }

    /// Finalize as succeeded; halts all further updates
    pub fn succeed(&self) {
        let mut inner = self.inner.write();
        if inner.finalized {
            return;
        }
        inner.finalized = true;
        inner.record.phase = JobPhase::Succeeded;
        inner.record.progress = 1.0;
    }

    /// Finalize as failed with a message; halts all further updates
    pub fn fail(&self, message: impl Into<String>) {
        let mut inner = self.inner.write();
        if inner.finalized {
            return;
        }
        inner.finalized = true;
        inner.record.phase = JobPhase::Failed;
        inner.record.message = Some(message.into());
    }

    pub fn snapshot(&self) -> ProgressRecord {
        self.inner.read().record.clone()
    }

    pub fn phase(&self) -> JobPhase {
        self.inner.read().record.phase
    }

    // Monotonic non-decrease, clamped to [0, 1]
    fn publish(inner: &mut TrackerInner, value: f64) {
        let value = value.min(1.0);
        if value > inner.record.progress {
            inner.record.progress = value;
        }
    }
}

/// Registry of progress trackers, one per submitted job.
/// A missing id is a distinct "not found" from an existing pending record.
pub struct ProgressRegistry {
    jobs: DashMap<String, ProgressTracker>,
}

impl ProgressRegistry {
    pub fn new() -> Self {
        Self {
            jobs: DashMap::new(),
        }
    }

    /// Create a tracker for a new job id; None if the id is taken
    pub fn create(&self, id: &str) -> Option<ProgressTracker> {
        match self.jobs.entry(id.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => None,
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                let tracker = ProgressTracker::new(id);
                vacant.insert(tracker.clone());
                Some(tracker)
            }
        }
    }

    pub fn snapshot(&self, id: &str) -> Option<ProgressRecord> {
        self.jobs.get(id).map(|t| t.snapshot())
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

impl Default for ProgressRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_STEPS: [StepKey; 9] = [
        StepKey::Upload,
        StepKey::Plan,
        StepKey::Analyze,
        StepKey::Remap,
        StepKey::Dedup,
        StepKey::Number,
        StepKey::Vin,
        StepKey::Rename,
        StepKey::Finalize,
    ];

    #[test]
    fn test_weights_sum_to_one() {
        let total: f64 = ALL_STEPS.iter().map(|k| k.weight()).sum();
        assert!((total - 1.0).abs() < 1e-9, "weights sum to {}", total);
    }

    #[test]
    fn test_progress_never_decreases() {
        let tracker = ProgressTracker::new("job-1");
        tracker.start();

        let mut last = 0.0;
        for key in ALL_STEPS {
            tracker.begin_step(key);
            // Interleave sub-progress with step closes
            tracker.publish_partial(key, 1, 4);
            tracker.publish_partial(key, 3, 4);
            // A stale partial must not move progress backward
            tracker.publish_partial(key, 1, 4);
            let now = tracker.snapshot().progress;
            assert!(now >= last, "progress went backward: {} < {}", now, last);
            last = now;
            tracker.end_step(key);
            let now = tracker.snapshot().progress;
            assert!(now >= last);
            last = now;
        }
        assert!((tracker.snapshot().progress - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_reclosing_closed_step_is_noop() {
        let tracker = ProgressTracker::new("job-2");
        tracker.start();
        tracker.begin_step(StepKey::Upload);
        tracker.end_step(StepKey::Upload);

        let snap = tracker.snapshot();
        let duration = snap.steps[0].duration_ms;
        let progress = snap.progress;

        tracker.end_step(StepKey::Upload);
        let snap = tracker.snapshot();
        assert_eq!(snap.steps[0].duration_ms, duration);
        assert_eq!(snap.progress, progress);
        assert_eq!(snap.steps.len(), 1);
    }

    #[test]
    fn test_end_without_begin_is_noop() {
        let tracker = ProgressTracker::new("job-3");
        tracker.start();
        tracker.end_step(StepKey::Rename);
        let snap = tracker.snapshot();
        assert!(snap.steps.is_empty());
        assert_eq!(snap.progress, 0.0);
    }

    #[test]
    fn test_finalize_halts_updates() {
        let tracker = ProgressTracker::new("job-4");
        tracker.start();
        tracker.begin_step(StepKey::Upload);
        tracker.fail("storage unreachable");

        tracker.end_step(StepKey::Upload);
        tracker.publish_partial(StepKey::Upload, 1, 2);
        tracker.succeed();

        let snap = tracker.snapshot();
        assert_eq!(snap.phase, JobPhase::Failed);
        assert_eq!(snap.progress, 0.0);
        assert_eq!(snap.message.as_deref(), Some("storage unreachable"));
    }

    #[test]
    fn test_partial_capped_at_one() {
        let tracker = ProgressTracker::new("job-5");
        tracker.start();
        for key in ALL_STEPS {
            tracker.begin_step(key);
            tracker.end_step(key);
        }
        // Everything closed; a stray partial cannot push past 1.0
        tracker.publish_partial(StepKey::Rename, 10, 10);
        assert!(tracker.snapshot().progress <= 1.0);
    }

    #[test]
    fn test_registry_distinguishes_missing_from_pending() {
        let registry = ProgressRegistry::new();
        assert!(registry.snapshot("nope").is_none());

        let tracker = registry.create("job-6").unwrap();
        let snap = registry.snapshot("job-6").unwrap();
        assert_eq!(snap.phase, JobPhase::Pending);

        // Duplicate ids are rejected
        assert!(registry.create("job-6").is_none());
        drop(tracker);
    }

    #[tokio::test]
    async fn test_concurrent_partials_stay_monotonic() {
        let tracker = ProgressTracker::new("job-7");
        tracker.start();
        tracker.begin_step(StepKey::Upload);

        let mut handles = Vec::new();
        for i in 0..16 {
            let tracker = tracker.clone();
            handles.push(tokio::spawn(async move {
                tracker.publish_partial(StepKey::Upload, i, 16);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let progress = tracker.snapshot().progress;
        assert!(progress <= StepKey::Upload.weight() + 1e-9);
        tracker.end_step(StepKey::Upload);
        assert!(tracker.snapshot().progress >= progress);
    }
}
