// Library exports for the appraisal lot workflow

// Core modules
pub mod core;
pub mod middleware;
pub mod orchestration;
pub mod phases;
pub mod services;
pub mod utils;

// Re-export commonly used types and functions
pub use self::core::{
    config::Config,
    errors::{AnalysisError, ConfigError, JobError, StorageError, VinDecodeError},
    types::{
        AnalysisRequest, AnalyzedLot, AppraisalReport, GroupingDeclaration, ImageRef, JobConfig,
        Lot, LotItem, Segment, SubMode, UploadedImage, VinAttributes,
    },
};

pub use middleware::{ApiKeyPool, CircuitBreaker, CircuitBreakerConfig, CircuitState};

pub use orchestration::JobOrchestrator;

pub use services::{
    HttpAnalysisClient, HttpObjectStore, HttpVinDecoder, LotAnalysisProvider, ObjectStore,
    VinDecoder,
};

pub use utils::{JobPhase, Metrics, ProgressRecord, ProgressRegistry, ProgressTracker, StepKey};
