// Job orchestration: submission, pipeline sequencing, result registry

pub mod job_orchestrator;

pub use job_orchestrator::JobOrchestrator;
