//! Orchestration engine: scheduling, per-item pipeline, and the components
//! each item passes through.

pub mod artifacts;
pub mod invoker;
pub mod pipeline;
pub mod recorder;
pub mod scheduler;

pub use artifacts::{ArtifactCollector, CollectedArtifacts};
pub use invoker::{BuildInvoker, BuildOutput, DiagnosticPolicy};
pub use pipeline::{ItemReport, Pipeline};
pub use recorder::ResultRecorder;
pub use scheduler::{CycleReport, Scheduler, SchedulerConfig};
