pub mod fusion;
pub mod io;
pub mod metrics;
pub mod orchestrator;
pub mod types;

pub use fusion::{FusionPolicy, ProposalSet};
pub use io::{ActionExecutor, CaptureSource, Detector};
pub use metrics::{ActionTypeMetrics, MetricsCollector, PerformanceSnapshot};
pub use orchestrator::{PipelineOrchestrator, PipelineState};
pub use types::{
    ActionKind, ActionProposal, DetectedObject, Frame, FusedAction, GameStateSnapshot,
    ProposalSource,
};
