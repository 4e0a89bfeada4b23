use super::types::{DetectedObject, Frame, FusedAction};
use crate::error::PipelineError;

/// Screen-capture collaborator. `None` means no frame was available this
/// tick; the capture loop backs off and retries.
pub trait CaptureSource: Send + Sync {
    fn is_ready(&self) -> bool {
        true
    }
    fn capture_frame(&self) -> Option<Frame>;
}

/// Object-detection collaborator run by the inference stage.
pub trait Detector: Send + Sync {
    fn detect_objects(&self, frame: &Frame) -> Result<Vec<DetectedObject>, PipelineError>;
}

/// Touch-injection collaborator run by the execution stage. Returns whether
/// the gesture landed.
pub trait ActionExecutor: Send + Sync {
    fn is_ready(&self) -> bool {
        true
    }
    fn execute(&self, action: &FusedAction) -> bool;
}
