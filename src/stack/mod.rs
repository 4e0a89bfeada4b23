pub mod advanced;
pub mod lightweight;
pub mod manager;
pub mod prefs;

use crate::error::StackError;
use crate::pipeline::types::{ActionKind, Point};

pub use advanced::{
    AdvancedBackend, AdvancedCapability, AdvancedComponent, BuiltinAdvancedCapability,
    SimulatedComponent,
};
pub use lightweight::LightweightBackend;
pub use manager::{StackManager, StackStatus};
pub use prefs::{PrefsStore, StackPrefs};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionTier {
    Advanced,
    Lightweight,
    RuleDefault,
}

/// What the active backend wants done for the current state vector.
#[derive(Debug, Clone)]
pub struct Decision {
    pub kind: ActionKind,
    pub target: Option<Point>,
    pub confidence: f32,
    pub tier: DecisionTier,
}

/// A decision/prediction backend the manager can route to.
pub trait DecisionBackend: Send + Sync {
    fn name(&self) -> &'static str;
    fn is_initialized(&self) -> bool;
    fn decide(&self, state: &[f32]) -> Result<Decision, StackError>;
    fn predict(&self, state: &[f32], steps_ahead: usize) -> Result<Vec<f32>, StackError>;
    fn memory_usage_mb(&self) -> f64;
}
