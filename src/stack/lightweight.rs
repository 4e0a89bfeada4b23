use tracing::trace;

use super::{Decision, DecisionBackend, DecisionTier};
use crate::error::StackError;
use crate::pipeline::types::ActionKind;

/// Always-available heuristic backend. Thresholds over the state vector,
/// no learned components, negligible memory.
pub struct LightweightBackend;

impl LightweightBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LightweightBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DecisionBackend for LightweightBackend {
    fn name(&self) -> &'static str {
        "lightweight"
    }

    fn is_initialized(&self) -> bool {
        true
    }

    fn decide(&self, state: &[f32]) -> Result<Decision, StackError> {
        // State vector layout: [object_count, threat, opportunity, health].
        let threat = state.get(1).copied().unwrap_or(0.0);
        let opportunity = state.get(2).copied().unwrap_or(0.0);
        let health = state.get(3).copied().unwrap_or(1.0);

        let (kind, confidence) = if health < 0.2 {
            (ActionKind::Back, 0.9)
        } else if threat > 0.7 {
            (ActionKind::Swipe, 0.85)
        } else if opportunity > 0.5 {
            (ActionKind::Tap, 0.75)
        } else {
            (ActionKind::Wait, 0.6)
        };
        trace!("lightweight decision: {}", kind.name());
        Ok(Decision {
            kind,
            target: None,
            confidence,
            tier: DecisionTier::Lightweight,
        })
    }

    fn predict(&self, state: &[f32], steps_ahead: usize) -> Result<Vec<f32>, StackError> {
        // Levels decay toward calm; counts stay put. Good enough for the
        // cheap tier.
        let decay = 0.9f32.powi(steps_ahead as i32);
        let mut predicted = state.to_vec();
        for (index, value) in predicted.iter_mut().enumerate() {
            if index > 0 {
                *value *= decay;
            }
        }
        Ok(predicted)
    }

    fn memory_usage_mb(&self) -> f64 {
        0.1
    }
}
