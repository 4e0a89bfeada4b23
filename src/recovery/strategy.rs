use std::sync::Arc;
use tracing::info;

use crate::stack::StackManager;

/// Component-specific re-initialization routine. Strategies must be
/// idempotent: invoking one on an already-healthy component is a no-op.
pub trait RecoveryStrategy: Send + Sync {
    fn recover(&self, error: &str) -> Result<(), String>;
}

/// Closure adapter for simple reconnect-style strategies.
pub struct FnStrategy<F>(pub F);

impl<F> RecoveryStrategy for FnStrategy<F>
where
    F: Fn(&str) -> Result<(), String> + Send + Sync,
{
    fn recover(&self, error: &str) -> Result<(), String> {
        (self.0)(error)
    }
}

/// Tears the advanced stack down and brings it back up. If the rebuild
/// fails the stack stays lightweight, which is a healthy degraded state.
pub struct StackRebuildStrategy {
    stack: Arc<StackManager>,
}

impl StackRebuildStrategy {
    pub fn new(stack: Arc<StackManager>) -> Self {
        Self { stack }
    }
}

impl RecoveryStrategy for StackRebuildStrategy {
    fn recover(&self, error: &str) -> Result<(), String> {
        info!("rebuilding decision stack after: {error}");
        let was_advanced = self.stack.status().advanced_enabled;
        self.stack
            .toggle_advanced(false)
            .map_err(|e| e.to_string())?;
        if was_advanced {
            self.stack.toggle_advanced(true).map_err(|e| e.to_string())?;
        }
        Ok(())
    }
}
