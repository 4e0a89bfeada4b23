use std::sync::{Arc, Mutex};

use crate::init::InitPhase;
use crate::pipeline::metrics::PerformanceSnapshot;
use crate::pipeline::types::FusedAction;
use crate::pipeline::PipelineState;

/// Copy-on-iterate listener registry. `notify` clones the subscriber list
/// under the lock and invokes callbacks outside it, so a listener may
/// re-register or query the owning component without deadlocking.
pub struct Listeners<L: ?Sized> {
    inner: Mutex<Vec<Arc<L>>>,
}

impl<L: ?Sized> Default for Listeners<L> {
    fn default() -> Self {
        Self {
            inner: Mutex::new(Vec::new()),
        }
    }
}

impl<L: ?Sized> Listeners<L> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, listener: Arc<L>) {
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        guard.push(listener);
    }

    pub fn notify(&self, f: impl Fn(&L)) {
        let snapshot: Vec<Arc<L>> = {
            let guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            guard.clone()
        };
        for listener in &snapshot {
            f(listener);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub trait PipelineListener: Send + Sync {
    fn on_state_changed(&self, state: PipelineState);
    fn on_action_executed(&self, action: &FusedAction, success: bool);
    fn on_metrics_updated(&self, snapshot: &PerformanceSnapshot);
}

pub trait RecoveryListener: Send + Sync {
    fn on_started(&self, component: &str);
    fn on_completed(&self, component: &str);
    fn on_failed(&self, component: &str, error: &str);
}

pub trait InitListener: Send + Sync {
    fn on_phase_started(&self, phase: InitPhase);
    fn on_phase_completed(&self, phase: InitPhase);
    fn on_complete(&self);
    fn on_failed(&self, phase: InitPhase, error: &str);
}
