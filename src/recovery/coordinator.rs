use indexmap::IndexMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{info, warn};

use super::strategy::RecoveryStrategy;
use crate::error::RecoveryError;
use crate::events::{Listeners, RecoveryListener};

pub const MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(30);

/// Per-component failure bookkeeping.
#[derive(Debug, Clone, Default)]
pub struct RecoveryRecord {
    pub failure_count: u32,
    pub last_attempt: Option<Instant>,
}

/// Serializes and bounds recovery across the whole system.
///
/// One system-wide in-progress flag means two components are never
/// recovered concurrently; cascading failures queue up behind rejections
/// instead of racing each other for the same resources.
pub struct RecoveryCoordinator {
    in_progress: AtomicBool,
    records: Mutex<HashMap<String, RecoveryRecord>>,
    strategies: Mutex<IndexMap<String, Box<dyn RecoveryStrategy>>>,
    listeners: Listeners<dyn RecoveryListener>,
    max_attempts: u32,
    cooldown: Duration,
}

impl RecoveryCoordinator {
    pub fn new() -> Self {
        Self::with_policy(MAX_ATTEMPTS, DEFAULT_COOLDOWN)
    }

    /// Policy-injecting constructor, used by tests to collapse the cooldown.
    pub fn with_policy(max_attempts: u32, cooldown: Duration) -> Self {
        Self {
            in_progress: AtomicBool::new(false),
            records: Mutex::new(HashMap::new()),
            strategies: Mutex::new(IndexMap::new()),
            listeners: Listeners::new(),
            max_attempts,
            cooldown,
        }
    }

    pub fn register_strategy(&self, component: impl Into<String>, strategy: Box<dyn RecoveryStrategy>) {
        let mut strategies = self.strategies.lock().unwrap_or_else(|e| e.into_inner());
        strategies.insert(component.into(), strategy);
    }

    pub fn add_listener(&self, listener: Arc<dyn RecoveryListener>) {
        self.listeners.add(listener);
    }

    /// Attempt to recover one component. Returns false without side effects
    /// when another recovery is running, the component's budget is spent,
    /// or its cooldown has not elapsed.
    pub fn attempt_recovery(&self, component: &str, error: &str) -> bool {
        match self.attempt(component, error) {
            Ok(()) => true,
            Err(e) => {
                warn!("recovery of '{component}' not performed: {e}");
                false
            }
        }
    }

    fn attempt(&self, component: &str, error: &str) -> Result<(), RecoveryError> {
        // Pre-checks happen before the flag is taken so a rejection leaves
        // no trace at all.
        if self.in_progress.load(Ordering::Acquire) {
            return Err(RecoveryError::InProgress);
        }
        {
            let records = self.records.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(record) = records.get(component) {
                if record.failure_count >= self.max_attempts {
                    return Err(RecoveryError::BudgetExhausted(component.to_string()));
                }
                if let Some(last) = record.last_attempt {
                    if last.elapsed() < self.cooldown {
                        return Err(RecoveryError::Cooldown(component.to_string()));
                    }
                }
            }
        }

        if self
            .in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(RecoveryError::InProgress);
        }

        let result = self.run_strategy(component, error);

        // Cleared on every path before returning.
        self.in_progress.store(false, Ordering::Release);
        result
    }

    fn run_strategy(&self, component: &str, error: &str) -> Result<(), RecoveryError> {
        info!("recovering '{component}' after: {error}");
        self.listeners.notify(|l| l.on_started(component));

        let outcome = {
            let strategies = self.strategies.lock().unwrap_or_else(|e| e.into_inner());
            match strategies.get(component) {
                // Unknown components fail closed.
                None => Err(RecoveryError::NoStrategy(component.to_string())),
                Some(strategy) => strategy
                    .recover(error)
                    .map_err(|e| RecoveryError::StrategyFailed(component.to_string(), e)),
            }
        };

        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        let record = records.entry(component.to_string()).or_default();
        match &outcome {
            Ok(()) => {
                *record = RecoveryRecord::default();
                drop(records);
                info!("recovery of '{component}' completed");
                self.listeners.notify(|l| l.on_completed(component));
            }
            Err(e) => {
                record.failure_count += 1;
                record.last_attempt = Some(Instant::now());
                drop(records);
                let message = e.to_string();
                warn!("recovery of '{component}' failed: {message}");
                self.listeners.notify(|l| l.on_failed(component, &message));
            }
        }
        outcome
    }

    pub fn is_recovering(&self) -> bool {
        self.in_progress.load(Ordering::Acquire)
    }

    pub fn record_for(&self, component: &str) -> RecoveryRecord {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(component)
            .cloned()
            .unwrap_or_default()
    }

    /// Operator escape hatch once a component has been manually restarted.
    pub fn reset(&self, component: &str) {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(component);
    }
}

impl Default for RecoveryCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
