use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use super::types::{ActionKind, FusedAction};

const HISTORY_CAPACITY: usize = 100;
const RECENT_ERROR_CAPACITY: usize = 10;

/// One executed (or failed) action, appended to the bounded history.
#[derive(Debug, Clone)]
pub struct ActionRecord {
    pub at: DateTime<Utc>,
    pub kind: ActionKind,
    pub success: bool,
    pub execution_ms: Option<u64>,
    pub latency_ms: Option<u64>,
}

/// Aggregate view handed to listeners and status queries.
#[derive(Debug, Clone)]
pub struct PerformanceSnapshot {
    pub total_actions: u64,
    pub successful_actions: u64,
    pub failed_actions: u64,
    pub success_rate: f64,
    pub average_latency_ms: f64,
    pub min_latency_ms: u64,
    pub max_latency_ms: u64,
    pub actions_per_second: f64,
    pub frames_per_second: f64,
    pub last_frame_ms: u64,
    pub last_inference_ms: u64,
    pub last_execution_ms: u64,
}

/// Per-action-kind aggregate with a short tail of recent errors.
#[derive(Debug, Clone, Default)]
pub struct ActionTypeMetrics {
    pub count: u64,
    pub success_count: u64,
    pub total_execution_ms: u64,
    pub recent_errors: VecDeque<String>,
}

impl ActionTypeMetrics {
    fn push_error(&mut self, message: String) {
        if self.recent_errors.len() == RECENT_ERROR_CAPACITY {
            self.recent_errors.pop_front();
        }
        self.recent_errors.push_back(message);
    }
}

/// Thread-safe pipeline performance aggregation.
///
/// Counters are plain atomics and min/max use compare-and-set loops, so
/// concurrent writers from the inference and execution pools never block
/// each other. `reset` is not one atomic transaction: a reader racing a
/// reset may observe a transiently inconsistent view.
pub struct MetricsCollector {
    total_actions: AtomicU64,
    successful_actions: AtomicU64,
    failed_actions: AtomicU64,
    frames_captured: AtomicU64,
    frames_dropped: AtomicU64,
    latency_sum_ms: AtomicU64,
    timed_actions: AtomicU64,
    min_latency_ms: AtomicU64,
    max_latency_ms: AtomicU64,
    last_frame_ms: AtomicU64,
    last_inference_ms: AtomicU64,
    last_execution_ms: AtomicU64,
    session_start: Mutex<Instant>,
    history: Mutex<VecDeque<ActionRecord>>,
    per_kind: Mutex<IndexMap<ActionKind, ActionTypeMetrics>>,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            total_actions: AtomicU64::new(0),
            successful_actions: AtomicU64::new(0),
            failed_actions: AtomicU64::new(0),
            frames_captured: AtomicU64::new(0),
            frames_dropped: AtomicU64::new(0),
            latency_sum_ms: AtomicU64::new(0),
            timed_actions: AtomicU64::new(0),
            min_latency_ms: AtomicU64::new(u64::MAX),
            max_latency_ms: AtomicU64::new(0),
            last_frame_ms: AtomicU64::new(0),
            last_inference_ms: AtomicU64::new(0),
            last_execution_ms: AtomicU64::new(0),
            session_start: Mutex::new(Instant::now()),
            history: Mutex::new(VecDeque::with_capacity(HISTORY_CAPACITY)),
            per_kind: Mutex::new(IndexMap::new()),
        }
    }

    pub fn record_action_execution(
        &self,
        action: &FusedAction,
        success: bool,
        execution_ms: u64,
        latency_ms: u64,
    ) {
        self.total_actions.fetch_add(1, Ordering::Relaxed);
        if success {
            self.successful_actions.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed_actions.fetch_add(1, Ordering::Relaxed);
        }
        self.latency_sum_ms.fetch_add(latency_ms, Ordering::Relaxed);
        self.timed_actions.fetch_add(1, Ordering::Relaxed);
        self.last_execution_ms.store(execution_ms, Ordering::Relaxed);

        // CAS loops keep min/max correct under concurrent writers.
        let _ = self
            .min_latency_ms
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
                (latency_ms < current).then_some(latency_ms)
            });
        let _ = self
            .max_latency_ms
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
                (latency_ms > current).then_some(latency_ms)
            });

        self.push_history(ActionRecord {
            at: Utc::now(),
            kind: action.kind,
            success,
            execution_ms: Some(execution_ms),
            latency_ms: Some(latency_ms),
        });

        let mut per_kind = self.per_kind.lock().unwrap_or_else(|e| e.into_inner());
        let entry = per_kind.entry(action.kind).or_default();
        entry.count += 1;
        entry.total_execution_ms += execution_ms;
        if success {
            entry.success_count += 1;
        } else {
            entry.push_error(format!("execution of {} failed", action.kind.name()));
        }
    }

    /// Failure before execution ever started; no timing data exists.
    pub fn record_action_failure(&self, kind: ActionKind, error: &str) {
        self.total_actions.fetch_add(1, Ordering::Relaxed);
        self.failed_actions.fetch_add(1, Ordering::Relaxed);

        self.push_history(ActionRecord {
            at: Utc::now(),
            kind,
            success: false,
            execution_ms: None,
            latency_ms: None,
        });

        let mut per_kind = self.per_kind.lock().unwrap_or_else(|e| e.into_inner());
        let entry = per_kind.entry(kind).or_default();
        entry.count += 1;
        entry.push_error(error.to_string());
    }

    pub fn record_frame_captured(&self, capture_ms: u64) {
        self.frames_captured.fetch_add(1, Ordering::Relaxed);
        self.last_frame_ms.store(capture_ms, Ordering::Relaxed);
    }

    pub fn record_frame_dropped(&self) {
        self.frames_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_inference(&self, inference_ms: u64) {
        self.last_inference_ms.store(inference_ms, Ordering::Relaxed);
    }

    pub fn success_rate(&self) -> f64 {
        let total = self.total_actions.load(Ordering::Relaxed);
        if total == 0 {
            return 0.0;
        }
        self.successful_actions.load(Ordering::Relaxed) as f64 * 100.0 / total as f64
    }

    pub fn average_latency_ms(&self) -> f64 {
        let timed = self.timed_actions.load(Ordering::Relaxed);
        if timed == 0 {
            return 0.0;
        }
        self.latency_sum_ms.load(Ordering::Relaxed) as f64 / timed as f64
    }

    pub fn min_latency_ms(&self) -> u64 {
        let min = self.min_latency_ms.load(Ordering::Relaxed);
        if min == u64::MAX {
            0
        } else {
            min
        }
    }

    pub fn max_latency_ms(&self) -> u64 {
        self.max_latency_ms.load(Ordering::Relaxed)
    }

    pub fn total_actions(&self) -> u64 {
        self.total_actions.load(Ordering::Relaxed)
    }

    pub fn successful_actions(&self) -> u64 {
        self.successful_actions.load(Ordering::Relaxed)
    }

    pub fn failed_actions(&self) -> u64 {
        self.failed_actions.load(Ordering::Relaxed)
    }

    pub fn frames_captured(&self) -> u64 {
        self.frames_captured.load(Ordering::Relaxed)
    }

    pub fn frames_dropped(&self) -> u64 {
        self.frames_dropped.load(Ordering::Relaxed)
    }

    pub fn actions_per_second(&self) -> f64 {
        self.per_second(self.total_actions.load(Ordering::Relaxed))
    }

    pub fn frames_per_second(&self) -> f64 {
        self.per_second(self.frames_captured.load(Ordering::Relaxed))
    }

    fn per_second(&self, count: u64) -> f64 {
        let start = self.session_start.lock().unwrap_or_else(|e| e.into_inner());
        let elapsed = start.elapsed().as_secs_f64();
        if elapsed <= 0.0 {
            return 0.0;
        }
        count as f64 / elapsed
    }

    pub fn snapshot(&self) -> PerformanceSnapshot {
        PerformanceSnapshot {
            total_actions: self.total_actions(),
            successful_actions: self.successful_actions(),
            failed_actions: self.failed_actions(),
            success_rate: self.success_rate(),
            average_latency_ms: self.average_latency_ms(),
            min_latency_ms: self.min_latency_ms(),
            max_latency_ms: self.max_latency_ms(),
            actions_per_second: self.actions_per_second(),
            frames_per_second: self.frames_per_second(),
            last_frame_ms: self.last_frame_ms.load(Ordering::Relaxed),
            last_inference_ms: self.last_inference_ms.load(Ordering::Relaxed),
            last_execution_ms: self.last_execution_ms.load(Ordering::Relaxed),
        }
    }

    pub fn history(&self) -> Vec<ActionRecord> {
        self.history
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .cloned()
            .collect()
    }

    pub fn metrics_for(&self, kind: ActionKind) -> Option<ActionTypeMetrics> {
        self.per_kind
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&kind)
            .cloned()
    }

    /// Zero everything. Counters are cleared one by one, so a concurrent
    /// reader may observe a mix of old and new values mid-reset.
    pub fn reset(&self) {
        self.total_actions.store(0, Ordering::Relaxed);
        self.successful_actions.store(0, Ordering::Relaxed);
        self.failed_actions.store(0, Ordering::Relaxed);
        self.frames_captured.store(0, Ordering::Relaxed);
        self.frames_dropped.store(0, Ordering::Relaxed);
        self.latency_sum_ms.store(0, Ordering::Relaxed);
        self.timed_actions.store(0, Ordering::Relaxed);
        self.min_latency_ms.store(u64::MAX, Ordering::Relaxed);
        self.max_latency_ms.store(0, Ordering::Relaxed);
        self.last_frame_ms.store(0, Ordering::Relaxed);
        self.last_inference_ms.store(0, Ordering::Relaxed);
        self.last_execution_ms.store(0, Ordering::Relaxed);
        *self.session_start.lock().unwrap_or_else(|e| e.into_inner()) = Instant::now();
        self.history
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        self.per_kind
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    fn push_history(&self, record: ActionRecord) {
        let mut history = self.history.lock().unwrap_or_else(|e| e.into_inner());
        if history.len() == HISTORY_CAPACITY {
            history.pop_front();
        }
        history.push_back(record);
    }
}
