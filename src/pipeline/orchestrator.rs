use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use super::fusion::{FusionPolicy, ProposalSet};
use super::io::{ActionExecutor, CaptureSource, Detector};
use super::metrics::MetricsCollector;
use super::types::{Frame, FusedAction, GameStateSnapshot};
use crate::agents::AgentSet;
use crate::config::Configuration;
use crate::events::{Listeners, PipelineListener};
use crate::runtime::{ResourceLease, WorkerPool};
use crate::session::SessionStore;

/// Listener and session metrics are flushed every this many actions.
const METRICS_FLUSH_EVERY: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PipelineState {
    NotStarted = 0,
    Active = 1,
    Paused = 2,
    Stopped = 3,
    Error = 4,
}

impl PipelineState {
    fn from_index(index: u8) -> PipelineState {
        match index {
            1 => PipelineState::Active,
            2 => PipelineState::Paused,
            3 => PipelineState::Stopped,
            4 => PipelineState::Error,
            _ => PipelineState::NotStarted,
        }
    }
}

struct StagePools {
    capture: WorkerPool,
    inference: WorkerPool,
    execution: WorkerPool,
}

struct Shared {
    state: AtomicU8,
    running: AtomicBool,
    start_lock: Mutex<()>,
    capture: Arc<dyn CaptureSource>,
    detector: Arc<dyn Detector>,
    executor: Arc<dyn ActionExecutor>,
    session: Arc<dyn SessionStore>,
    agents: AgentSet,
    fusion: FusionPolicy,
    metrics: Arc<MetricsCollector>,
    listeners: Listeners<dyn PipelineListener>,
    camera_lease: ResourceLease,
    pools: Mutex<Option<StagePools>>,
    frame_interval: Duration,
    capture_backoff: Duration,
    fast_execution: Duration,
    inference_workers: usize,
    inference_queue_depth: usize,
    execution_queue_depth: usize,
    shutdown_grace: Duration,
}

/// Owns the pipeline lifecycle and the staged concurrent loop:
/// capture -> inference (agent fan-out + fusion) -> execution -> feedback.
///
/// Frames are submitted to the inference pool in capture order, but with
/// two inference workers completion across frames is not FIFO: a later
/// frame's action can execute before an earlier one's. That reordering is
/// an accepted latency trade-off of the staging, not a defect.
pub struct PipelineOrchestrator {
    shared: Arc<Shared>,
}

impl PipelineOrchestrator {
    pub fn new(
        configuration: &Configuration,
        capture: Arc<dyn CaptureSource>,
        detector: Arc<dyn Detector>,
        executor: Arc<dyn ActionExecutor>,
        session: Arc<dyn SessionStore>,
        agents: AgentSet,
        fusion: FusionPolicy,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: AtomicU8::new(PipelineState::NotStarted as u8),
                running: AtomicBool::new(false),
                start_lock: Mutex::new(()),
                capture,
                detector,
                executor,
                session,
                agents,
                fusion,
                metrics: Arc::new(MetricsCollector::new()),
                listeners: Listeners::new(),
                camera_lease: ResourceLease::new("capture-device"),
                pools: Mutex::new(None),
                frame_interval: Duration::from_millis(configuration.frame_interval_ms),
                capture_backoff: Duration::from_millis(configuration.capture_backoff_ms),
                fast_execution: Duration::from_millis(configuration.fast_execution_ms),
                inference_workers: configuration.inference_workers,
                inference_queue_depth: configuration.inference_queue_depth,
                execution_queue_depth: configuration.execution_queue_depth,
                shutdown_grace: Duration::from_millis(configuration.shutdown_grace_ms),
            }),
        }
    }

    pub fn add_listener(&self, listener: Arc<dyn PipelineListener>) {
        self.shared.listeners.add(listener);
    }

    pub fn metrics(&self) -> Arc<MetricsCollector> {
        self.shared.metrics.clone()
    }

    pub fn state(&self) -> PipelineState {
        PipelineState::from_index(self.shared.state.load(Ordering::Acquire))
    }

    /// Idempotent: an already-active pipeline reports true and does nothing.
    /// Readiness failures leave the pipeline in the Error state.
    pub fn start(&self) -> bool {
        // One starter at a time: the loser of a racing pair waits here,
        // then observes Active and reports idempotent success instead of
        // failing the lease acquisition below.
        let _starting = self
            .shared
            .start_lock
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        if self.state() == PipelineState::Active {
            debug!("start() on an active pipeline, nothing to do");
            return true;
        }

        if !self.shared.capture.is_ready() {
            error!("capture source is not ready");
            self.shared.set_state(PipelineState::Error);
            return false;
        }
        if !self.shared.executor.is_ready() {
            error!("action executor is not ready");
            self.shared.set_state(PipelineState::Error);
            return false;
        }

        let Some(lease) = self.shared.camera_lease.acquire() else {
            error!("capture device is already leased");
            self.shared.set_state(PipelineState::Error);
            return false;
        };

        if let Err(e) = self.shared.session.open() {
            error!("could not open session: {e}");
            self.shared.set_state(PipelineState::Error);
            return false;
        }

        let pools = match self.build_pools() {
            Ok(pools) => pools,
            Err(e) => {
                error!("could not build stage pools: {e}");
                let _ = self.shared.session.close();
                self.shared.set_state(PipelineState::Error);
                return false;
            }
        };

        self.shared.metrics.reset();
        self.shared.running.store(true, Ordering::Release);

        {
            let mut slot = self.shared.pools.lock().unwrap_or_else(|e| e.into_inner());
            let shared = self.shared.clone();
            if let Err(e) = pools.capture.submit(move || shared.capture_loop(lease)) {
                error!("could not launch the capture loop: {e}");
                let _ = self.shared.session.close();
                self.shared.running.store(false, Ordering::Release);
                self.shared.set_state(PipelineState::Error);
                return false;
            }
            *slot = Some(pools);
        }

        self.shared.set_state(PipelineState::Active);
        info!("pipeline started");
        true
    }

    /// Clears the run flag, closes the session, and shuts the stage pools
    /// down with the configured grace window. In-flight work is abandoned,
    /// not interrupted.
    pub fn stop(&self) {
        self.shared.running.store(false, Ordering::Release);

        let pools = {
            let mut slot = self.shared.pools.lock().unwrap_or_else(|e| e.into_inner());
            slot.take()
        };
        if let Some(mut pools) = pools {
            pools.capture.shutdown(self.shared.shutdown_grace);
            pools.inference.shutdown(self.shared.shutdown_grace);
            pools.execution.shutdown(self.shared.shutdown_grace);
        }

        if let Err(e) = self.shared.session.close() {
            warn!("session close failed: {e}");
        }
        self.shared.set_state(PipelineState::Stopped);
        info!("pipeline stopped");
    }

    /// Keeps the loop alive but skips capture until resumed.
    pub fn pause(&self) {
        if self.state() == PipelineState::Active {
            self.shared.set_state(PipelineState::Paused);
        }
    }

    pub fn resume(&self) {
        if self.state() == PipelineState::Paused {
            self.shared.set_state(PipelineState::Active);
        }
    }

    fn build_pools(&self) -> Result<StagePools, crate::error::PoolError> {
        Ok(StagePools {
            capture: WorkerPool::new("capture", 1, 1)?,
            inference: WorkerPool::new(
                "inference",
                self.shared.inference_workers,
                self.shared.inference_queue_depth,
            )?,
            // Single thread keeps gesture injection strictly sequential.
            execution: WorkerPool::new("execution", 1, self.shared.execution_queue_depth)?,
        })
    }
}

impl Shared {
    fn state(&self) -> PipelineState {
        PipelineState::from_index(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: PipelineState) {
        self.state.store(state as u8, Ordering::Release);
        self.listeners.notify(|l| l.on_state_changed(state));
    }

    /// The dedicated capture/pacing loop. Holds the device lease for its
    /// whole lifetime and paces iterations to the frame interval.
    fn capture_loop(self: Arc<Self>, _lease: crate::runtime::LeaseGuard) {
        info!("capture loop started");
        while self.running.load(Ordering::Acquire) {
            let iteration_start = Instant::now();

            if self.state() == PipelineState::Paused {
                thread::sleep(self.frame_interval);
                continue;
            }

            match self.capture.capture_frame() {
                None => {
                    // Transient, self-healing: fixed backoff, no escalation.
                    thread::sleep(self.capture_backoff);
                    continue;
                }
                Some(frame) => {
                    self.metrics
                        .record_frame_captured(iteration_start.elapsed().as_millis() as u64);
                    self.submit_inference(frame);
                }
            }

            // Pace to the target interval; the remainder is never negative.
            let elapsed = iteration_start.elapsed();
            if elapsed < self.frame_interval {
                thread::sleep(self.frame_interval - elapsed);
            }
        }
        info!("capture loop exited");
    }

    fn submit_inference(self: &Arc<Self>, frame: Frame) {
        let pools = self.pools.lock().unwrap_or_else(|e| e.into_inner());
        let Some(pools) = pools.as_ref() else {
            // Shutdown already took the pools; the frame still counts as shed.
            debug!("no stage pools, dropping frame {}", frame.id);
            self.metrics.record_frame_dropped();
            return;
        };
        let shared = self.clone();
        if let Err(e) = pools.inference.submit(move || shared.inference_job(frame)) {
            // Backpressure: shed the frame rather than queue unboundedly.
            debug!("inference backlog, dropping frame: {e}");
            self.metrics.record_frame_dropped();
        }
    }

    /// Inference stage: detect, snapshot, fan out to the agents, fuse, and
    /// hand off to execution. Any error drops this frame only.
    fn inference_job(self: Arc<Self>, frame: Frame) {
        if !self.running.load(Ordering::Acquire) {
            return;
        }
        let inference_start = Instant::now();

        let objects = match self.detector.detect_objects(&frame) {
            Ok(objects) => objects,
            Err(e) => {
                warn!("frame {} dropped, detection failed: {e}", frame.id);
                return;
            }
        };

        let snapshot = Arc::new(GameStateSnapshot::from_detections(&frame, &objects));

        let mut proposals = ProposalSet::default();
        match self.agents.value_based.propose_action(&snapshot) {
            Ok(proposal) => proposals.value_based = Some(proposal),
            Err(e) => warn!("value agent skipped this frame: {e}"),
        }
        match self.agents.policy_gradient.propose_action(&snapshot) {
            Ok(proposal) => proposals.policy_gradient = Some(proposal),
            Err(e) => warn!("policy agent skipped this frame: {e}"),
        }
        match self.agents.rule_based.propose_action(&snapshot) {
            Ok(proposal) => proposals.rule_based = Some(proposal),
            Err(e) => warn!("rule agent skipped this frame: {e}"),
        }

        let fused = self.fusion.fuse(&snapshot, &proposals);
        self.metrics
            .record_inference(inference_start.elapsed().as_millis() as u64);

        if !self.running.load(Ordering::Acquire) {
            return;
        }
        self.submit_execution(fused);
    }

    fn submit_execution(self: &Arc<Self>, fused: FusedAction) {
        let pools = self.pools.lock().unwrap_or_else(|e| e.into_inner());
        let Some(pools) = pools.as_ref() else {
            return;
        };
        let kind = fused.kind;
        let shared = self.clone();
        if let Err(e) = pools.execution.submit(move || shared.execution_job(fused)) {
            self.metrics
                .record_action_failure(kind, &format!("execution queue rejected action: {e}"));
        }
    }

    /// Execution stage: inject the gesture, record timings, and feed the
    /// reward back into every agent.
    fn execution_job(self: Arc<Self>, fused: FusedAction) {
        if !self.running.load(Ordering::Acquire) {
            return;
        }

        let execution_start = Instant::now();
        let success = self.executor.execute(&fused);
        let execution_time = execution_start.elapsed();
        let execution_ms = execution_time.as_millis() as u64;
        let latency_ms = fused.captured_at.elapsed().as_millis() as u64;

        self.metrics
            .record_action_execution(&fused, success, execution_ms, latency_ms);

        let mut reward = if success { 1.0 } else { -0.5 };
        if execution_time < self.fast_execution {
            reward += 0.2;
        }
        for agent in self.agents.all() {
            let loss = agent.train_step(reward);
            debug!("agent '{}' trained, loss {:.4}", agent.name(), loss);
        }
        self.agents.rule_based.update_strategy(reward);

        self.listeners.notify(|l| l.on_action_executed(&fused, success));

        let total = self.metrics.total_actions();
        if total % METRICS_FLUSH_EVERY == 0 {
            let snapshot = self.metrics.snapshot();
            self.listeners.notify(|l| l.on_metrics_updated(&snapshot));
            if let Err(e) = self.session.update(&snapshot) {
                warn!("session metrics update failed: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::{PolicyGradientAgent, RuleBasedAgent, ValueAgent};
    use crate::error::PipelineError;
    use crate::pipeline::types::{ActionKind, BoundingBox, DetectedObject};
    use std::sync::atomic::AtomicUsize;
    use uuid::Uuid;

    struct ScriptedCapture {
        frames: AtomicUsize,
        limit: usize,
        ready: bool,
    }

    impl ScriptedCapture {
        fn with_frames(limit: usize) -> Self {
            Self {
                frames: AtomicUsize::new(0),
                limit,
                ready: true,
            }
        }

        fn not_ready() -> Self {
            Self {
                frames: AtomicUsize::new(0),
                limit: 0,
                ready: false,
            }
        }
    }

    impl CaptureSource for ScriptedCapture {
        fn is_ready(&self) -> bool {
            self.ready
        }

        fn capture_frame(&self) -> Option<Frame> {
            let index = self.frames.fetch_add(1, Ordering::SeqCst);
            if index < self.limit {
                Some(Frame::new(index as u64, 4, 4, vec![0; 16]))
            } else {
                None
            }
        }
    }

    struct ThreatDetector;

    impl Detector for ThreatDetector {
        fn detect_objects(&self, _frame: &Frame) -> Result<Vec<DetectedObject>, PipelineError> {
            Ok(vec![DetectedObject {
                label: "enemy".to_string(),
                confidence: 0.9,
                bounds: BoundingBox {
                    x: 0.0,
                    y: 0.0,
                    width: 4.0,
                    height: 4.0,
                },
            }])
        }
    }

    #[derive(Default)]
    struct CountingExecutor {
        executions: AtomicUsize,
    }

    impl ActionExecutor for CountingExecutor {
        fn execute(&self, _action: &FusedAction) -> bool {
            self.executions.fetch_add(1, Ordering::SeqCst);
            true
        }
    }

    #[derive(Default)]
    struct CountingSession {
        opens: AtomicUsize,
        closes: AtomicUsize,
    }

    impl SessionStore for CountingSession {
        fn open(&self) -> Result<Uuid, PipelineError> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            Ok(Uuid::new_v4())
        }

        fn update(
            &self,
            _snapshot: &crate::pipeline::metrics::PerformanceSnapshot,
        ) -> Result<(), PipelineError> {
            Ok(())
        }

        fn close(&self) -> Result<(), PipelineError> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn fast_configuration() -> Configuration {
        Configuration {
            frame_interval_ms: 5,
            capture_backoff_ms: 1,
            shutdown_grace_ms: 500,
            ..Configuration::default()
        }
    }

    fn agents() -> AgentSet {
        AgentSet {
            value_based: Arc::new(ValueAgent::with_seed(5)),
            policy_gradient: Arc::new(PolicyGradientAgent::with_seed("/nonexistent/p.json", 5)),
            rule_based: Arc::new(RuleBasedAgent::new()),
        }
    }

    fn orchestrator(
        capture: Arc<dyn CaptureSource>,
        executor: Arc<dyn ActionExecutor>,
        session: Arc<CountingSession>,
    ) -> PipelineOrchestrator {
        PipelineOrchestrator::new(
            &fast_configuration(),
            capture,
            Arc::new(ThreatDetector),
            executor,
            session,
            agents(),
            FusionPolicy::with_seed(17),
        )
    }

    fn wait_until(deadline_ms: u64, mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_millis(deadline_ms);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        condition()
    }

    #[test]
    fn frames_flow_through_to_execution() {
        let executor = Arc::new(CountingExecutor::default());
        let session = Arc::new(CountingSession::default());
        let pipeline = orchestrator(
            Arc::new(ScriptedCapture::with_frames(5)),
            executor.clone(),
            session.clone(),
        );

        assert!(pipeline.start());
        assert!(wait_until(2_000, || {
            executor.executions.load(Ordering::SeqCst) >= 3
        }));
        pipeline.stop();

        assert_eq!(pipeline.state(), PipelineState::Stopped);
        assert!(pipeline.metrics().total_actions() >= 3);
        assert!(pipeline.metrics().success_rate() > 99.0);
        assert_eq!(session.closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn start_is_idempotent_and_keeps_one_loop() {
        let session = Arc::new(CountingSession::default());
        let pipeline = orchestrator(
            Arc::new(ScriptedCapture::with_frames(0)),
            Arc::new(CountingExecutor::default()),
            session.clone(),
        );

        assert!(pipeline.start());
        assert!(pipeline.start());
        assert_eq!(pipeline.state(), PipelineState::Active);
        // Exactly one session and one leased capture loop despite two calls.
        assert_eq!(session.opens.load(Ordering::SeqCst), 1);
        pipeline.stop();
    }

    #[test]
    fn racing_starts_both_report_success() {
        let session = Arc::new(CountingSession::default());
        let pipeline = Arc::new(orchestrator(
            Arc::new(ScriptedCapture::with_frames(0)),
            Arc::new(CountingExecutor::default()),
            session.clone(),
        ));

        let starters: Vec<_> = (0..2)
            .map(|_| {
                let pipeline = pipeline.clone();
                thread::spawn(move || pipeline.start())
            })
            .collect();
        for starter in starters {
            assert!(starter.join().expect("starter panicked"));
        }
        // The loser must not smear Error over the winner's Active state.
        assert_eq!(pipeline.state(), PipelineState::Active);
        assert_eq!(session.opens.load(Ordering::SeqCst), 1);
        pipeline.stop();
    }

    #[test]
    fn frames_without_pools_count_as_dropped() {
        let session = Arc::new(CountingSession::default());
        let pipeline = orchestrator(
            Arc::new(ScriptedCapture::with_frames(0)),
            Arc::new(CountingExecutor::default()),
            session,
        );

        // The pools slot is empty, as after stop() has taken it.
        pipeline.shared.submit_inference(Frame::new(1, 4, 4, vec![0; 16]));
        assert_eq!(pipeline.metrics().frames_dropped(), 1);
    }

    #[test]
    fn readiness_failure_sets_error_state() {
        let session = Arc::new(CountingSession::default());
        let pipeline = orchestrator(
            Arc::new(ScriptedCapture::not_ready()),
            Arc::new(CountingExecutor::default()),
            session.clone(),
        );

        assert!(!pipeline.start());
        assert_eq!(pipeline.state(), PipelineState::Error);
        assert_eq!(session.opens.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn capture_misses_back_off_without_escalating() {
        let capture = Arc::new(ScriptedCapture::with_frames(0));
        let session = Arc::new(CountingSession::default());
        let pipeline = orchestrator(
            capture.clone(),
            Arc::new(CountingExecutor::default()),
            session,
        );

        assert!(pipeline.start());
        // The loop keeps polling through misses instead of dying.
        assert!(wait_until(2_000, || {
            capture.frames.load(Ordering::SeqCst) >= 5
        }));
        assert_eq!(pipeline.state(), PipelineState::Active);
        pipeline.stop();
        assert_eq!(pipeline.metrics().total_actions(), 0);
    }

    #[test]
    fn pause_stops_capturing_until_resume() {
        let capture = Arc::new(ScriptedCapture::with_frames(usize::MAX));
        let session = Arc::new(CountingSession::default());
        let pipeline = orchestrator(
            capture.clone(),
            Arc::new(CountingExecutor::default()),
            session,
        );

        assert!(pipeline.start());
        assert!(wait_until(2_000, || capture.frames.load(Ordering::SeqCst) >= 2));
        pipeline.pause();
        assert_eq!(pipeline.state(), PipelineState::Paused);
        // Let in-flight iterations drain, then the counter must hold still.
        thread::sleep(Duration::from_millis(50));
        let frozen = capture.frames.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(50));
        assert!(capture.frames.load(Ordering::SeqCst) <= frozen + 1);

        pipeline.resume();
        assert!(wait_until(2_000, || {
            capture.frames.load(Ordering::SeqCst) > frozen + 1
        }));
        pipeline.stop();
    }

    #[test]
    fn stop_without_start_is_harmless() {
        let session = Arc::new(CountingSession::default());
        let pipeline = orchestrator(
            Arc::new(ScriptedCapture::with_frames(0)),
            Arc::new(CountingExecutor::default()),
            session,
        );
        pipeline.stop();
        assert_eq!(pipeline.state(), PipelineState::Stopped);
    }

    #[test]
    fn executed_actions_notify_listeners() {
        #[derive(Default)]
        struct Recording {
            executed: AtomicUsize,
        }

        impl PipelineListener for Recording {
            fn on_state_changed(&self, _state: PipelineState) {}
            fn on_action_executed(&self, _action: &FusedAction, success: bool) {
                assert!(success);
                self.executed.fetch_add(1, Ordering::SeqCst);
            }
            fn on_metrics_updated(
                &self,
                _snapshot: &crate::pipeline::metrics::PerformanceSnapshot,
            ) {
            }
        }

        let executor = Arc::new(CountingExecutor::default());
        let session = Arc::new(CountingSession::default());
        let pipeline = orchestrator(
            Arc::new(ScriptedCapture::with_frames(3)),
            executor,
            session,
        );
        let listener = Arc::new(Recording::default());
        pipeline.add_listener(listener.clone());

        assert!(pipeline.start());
        assert!(wait_until(2_000, || {
            listener.executed.load(Ordering::SeqCst) >= 1
        }));
        pipeline.stop();
    }

    #[test]
    fn threat_frames_execute_the_rule_proposal() {
        // ThreatDetector reports threat 0.9, so fusion must always pick the
        // rule-based proposal for these frames.
        struct KindChecker {
            wrong_kinds: AtomicUsize,
            executions: AtomicUsize,
        }

        impl ActionExecutor for KindChecker {
            fn execute(&self, action: &FusedAction) -> bool {
                self.executions.fetch_add(1, Ordering::SeqCst);
                if action.source != crate::pipeline::types::ProposalSource::RuleBased {
                    self.wrong_kinds.fetch_add(1, Ordering::SeqCst);
                }
                // Under high threat the default rules evade.
                if action.kind != ActionKind::Swipe {
                    self.wrong_kinds.fetch_add(1, Ordering::SeqCst);
                }
                true
            }
        }

        let executor = Arc::new(KindChecker {
            wrong_kinds: AtomicUsize::new(0),
            executions: AtomicUsize::new(0),
        });
        let session = Arc::new(CountingSession::default());
        let pipeline = orchestrator(
            Arc::new(ScriptedCapture::with_frames(5)),
            executor.clone(),
            session,
        );

        assert!(pipeline.start());
        assert!(wait_until(2_000, || {
            executor.executions.load(Ordering::SeqCst) >= 3
        }));
        pipeline.stop();
        assert_eq!(executor.wrong_kinds.load(Ordering::SeqCst), 0);
    }
}
