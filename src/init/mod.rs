pub mod models;
pub mod phase;

pub use models::{
    AccountingLoader, LoadFailure, ModelCatalog, ModelLoadState, ModelLoader, ModelSpec,
};
pub use phase::InitPhase;

use crossbeam_channel::{bounded, Receiver};
use indexmap::IndexMap;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use tracing::{error, info};

use crate::error::InitError;
use crate::events::{InitListener, Listeners};

type PhaseAction = Arc<dyn Fn() -> Result<(), String> + Send + Sync>;

/// Join handle for one initialization run. A rejected concurrent request
/// gets a handle that is already resolved to failure.
pub struct InitHandle {
    rx: Receiver<Result<(), InitError>>,
}

impl InitHandle {
    fn pre_failed(error: InitError) -> Self {
        let (tx, rx) = bounded(1);
        let _ = tx.send(Err(error));
        Self { rx }
    }

    pub fn wait_result(self) -> Result<(), InitError> {
        self.rx.recv().unwrap_or_else(|_| {
            Err(InitError::PhaseFailed {
                phase: InitPhase::DatabaseInit,
                message: "initialization worker vanished".to_string(),
            })
        })
    }

    pub fn wait(self) -> bool {
        self.wait_result().is_ok()
    }
}

/// Brings the system up in strict phase order on one dedicated worker
/// thread. Non-reentrant: a second request while one run is active is
/// rejected, not queued, and a failed run is never resumed mid-sequence —
/// the next request starts over from DATABASE_INIT.
pub struct InitializationCoordinator {
    running: AtomicBool,
    initialized: AtomicBool,
    current_phase: AtomicU8,
    actions: Mutex<IndexMap<InitPhase, PhaseAction>>,
    listeners: Listeners<dyn InitListener>,
    inter_phase_delay: Duration,
}

impl InitializationCoordinator {
    pub fn new() -> Self {
        Self::with_delay(Duration::from_millis(20))
    }

    pub fn with_delay(inter_phase_delay: Duration) -> Self {
        let mut actions: IndexMap<InitPhase, PhaseAction> = IndexMap::new();
        for phase in InitPhase::SEQUENCE {
            actions.insert(phase, Arc::new(|| Ok(())));
        }
        Self {
            running: AtomicBool::new(false),
            initialized: AtomicBool::new(false),
            current_phase: AtomicU8::new(InitPhase::DatabaseInit as u8),
            actions: Mutex::new(actions),
            listeners: Listeners::new(),
            inter_phase_delay,
        }
    }

    /// Replace the action executed for one phase. The composition root
    /// wires real work (storage, model catalog, services) in here.
    pub fn set_phase_action<F>(&self, phase: InitPhase, action: F)
    where
        F: Fn() -> Result<(), String> + Send + Sync + 'static,
    {
        let mut actions = self.actions.lock().unwrap_or_else(|e| e.into_inner());
        actions.insert(phase, Arc::new(action));
    }

    pub fn add_listener(&self, listener: Arc<dyn InitListener>) {
        self.listeners.add(listener);
    }

    pub fn initialize_all(self: &Arc<Self>) -> InitHandle {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return InitHandle::pre_failed(InitError::AlreadyRunning);
        }

        self.initialized.store(false, Ordering::Release);
        self.current_phase
            .store(InitPhase::DatabaseInit as u8, Ordering::Release);

        let coordinator = Arc::clone(self);
        let (tx, rx) = bounded(1);
        let spawn_result = thread::Builder::new()
            .name("init".to_string())
            .spawn(move || {
                let result = coordinator.run_sequence();
                coordinator.running.store(false, Ordering::Release);
                let _ = tx.send(result);
            });

        match spawn_result {
            Ok(_) => InitHandle { rx },
            Err(e) => {
                self.running.store(false, Ordering::Release);
                InitHandle::pre_failed(InitError::PhaseFailed {
                    phase: InitPhase::DatabaseInit,
                    message: format!("failed to spawn init worker: {e}"),
                })
            }
        }
    }

    fn run_sequence(&self) -> Result<(), InitError> {
        for phase in InitPhase::SEQUENCE {
            // Monotonic within a run; the next run resets it.
            self.current_phase.store(phase as u8, Ordering::Release);
            info!("initialization phase '{phase}' started");
            self.listeners.notify(|l| l.on_phase_started(phase));

            let action = {
                let actions = self.actions.lock().unwrap_or_else(|e| e.into_inner());
                actions.get(&phase).cloned()
            };
            if let Some(action) = action {
                if let Err(message) = action() {
                    error!("initialization phase '{phase}' failed: {message}");
                    self.listeners.notify(|l| l.on_failed(phase, &message));
                    return Err(InitError::PhaseFailed { phase, message });
                }
            }

            info!("initialization phase '{phase}' completed");
            self.listeners.notify(|l| l.on_phase_completed(phase));
            thread::sleep(self.inter_phase_delay);
        }

        self.current_phase
            .store(InitPhase::Complete as u8, Ordering::Release);
        self.initialized.store(true, Ordering::Release);
        self.listeners.notify(|l| l.on_complete());
        info!("initialization complete");
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    pub fn current_phase(&self) -> InitPhase {
        InitPhase::from_index(self.current_phase.load(Ordering::Acquire))
    }
}

impl Default for InitializationCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct Recording {
        events: Mutex<Vec<String>>,
    }

    impl InitListener for Recording {
        fn on_phase_started(&self, phase: InitPhase) {
            self.events.lock().expect("poisoned").push(format!("start:{phase}"));
        }
        fn on_phase_completed(&self, phase: InitPhase) {
            self.events.lock().expect("poisoned").push(format!("done:{phase}"));
        }
        fn on_complete(&self) {
            self.events.lock().expect("poisoned").push("complete".to_string());
        }
        fn on_failed(&self, phase: InitPhase, error: &str) {
            self.events
                .lock()
                .expect("poisoned")
                .push(format!("failed:{phase}:{error}"));
        }
    }

    fn coordinator() -> Arc<InitializationCoordinator> {
        Arc::new(InitializationCoordinator::with_delay(Duration::ZERO))
    }

    #[test]
    fn phases_run_in_strict_order() {
        let coordinator = coordinator();
        let listener = Arc::new(Recording::default());
        coordinator.add_listener(listener.clone());

        assert!(coordinator.initialize_all().wait());
        assert!(coordinator.is_initialized());
        assert_eq!(coordinator.current_phase(), InitPhase::Complete);

        let events = listener.events.lock().expect("poisoned").clone();
        let mut expected = Vec::new();
        for phase in InitPhase::SEQUENCE {
            expected.push(format!("start:{phase}"));
            expected.push(format!("done:{phase}"));
        }
        expected.push("complete".to_string());
        assert_eq!(events, expected);
    }

    #[test]
    fn concurrent_second_call_is_rejected() {
        let coordinator = coordinator();
        let (gate_tx, gate_rx) = bounded::<()>(1);
        let gate = Mutex::new(gate_rx);
        coordinator.set_phase_action(InitPhase::DatabaseInit, move || {
            let _ = gate.lock().expect("poisoned").recv();
            Ok(())
        });

        let first = coordinator.initialize_all();
        // The worker is blocked inside DATABASE_INIT; the second request
        // must observe a pre-failed handle.
        let second = coordinator.initialize_all();
        assert!(matches!(
            second.wait_result(),
            Err(InitError::AlreadyRunning)
        ));

        gate_tx.send(()).expect("gate send failed");
        assert!(first.wait());
    }

    #[test]
    fn failure_aborts_and_reports_the_phase() {
        let coordinator = coordinator();
        let listener = Arc::new(Recording::default());
        coordinator.add_listener(listener.clone());
        coordinator.set_phase_action(InitPhase::AiModelLoading, || {
            Err("catalog exploded".to_string())
        });

        let result = coordinator.initialize_all().wait_result();
        assert!(matches!(
            result,
            Err(InitError::PhaseFailed {
                phase: InitPhase::AiModelLoading,
                ..
            })
        ));
        assert!(!coordinator.is_initialized());

        let events = listener.events.lock().expect("poisoned").clone();
        assert!(events.contains(&"failed:ai_model_loading:catalog exploded".to_string()));
        // Nothing after the failing phase ever started.
        assert!(!events.iter().any(|e| e.starts_with("start:communication")));
    }

    #[test]
    fn a_fresh_call_restarts_from_the_first_phase() {
        let coordinator = coordinator();
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();
        coordinator.set_phase_action(InitPhase::ResourceManagers, move || {
            // Fail the first run only.
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err("first run fails".to_string())
            } else {
                Ok(())
            }
        });

        let db_runs = Arc::new(AtomicUsize::new(0));
        let db_counter = db_runs.clone();
        coordinator.set_phase_action(InitPhase::DatabaseInit, move || {
            db_counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        assert!(!coordinator.initialize_all().wait());
        assert!(coordinator.initialize_all().wait());
        // No resume-from-failure-point: the database phase ran twice.
        assert_eq!(db_runs.load(Ordering::SeqCst), 2);
        assert!(coordinator.is_initialized());
    }

    #[test]
    fn model_loading_phase_drives_the_catalog() {
        let coordinator = coordinator();
        let catalog = Arc::new(ModelCatalog::new(512.0, 50.0, 0.8));
        catalog.register(ModelSpec::new("detector", 100.0, true));
        let phase_catalog = catalog.clone();
        coordinator.set_phase_action(InitPhase::AiModelLoading, move || {
            phase_catalog.load_all(&AccountingLoader);
            Ok(())
        });

        assert!(coordinator.initialize_all().wait());
        assert_eq!(catalog.state_of("detector"), ModelLoadState::Loaded);
    }
}
