use indexmap::IndexMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tracing::{info, warn};

/// Explicit load-outcome set. `Fallback` is a loaded-but-degraded model
/// (CPU path, or rebuilt in reduced form after an emergency degrade).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelLoadState {
    NotLoaded,
    Loading,
    Loaded,
    Fallback,
    Failed,
}

impl ModelLoadState {
    fn occupies_memory(self) -> bool {
        matches!(self, ModelLoadState::Loaded | ModelLoadState::Fallback)
    }
}

#[derive(Debug, Clone)]
pub struct ModelSpec {
    pub name: String,
    pub size_mb: f64,
    /// Non-essential models (the reinforcement-learning ones) are the first
    /// to go in an emergency degrade.
    pub essential: bool,
}

impl ModelSpec {
    pub fn new(name: impl Into<String>, size_mb: f64, essential: bool) -> Self {
        Self {
            name: name.into(),
            size_mb,
            essential,
        }
    }
}

#[derive(Debug)]
pub enum LoadFailure {
    OutOfMemory,
    GpuUnavailable,
    Other(String),
}

/// The actual load is a collaborator so tests can raise out-of-memory and
/// GPU-unavailable conditions on demand.
pub trait ModelLoader: Send + Sync {
    fn load(&self, spec: &ModelSpec) -> Result<(), LoadFailure>;
}

/// Production loader: accounting-only, the weights live with the detector
/// and agent collaborators.
pub struct AccountingLoader;

impl ModelLoader for AccountingLoader {
    fn load(&self, _spec: &ModelSpec) -> Result<(), LoadFailure> {
        Ok(())
    }
}

struct ModelEntry {
    spec: ModelSpec,
    state: ModelLoadState,
}

/// Memory-aware model bookkeeping for the AI_MODEL_LOADING phase.
pub struct ModelCatalog {
    budget_mb: f64,
    min_free_mb: f64,
    pressure_ratio: f64,
    entries: Mutex<IndexMap<String, ModelEntry>>,
    reclaim_hints: AtomicU64,
}

impl ModelCatalog {
    pub fn new(budget_mb: f64, min_free_mb: f64, pressure_ratio: f64) -> Self {
        Self {
            budget_mb,
            min_free_mb,
            pressure_ratio,
            entries: Mutex::new(IndexMap::new()),
            reclaim_hints: AtomicU64::new(0),
        }
    }

    pub fn register(&self, spec: ModelSpec) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(
            spec.name.clone(),
            ModelEntry {
                spec,
                state: ModelLoadState::NotLoaded,
            },
        );
    }

    /// Load every registered model in registration order. A model whose
    /// load fails is skipped, never the whole phase; an out-of-memory
    /// condition triggers the emergency degrade path instead of
    /// propagating.
    pub fn load_all(&self, loader: &dyn ModelLoader) {
        let names: Vec<String> = {
            let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
            entries.keys().cloned().collect()
        };

        for name in names {
            self.load_one(&name, loader);

            if self.usage_ratio() > self.pressure_ratio {
                self.request_reclaim_hint();
            }
        }
    }

    fn load_one(&self, name: &str, loader: &dyn ModelLoader) {
        let spec = {
            let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
            // Heap-margin check: loading must leave at least the configured
            // margin free, otherwise this model is skipped and the phase
            // stays alive.
            let available = self.budget_mb - Self::used_mb(&entries);
            let Some(entry) = entries.get_mut(name) else {
                return;
            };
            if available - entry.spec.size_mb < self.min_free_mb {
                warn!(
                    "skipping model '{}': {:.0}MB available, margin {:.0}MB required",
                    name, available, self.min_free_mb
                );
                entry.state = ModelLoadState::Failed;
                return;
            }
            entry.state = ModelLoadState::Loading;
            entry.spec.clone()
        };

        match loader.load(&spec) {
            Ok(()) => self.set_state(name, ModelLoadState::Loaded),
            Err(LoadFailure::GpuUnavailable) => {
                info!("model '{name}' loaded on the CPU fallback path");
                self.set_state(name, ModelLoadState::Fallback);
            }
            Err(LoadFailure::OutOfMemory) => {
                warn!("out of memory loading '{name}', starting emergency degrade");
                self.emergency_degrade();
                match loader.load(&spec) {
                    Ok(()) => self.set_state(name, ModelLoadState::Loaded),
                    Err(LoadFailure::GpuUnavailable) => {
                        self.set_state(name, ModelLoadState::Fallback)
                    }
                    Err(_) => {
                        warn!("model '{name}' failed even after degrade");
                        self.set_state(name, ModelLoadState::Failed);
                    }
                }
            }
            Err(LoadFailure::Other(message)) => {
                warn!("model '{name}' failed to load: {message}");
                self.set_state(name, ModelLoadState::Failed);
            }
        }
    }

    /// Unload every non-essential model to reclaim memory. Safe to call
    /// when nothing is loaded.
    pub fn emergency_degrade(&self) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        for entry in entries.values_mut() {
            if !entry.spec.essential && entry.state.occupies_memory() {
                info!("emergency degrade: unloading '{}'", entry.spec.name);
                entry.state = ModelLoadState::NotLoaded;
            }
        }
        drop(entries);
        self.request_reclaim_hint();
    }

    pub fn state_of(&self, name: &str) -> ModelLoadState {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .map(|entry| entry.state)
            .unwrap_or(ModelLoadState::NotLoaded)
    }

    pub fn memory_used_mb(&self) -> f64 {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Self::used_mb(&entries)
    }

    pub fn usage_ratio(&self) -> f64 {
        if self.budget_mb <= 0.0 {
            return 1.0;
        }
        self.memory_used_mb() / self.budget_mb
    }

    pub fn reclaim_hints(&self) -> u64 {
        self.reclaim_hints.load(Ordering::Relaxed)
    }

    fn used_mb(entries: &IndexMap<String, ModelEntry>) -> f64 {
        entries
            .values()
            .filter(|entry| entry.state.occupies_memory())
            .map(|entry| entry.spec.size_mb)
            .sum()
    }

    fn set_state(&self, name: &str, state: ModelLoadState) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(entry) = entries.get_mut(name) {
            entry.state = state;
        }
    }

    fn request_reclaim_hint(&self) {
        self.reclaim_hints.fetch_add(1, Ordering::Relaxed);
        info!("memory pressure: reclaim hint requested");
    }
}
