use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::agents::{AgentSet, PolicyGradientAgent, RuleBasedAgent, ValueAgent};
use crate::config::Configuration;
use crate::error::AppError;
use crate::init::{AccountingLoader, InitPhase, InitializationCoordinator, ModelCatalog, ModelSpec};
use crate::pipeline::{
    ActionExecutor, CaptureSource, Detector, FusionPolicy, PipelineOrchestrator,
};
use crate::recovery::{RecoveryCoordinator, StackRebuildStrategy};
use crate::session::{JsonSessionStore, SessionStore};
use crate::stack::{
    AdvancedCapability, BuiltinAdvancedCapability, LightweightBackend, PrefsStore, StackManager,
};

/// The explicit composition root: every service is constructed here and
/// handed down, nothing is reached through ambient static state.
pub struct AppContext {
    pub configuration: Configuration,
    pub stack: Arc<StackManager>,
    pub recovery: Arc<RecoveryCoordinator>,
    pub init: Arc<InitializationCoordinator>,
    pub catalog: Arc<ModelCatalog>,
    pub pipeline: Arc<PipelineOrchestrator>,
}

pub struct ContextBuilder {
    configuration: Configuration,
    capture: Option<Arc<dyn CaptureSource>>,
    detector: Option<Arc<dyn Detector>>,
    executor: Option<Arc<dyn ActionExecutor>>,
    session: Option<Arc<dyn SessionStore>>,
    capability: Option<Box<dyn AdvancedCapability>>,
    fusion_seed: Option<u64>,
}

impl ContextBuilder {
    pub fn new(configuration: Configuration) -> Self {
        Self {
            configuration,
            capture: None,
            detector: None,
            executor: None,
            session: None,
            capability: None,
            fusion_seed: None,
        }
    }

    pub fn capture(mut self, capture: Arc<dyn CaptureSource>) -> Self {
        self.capture = Some(capture);
        self
    }

    pub fn detector(mut self, detector: Arc<dyn Detector>) -> Self {
        self.detector = Some(detector);
        self
    }

    pub fn executor(mut self, executor: Arc<dyn ActionExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    // Overrides the default JSON-file session store.
    pub fn session(mut self, session: Arc<dyn SessionStore>) -> Self {
        self.session = Some(session);
        self
    }

    // Overrides the built-in advanced-stack capability.
    pub fn capability(mut self, capability: Box<dyn AdvancedCapability>) -> Self {
        self.capability = Some(capability);
        self
    }

    // Seeds the fusion RNG for reproducible runs.
    pub fn fusion_seed(mut self, seed: u64) -> Self {
        self.fusion_seed = Some(seed);
        self
    }

    pub fn build(self) -> Result<AppContext, AppError> {
        let configuration = self.configuration;
        let capture = self
            .capture
            .ok_or_else(|| AppError::Config("capture source not set".to_string()))?;
        let detector = self
            .detector
            .ok_or_else(|| AppError::Config("detector not set".to_string()))?;
        let executor = self
            .executor
            .ok_or_else(|| AppError::Config("action executor not set".to_string()))?;
        let session: Arc<dyn SessionStore> = self
            .session
            .unwrap_or_else(|| Arc::new(JsonSessionStore::new(configuration.session_dir.clone())));

        let stack = Arc::new(StackManager::new(
            Box::new(LightweightBackend::new()),
            self.capability
                .unwrap_or_else(|| Box::new(BuiltinAdvancedCapability)),
            PrefsStore::new(configuration.prefs_path.clone()),
        ));

        let catalog = Arc::new(ModelCatalog::new(
            configuration.model_memory_budget_mb,
            configuration.model_min_free_mb,
            configuration.model_pressure_ratio,
        ));
        catalog.register(ModelSpec::new("object_detector", 120.0, true));
        catalog.register(ModelSpec::new("gesture_classifier", 60.0, true));
        // The reinforcement-learning models go first in an emergency degrade.
        catalog.register(ModelSpec::new("dqn_value", 80.0, false));
        catalog.register(ModelSpec::new("ppo_policy", 80.0, false));

        let init = Arc::new(InitializationCoordinator::new());
        let phase_catalog = catalog.clone();
        init.set_phase_action(InitPhase::AiModelLoading, move || {
            phase_catalog.load_all(&AccountingLoader);
            Ok(())
        });

        let recovery = Arc::new(RecoveryCoordinator::with_policy(
            configuration.recovery_max_attempts,
            Duration::from_secs(configuration.recovery_cooldown_secs),
        ));
        recovery.register_strategy(
            "decision_stack",
            Box::new(StackRebuildStrategy::new(stack.clone())),
        );
        let recovery_catalog = catalog.clone();
        recovery.register_strategy(
            "model_catalog",
            Box::new(crate::recovery::FnStrategy(move |_: &str| {
                recovery_catalog.load_all(&AccountingLoader);
                Ok(())
            })),
        );

        let agents = AgentSet {
            value_based: Arc::new(ValueAgent::new()),
            policy_gradient: Arc::new(PolicyGradientAgent::new(
                configuration.policy_path.clone(),
            )),
            rule_based: Arc::new(RuleBasedAgent::new()),
        };

        let fusion = match self.fusion_seed {
            Some(seed) => FusionPolicy::with_seed(seed),
            None => FusionPolicy::new(),
        };

        let pipeline = Arc::new(PipelineOrchestrator::new(
            &configuration,
            capture,
            detector,
            executor,
            session,
            agents,
            fusion,
        ));

        info!("application context composed");
        Ok(AppContext {
            configuration,
            stack,
            recovery,
            init,
            catalog,
            pipeline,
        })
    }
}
