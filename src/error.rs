use thiserror::Error;

use crate::init::InitPhase;

// Main application error type

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Pipeline Error: {0}")]
    Pipeline(#[from] PipelineError),
    #[error("Recovery Error: {0}")]
    Recovery(#[from] RecoveryError),
    #[error("Initialization Error: {0}")]
    Init(#[from] InitError),
    #[error("Stack Error: {0}")]
    Stack(#[from] StackError),
    #[error("Configuration Error: {0}")]
    Config(String),
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("The pipeline is already running.")]
    AlreadyRunning,
    #[error("Readiness check failed: {0}")]
    NotReady(String),
    #[error("Capture failed: {0}")]
    Capture(String),
    #[error("Detection failed: {0}")]
    Detection(String),
    #[error("Agent '{0}' failed to propose: {1}")]
    Agent(&'static str, String),
    #[error("Execution failed: {0}")]
    Execution(String),
    #[error("Worker pool error: {0}")]
    Pool(#[from] PoolError),
    #[error("Session store error: {0}")]
    Session(String),
}

#[derive(Error, Debug)]
pub enum PoolError {
    #[error("Failed to spawn worker thread '{0}': {1}")]
    Spawn(String, std::io::Error),
    #[error("Queue for pool '{0}' is full.")]
    QueueFull(&'static str),
    #[error("Pool '{0}' is shut down.")]
    ShutDown(&'static str),
}

#[derive(Error, Debug)]
pub enum RecoveryError {
    #[error("Another recovery is already in progress.")]
    InProgress,
    #[error("Component '{0}' exhausted its recovery budget.")]
    BudgetExhausted(String),
    #[error("Component '{0}' is still in cooldown.")]
    Cooldown(String),
    #[error("No recovery strategy registered for component '{0}'.")]
    NoStrategy(String),
    #[error("Recovery of '{0}' failed: {1}")]
    StrategyFailed(String, String),
}

#[derive(Error, Debug)]
pub enum InitError {
    #[error("Initialization is already in progress.")]
    AlreadyRunning,
    #[error("Phase {phase:?} failed: {message}")]
    PhaseFailed { phase: InitPhase, message: String },
    #[error("Model '{0}' could not be loaded: {1}")]
    ModelLoad(String, String),
    #[error("Out of memory while loading model '{0}'.")]
    OutOfMemory(String),
}

#[derive(Error, Debug)]
pub enum StackError {
    #[error("Advanced component '{0}' failed to initialize.")]
    ComponentInit(&'static str),
    #[error("The advanced stack is not available on this build.")]
    Unavailable,
    #[error("Failed to persist stack preferences: {0}")]
    Prefs(String),
}
