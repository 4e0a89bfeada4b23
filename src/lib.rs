pub mod agents;
pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod init;
pub mod pipeline;
pub mod recovery;
pub mod runtime;
pub mod session;
pub mod stack;

pub use config::Configuration;
pub use context::{AppContext, ContextBuilder};
pub use error::AppError;
pub use pipeline::{PipelineOrchestrator, PipelineState};
