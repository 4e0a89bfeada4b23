pub mod coordinator;
pub mod strategy;

pub use coordinator::{RecoveryCoordinator, RecoveryRecord};
pub use strategy::{FnStrategy, RecoveryStrategy, StackRebuildStrategy};
