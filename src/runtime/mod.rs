pub mod lease;
pub mod pool;

pub use lease::{LeaseGuard, ResourceLease};
pub use pool::WorkerPool;
