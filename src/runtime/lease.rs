use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Compare-and-set guard for an exclusive hardware resource (camera,
/// projection surface). At most one leaseholder at a time; a second
/// requester is rejected, not queued.
#[derive(Clone)]
pub struct ResourceLease {
    name: &'static str,
    in_use: Arc<AtomicBool>,
}

impl ResourceLease {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            in_use: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn acquire(&self) -> Option<LeaseGuard> {
        if self
            .in_use
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            debug!("lease '{}' acquired", self.name);
            Some(LeaseGuard {
                name: self.name,
                in_use: self.in_use.clone(),
            })
        } else {
            debug!("lease '{}' rejected, already held", self.name);
            None
        }
    }

    pub fn is_held(&self) -> bool {
        self.in_use.load(Ordering::Acquire)
    }
}

pub struct LeaseGuard {
    name: &'static str,
    in_use: Arc<AtomicBool>,
}

impl Drop for LeaseGuard {
    fn drop(&mut self) {
        self.in_use.store(false, Ordering::Release);
        debug!("lease '{}' released", self.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_requester_is_rejected() {
        let lease = ResourceLease::new("camera");
        let guard = lease.acquire().expect("first acquire failed");
        assert!(lease.acquire().is_none());
        drop(guard);
        assert!(lease.acquire().is_some());
    }
}
