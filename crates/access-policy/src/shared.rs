use std::sync::Arc;

use parking_lot::RwLock;

use crate::evaluator::PolicyEngine;

/// Cloneable handle to the currently active [`PolicyEngine`].
///
/// Readers take an `Arc` snapshot and evaluate against it without holding
/// the lock; [`replace`](Self::replace) swaps the whole engine at once, so an
/// in-flight request never observes a half-applied policy.
#[derive(Clone, Debug)]
pub struct SharedEngine {
    inner: Arc<RwLock<Arc<PolicyEngine>>>,
}

impl SharedEngine {
    pub fn new(engine: PolicyEngine) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(engine))),
        }
    }

    /// The engine in effect right now.
    pub fn current(&self) -> Arc<PolicyEngine> {
        self.inner.read().clone()
    }

    /// Install `engine`, returning the one it replaced.
    pub fn replace(&self, engine: PolicyEngine) -> Arc<PolicyEngine> {
        std::mem::replace(&mut *self.inner.write(), Arc::new(engine))
    }
}

impl From<PolicyEngine> for SharedEngine {
    fn from(engine: PolicyEngine) -> Self {
        Self::new(engine)
    }
}
