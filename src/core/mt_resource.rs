use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// A thread-safe, reference-counted handle to a shared value.
///
/// Worlds are shared between the scheduling thread and the structural task
/// workers through this handle. Workers only ever take read guards; the
/// scheduling thread is the only place that takes write guards.
///
/// # Examples
///
/// ```
/// use craft_engine::core::MtResource;
///
/// let counter = MtResource::new(0);
/// let worker_view = counter.clone();
///
/// *counter.get_mut() += 1;
/// assert_eq!(*worker_view.get(), 1);
/// ```
///
/// # Poisoning
/// A panic on a worker while it holds a read guard must not wedge the tick
/// loop, so a poisoned lock is recovered and its inner value handed out as is.
pub struct MtResource<T: Send + Sync> {
    resource: Arc<RwLock<T>>,
}

impl<T: Send + Sync + 'static> MtResource<T> {
    /// Wraps `resource` in a new shared handle.
    pub fn new(resource: T) -> Self {
        Self {
            resource: Arc::new(RwLock::new(resource)),
        }
    }

    /// Returns a read guard over the contained value.
    pub fn get(&self) -> RwLockReadGuard<'_, T> {
        self.resource.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns a write guard over the contained value.
    ///
    /// Blocks until every outstanding read guard held by a worker is released.
    pub fn get_mut(&self) -> RwLockWriteGuard<'_, T> {
        self.resource.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of live handles to the shared value.
    pub fn handle_count(&self) -> usize {
        Arc::strong_count(&self.resource)
    }
}

impl<T: Send + Sync> Clone for MtResource<T> {
    fn clone(&self) -> Self {
        Self {
            resource: self.resource.clone(),
        }
    }
}
