//! Transactional Checkout
//!
//! Explicit read-modify-push mutation for record-flavored contexts. Instead
//! of intercepting in-place mutation, callers check the current value out,
//! mutate the copy, and commit it back as a new frame:
//!
//! ```
//! use dynascope::{ContextHandle, Overrides, TypedContext};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Clone, Default, Serialize, Deserialize)]
//! struct Counters {
//!     requests: u64,
//! }
//!
//! static COUNTERS: TypedContext<Counters> = TypedContext::new("counters");
//!
//! let mut checkout = COUNTERS.checkout().unwrap();
//! checkout.value_mut().requests += 1;
//! let scope = checkout.commit().unwrap();
//! assert_eq!(COUNTERS.current().requests, 1);
//! drop(scope);
//! ```
//!
//! Each checkout holds a per-handle reentrant lock so concurrent
//! read-modify-push sequences against the same handle cannot interleave.
//! The wait is bounded: `LockTimeout` surfaces instead of a deadlock.

use crate::error::ContextError;
use crate::frame::Frame;
use crate::handle::{ContextHandle, ScopeGuard, TypedContext};
use crate::registry;
use parking_lot::ReentrantMutexGuard;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

/// Default bounded wait for the mutation lock.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(1);

/// A checked-out context value, held under the handle's mutation lock.
///
/// Dropping a checkout without committing abandons the mutation; nothing is
/// pushed and the lock is released.
pub struct Checkout<'a, T> {
    ctx: &'a TypedContext<T>,
    value: T,
    _lock: ReentrantMutexGuard<'a, ()>,
}

impl<T> TypedContext<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    /// Check out the current value for mutation, waiting up to
    /// [`DEFAULT_LOCK_TIMEOUT`] for the mutation lock.
    pub fn checkout(&self) -> Result<Checkout<'_, T>, ContextError> {
        self.checkout_timeout(DEFAULT_LOCK_TIMEOUT)
    }

    /// Check out the current value, waiting up to `timeout` for the lock.
    ///
    /// The lock is reentrant: nested checkouts on the same thread succeed.
    /// Fails with `LockTimeout` when another thread holds a checkout for
    /// longer than the bounded wait.
    pub fn checkout_timeout(&self, timeout: Duration) -> Result<Checkout<'_, T>, ContextError> {
        let lock = self
            .mutation_lock()
            .try_lock_for(timeout)
            .ok_or(ContextError::LockTimeout {
                context: self.name(),
            })?;
        let value = self.try_current()?;
        Ok(Checkout {
            ctx: self,
            value,
            _lock: lock,
        })
    }
}

impl<T> Checkout<'_, T>
where
    T: Serialize + DeserializeOwned + Default,
{
    /// The checked-out value.
    pub fn value(&self) -> &T {
        &self.value
    }

    /// Mutable access to the checked-out value. Changes stay private until
    /// [`commit`](Self::commit).
    pub fn value_mut(&mut self) -> &mut T {
        &mut self.value
    }

    /// Push the mutated value as a new frame, releasing the lock.
    ///
    /// Returns the scope guard for the pushed frame; the mutation is visible
    /// until the guard drops, restoring the previous value exactly.
    pub fn commit(self) -> Result<ScopeGuard, ContextError> {
        let structured = self.ctx.to_structured(&self.value)?;
        let (path, depth) = registry::push(self.ctx.id(), self.ctx.name(), Frame::new(structured));
        Ok(ScopeGuard::new(self.ctx.id(), self.ctx.name(), path, depth))
    }
}
