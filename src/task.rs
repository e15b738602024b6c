//! Cooperative-Task Scoping
//!
//! Futures do not run on a fixed thread, so thread-local stacks alone cannot
//! carry context across suspension points. [`Scoped`] fixes that: it owns a
//! private registry state, seeded from a [`Snapshot`] captured where the task
//! was created, and swaps it in around every poll. Lookups inside the future
//! therefore resolve against the lexical scope of the code that created it,
//! not against whatever scope happens to be active on the worker thread.
//!
//! Frames entered inside the future persist across suspension (they live in
//! the future's own state) and are invisible to the worker thread and to
//! sibling tasks, even siblings built from the same snapshot.

use crate::registry::{self, PathState, Snapshot};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

impl Snapshot {
    /// Run `future` with this snapshot's stacks installed for every poll.
    ///
    /// Structured-group semantics: capture the snapshot where the group is
    /// created, then wrap each task's future. Every task then resolves
    /// lookups against the group's lexical scope as of capture time.
    pub fn scope<F: Future>(self, future: F) -> Scoped<F> {
        Scoped {
            inner: Some(Box::pin(future)),
            state: Some(self.into_state()),
        }
    }
}

/// Extension for running a future under the scope active at the call site.
pub trait FutureScopeExt: Future + Sized {
    /// Shorthand for `Snapshot::capture().scope(self)`.
    fn in_current_scope(self) -> Scoped<Self> {
        Snapshot::capture().scope(self)
    }
}

impl<F: Future> FutureScopeExt for F {}

/// A future executing inside a captured context scope. See [`Snapshot::scope`].
pub struct Scoped<F> {
    inner: Option<Pin<Box<F>>>,
    state: Option<PathState>,
}

impl<F: Future> Future for Scoped<F> {
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let state = this.state.take().unwrap_or_default();
        // Swap our state in for the duration of the poll; the guard restores
        // the worker thread's own state even if the inner poll panics.
        let guard = registry::swap_in(state);
        let poll = match this.inner.as_mut() {
            Some(inner) => inner.as_mut().poll(cx),
            // The inner future only disappears in drop.
            None => Poll::Pending,
        };
        this.state = Some(guard.swap_out());
        poll
    }
}

impl<F> Drop for Scoped<F> {
    fn drop(&mut self) {
        // Cancellation can drop us on any worker thread. Drop the inner
        // future under the task's own state so scope guards it still holds
        // pop the task's stacks, never the worker thread's.
        let state = self.state.take().unwrap_or_default();
        let guard = registry::swap_in(state);
        self.inner = None;
        let _ = guard.swap_out();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::{ContextHandle, MapContext};
    use crate::update::Overrides;
    use serde_json::json;
    use std::task::Waker;

    fn poll_once<F: Future>(scoped: &mut Scoped<F>) -> Poll<F::Output> {
        let mut cx = Context::from_waker(Waker::noop());
        Pin::new(scoped).poll(&mut cx)
    }

    #[test]
    fn test_scoped_future_sees_snapshot_not_thread() {
        static CTX: MapContext = MapContext::new("task_ctx");

        let scope = CTX.enter(Overrides::new().set("a", 1)).unwrap();
        let snapshot = Snapshot::capture();
        drop(scope);

        // The thread has left the scope, but the snapshot still carries it.
        let mut scoped = snapshot.scope(async { CTX.get("a").map(|v| v == json!(1)) });
        match poll_once(&mut scoped) {
            Poll::Ready(result) => assert!(result.unwrap()),
            Poll::Pending => panic!("ready future reported pending"),
        }

        // Nothing leaked onto the polling thread.
        assert!(CTX.get("a").unwrap_err().is_key_not_found());
    }

    #[test]
    fn test_empty_snapshot_behaves_like_fresh_thread() {
        static CTX: MapContext = MapContext::new("task_ctx_empty");

        let _scope = CTX.enter(Overrides::new().set("a", 1)).unwrap();
        let mut scoped = Snapshot::empty().scope(async { CTX.get("a") });
        match poll_once(&mut scoped) {
            Poll::Ready(result) => assert!(result.unwrap_err().is_key_not_found()),
            Poll::Pending => panic!("ready future reported pending"),
        }
    }
}
