//! Execution-Path Registry
//!
//! Associates scope stacks with the execution path that owns them. Each OS
//! thread carries its own registry in a thread-local slot, so a stack is
//! never shared for writing between threads: a freshly spawned thread starts
//! with no active frames for any context, by design. Cooperative tasks get
//! their own registry state through [`Snapshot`] and the `task` module, which
//! swaps a captured state in around every poll.
//!
//! Context identity is by handle, never by value: each declared handle is
//! assigned a [`ContextId`] from a process-wide counter on first use.

use crate::frame::{Frame, ScopeStack};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{error, trace};

/// Identity of one declared context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(u64);

impl ContextId {
    /// Allocate the next context identity.
    pub(crate) fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        ContextId(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx#{}", self.0)
    }
}

/// Identity of one execution path (a thread, or a task running under a
/// snapshot scope). Scope guards remember the path that pushed their frame
/// so a guard transported elsewhere can never pop a stranger's stacks.
fn next_path_id() -> u64 {
    static COUNTER: AtomicU64 = AtomicU64::new(1);
    COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// All scope stacks owned by one execution path.
#[derive(Debug, Clone)]
pub(crate) struct PathState {
    path: u64,
    stacks: HashMap<ContextId, ScopeStack>,
}

impl Default for PathState {
    fn default() -> Self {
        PathState {
            path: next_path_id(),
            stacks: HashMap::new(),
        }
    }
}

impl PathState {
    /// Give this state its own path identity. Called when a snapshot copy
    /// becomes a task's state: the copy is a new execution path, not the
    /// capturing one.
    pub(crate) fn fork(&mut self) {
        self.path = next_path_id();
    }

    fn push(&mut self, id: ContextId, frame: Frame) {
        self.stacks.entry(id).or_default().push(frame);
    }

    fn pop(&mut self, id: ContextId) -> Option<Frame> {
        let stack = self.stacks.get_mut(&id)?;
        let frame = stack.pop();
        // Prune: an empty stack must be indistinguishable from no stack.
        if stack.is_empty() {
            self.stacks.remove(&id);
        }
        frame
    }

    /// Pop until the stack for `id` is at `target` depth. Returns how many
    /// frames came off.
    fn truncate(&mut self, id: ContextId, target: usize) -> usize {
        let mut popped = 0;
        while self.depth(id) > target {
            self.pop(id);
            popped += 1;
        }
        popped
    }

    fn top(&self, id: ContextId) -> Option<Frame> {
        self.stacks.get(&id).and_then(ScopeStack::top).cloned()
    }

    fn depth(&self, id: ContextId) -> usize {
        self.stacks.get(&id).map_or(0, ScopeStack::depth)
    }
}

thread_local! {
    static REGISTRY: RefCell<PathState> = RefCell::new(PathState::default());
}

/// Append a frame to the current execution path's stack for `id`. Returns
/// the owning path identity and the post-push depth, which the scope guard
/// presents back at exit time.
pub(crate) fn push(id: ContextId, name: &'static str, frame: Frame) -> (u64, usize) {
    REGISTRY.with(|registry| {
        let mut state = registry.borrow_mut();
        state.push(id, frame);
        let depth = state.depth(id);
        trace!(context = name, %id, depth, "entered scope");
        (state.path, depth)
    })
}

/// Exit a scope entered at depth `target + 1` on execution path `path`.
///
/// The well-ordered case pops exactly one frame. A guard dropped out of
/// LIFO order closes every scope nested inside its region as well (the
/// region ends when its guard dies), and the violation is surfaced loudly.
/// A guard dropped on a foreign execution path touches nothing: the
/// originating path's scope stays open, which is the misuse it reports.
pub(crate) fn exit_to(id: ContextId, name: &'static str, path: u64, target: usize) {
    REGISTRY.with(|registry| {
        let mut state = registry.borrow_mut();
        if state.path != path {
            error!(
                context = name,
                %id,
                owner = path,
                current = state.path,
                "scope guard dropped on a foreign execution path; pop skipped"
            );
            return;
        }
        let before = state.depth(id);
        let popped = state.truncate(id, target);
        if before == target + 1 && popped == 1 {
            trace!(context = name, %id, depth = target, "exited scope");
        } else {
            error!(
                context = name,
                %id,
                expected = target + 1,
                actual = before,
                forced = popped.saturating_sub(1),
                "scope guard dropped out of LIFO order"
            );
        }
    });
}

/// The innermost active frame for `id` on the current execution path, if any.
pub(crate) fn current_frame(id: ContextId) -> Option<Frame> {
    REGISTRY.with(|registry| registry.borrow().top(id))
}

/// Current nesting depth for `id` on this execution path.
pub(crate) fn depth(id: ContextId) -> usize {
    REGISTRY.with(|registry| registry.borrow().depth(id))
}

/// Replace the current path's state, returning a guard that restores the
/// previous state on drop. Used by the task scoping machinery.
pub(crate) fn swap_in(state: PathState) -> SwapGuard {
    let prev = REGISTRY.with(|registry| std::mem::replace(&mut *registry.borrow_mut(), state));
    SwapGuard { prev: Some(prev) }
}

pub(crate) struct SwapGuard {
    prev: Option<PathState>,
}

impl SwapGuard {
    /// Take the installed state back out and restore the previous one.
    pub(crate) fn swap_out(mut self) -> PathState {
        let prev = self.prev.take().unwrap_or_default();
        REGISTRY.with(|registry| std::mem::replace(&mut *registry.borrow_mut(), prev))
    }
}

impl Drop for SwapGuard {
    fn drop(&mut self) {
        // Unwind path: restore the previous state, discarding the installed
        // one so a panicking task cannot leak frames onto its worker thread.
        if let Some(prev) = self.prev.take() {
            REGISTRY.with(|registry| {
                *registry.borrow_mut() = prev;
            });
        }
    }
}

/// A copy of the capturing execution path's stacks, for explicit propagation
/// into cooperatively scheduled tasks.
///
/// The snapshot is taken at capture time: scope changes made afterwards by
/// the capturing code or by siblings never affect lookups made under the
/// snapshot. See the `task` module for running futures inside one.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    state: PathState,
}

impl Snapshot {
    /// Capture every active stack of the calling execution path.
    pub fn capture() -> Self {
        Snapshot {
            state: REGISTRY.with(|registry| registry.borrow().clone()),
        }
    }

    /// An empty snapshot: running under it behaves like a fresh thread.
    pub fn empty() -> Self {
        Snapshot::default()
    }

    /// Turn the snapshot into installable state. The copy becomes its own
    /// execution path, distinct from the one that captured it.
    pub(crate) fn into_state(mut self) -> PathState {
        self.state.fork();
        self.state
    }
}
