//! Scope Frames
//!
//! Immutable snapshots of a context's value at one nesting depth, and the
//! per-(context, execution-path) stacks they live on. A frame is never
//! mutated after creation; scope entry always builds a new frame from the
//! previous one plus overrides.

use serde_json::Value;
use std::sync::Arc;

/// One immutable context snapshot.
///
/// Cloning a frame is cheap: the payload is shared behind an `Arc`, which is
/// safe because frames are read-only for their whole lifetime.
#[derive(Debug, Clone)]
pub struct Frame {
    value: Arc<Value>,
}

impl Frame {
    pub fn new(value: Value) -> Self {
        Frame {
            value: Arc::new(value),
        }
    }

    /// Borrow the frame payload.
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Copy the payload out for use as a merge base.
    pub fn to_value(&self) -> Value {
        (*self.value).clone()
    }
}

/// Ordered frames for one context on one execution path, innermost at the
/// tail. Non-empty while any scope is active; the registry prunes the stack
/// as soon as the last frame is popped.
#[derive(Debug, Clone, Default)]
pub struct ScopeStack {
    frames: Vec<Frame>,
}

impl ScopeStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, frame: Frame) {
        self.frames.push(frame);
    }

    pub fn pop(&mut self) -> Option<Frame> {
        self.frames.pop()
    }

    /// The innermost (currently visible) frame.
    pub fn top(&self) -> Option<&Frame> {
        self.frames.last()
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}
