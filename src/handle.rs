//! Context Handles
//!
//! The public surface for declared contexts. Two flavors share one contract:
//!
//! - [`MapContext`]: mapping-flavored, keyed lookups, no declared schema.
//!   Lookups with no active scope fail with `KeyNotFound`.
//! - [`TypedContext`]: record-flavored over any serde struct with `Default`.
//!   Reads with no active scope return the declared defaults.
//!
//! The only sanctioned way to change a context's value is scope entry:
//! [`ContextHandle::enter`] merges overrides onto the current frame and
//! pushes the result, returning a guard whose drop pops the frame on every
//! exit path, including unwinding. Direct assignment is rejected with
//! `ReadOnlyViolation`.

use crate::error::ContextError;
use crate::frame::Frame;
use crate::registry::{self, ContextId};
use crate::update::{self, Overrides};
use parking_lot::ReentrantMutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::marker::PhantomData;
use std::sync::OnceLock;

/// RAII guard for an entered scope. Dropping it exits the scope.
///
/// The guard remembers the execution path and nesting depth of its push and
/// presents both back at exit time, so misuse cannot corrupt a stack:
///
/// - Guards dropped in LIFO order (the normal case: block exit, unwinding)
///   pop exactly their own frame.
/// - A guard dropped while scopes are still nested inside its region closes
///   those nested scopes with it — the region ends when its guard dies —
///   and the ordering violation is reported through `tracing::error!`.
/// - A guard moved to and dropped on a different execution path pops
///   nothing there; the originating path's scope stays open (stuck) until
///   that path ends, and the misuse is reported through `tracing::error!`.
///
/// Guards are `Send` only so task futures that hold one across a suspension
/// point can migrate between worker threads; under `Snapshot::scope` the
/// task carries its execution path with it, so the exit still matches.
#[must_use = "the scope exits as soon as this guard is dropped"]
#[derive(Debug)]
pub struct ScopeGuard {
    id: ContextId,
    name: &'static str,
    path: u64,
    depth: usize,
}

impl ScopeGuard {
    pub(crate) fn new(id: ContextId, name: &'static str, path: u64, depth: usize) -> Self {
        ScopeGuard {
            id,
            name,
            path,
            depth,
        }
    }
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        registry::exit_to(self.id, self.name, self.path, self.depth - 1);
    }
}

/// Shared contract of both context flavors.
pub trait ContextHandle {
    /// Declared name, used in error messages and trace output.
    fn name(&self) -> &'static str;

    /// Merge `overrides` onto the current frame (or the flavor's default
    /// base) and push the result. Errors surface before anything is pushed.
    fn enter(&self, overrides: Overrides) -> Result<ScopeGuard, ContextError>;

    /// Diagnostic accessor: the raw innermost frame, or `None` when no scope
    /// is active on this execution path.
    fn current_frame(&self) -> Option<Frame>;

    /// Run `f` inside a scope entered with `overrides`.
    fn with<R>(&self, overrides: Overrides, f: impl FnOnce() -> R) -> Result<R, ContextError> {
        let _scope = self.enter(overrides)?;
        Ok(f())
    }

    /// Wrap a callable so every invocation runs inside a scope entered with
    /// `overrides`. Wrapping an already-wrapped callable nests scopes: outer
    /// overrides apply first, inner overrides shadow on top.
    fn wrap<F>(&self, overrides: Overrides, inner: F) -> Wrapped<'_, Self, F>
    where
        Self: Sized,
    {
        Wrapped {
            handle: self,
            overrides,
            inner,
        }
    }
}

/// A callable bound to a context scope; see [`ContextHandle::wrap`].
#[derive(Debug)]
pub struct Wrapped<'a, H, F> {
    handle: &'a H,
    overrides: Overrides,
    inner: F,
}

impl<H: ContextHandle, F> Wrapped<'_, H, F> {
    /// Invoke the wrapped callable inside its scope, forwarding `arg` and
    /// the return value unchanged.
    pub fn call<A, R>(&self, arg: A) -> Result<R, ContextError>
    where
        F: Fn(A) -> Result<R, ContextError>,
    {
        let _scope = self.handle.enter(self.overrides.clone())?;
        (self.inner)(arg)
    }
}

/// Mapping-flavored context: string keys, arbitrary values, no schema.
#[derive(Debug)]
pub struct MapContext {
    name: &'static str,
    id: OnceLock<ContextId>,
}

impl MapContext {
    /// Declare a mapping-flavored context. Usable in `static` position.
    pub const fn new(name: &'static str) -> Self {
        MapContext {
            name,
            id: OnceLock::new(),
        }
    }

    fn id(&self) -> ContextId {
        *self.id.get_or_init(ContextId::next)
    }

    /// Look up `key` in the current frame.
    ///
    /// Fails with `KeyNotFound` when no scope is active (mirrors indexing an
    /// empty mapping) or when the key is absent from the active frame.
    pub fn get(&self, key: &str) -> Result<Value, ContextError> {
        let frame = registry::current_frame(self.id()).ok_or_else(|| ContextError::KeyNotFound {
            context: self.name,
            key: key.to_string(),
        })?;
        frame
            .value()
            .get(key)
            .cloned()
            .ok_or_else(|| ContextError::KeyNotFound {
                context: self.name,
                key: key.to_string(),
            })
    }

    /// Direct assignment is always rejected: values change only through
    /// [`ContextHandle::enter`]. This exists so generically driven callers
    /// get the violation surfaced instead of a silently dropped write.
    pub fn assign(&self, key: &str, _value: Value) -> Result<(), ContextError> {
        Err(ContextError::ReadOnlyViolation {
            context: self.name,
            field: key.to_string(),
        })
    }

    /// Current nesting depth on this execution path.
    pub fn depth(&self) -> usize {
        registry::depth(self.id())
    }
}

impl ContextHandle for MapContext {
    fn name(&self) -> &'static str {
        self.name
    }

    fn enter(&self, overrides: Overrides) -> Result<ScopeGuard, ContextError> {
        let base = match registry::current_frame(self.id()) {
            Some(frame) => frame.to_value(),
            None => Value::Object(Map::new()),
        };
        let merged = update::apply(&base, &overrides)?;
        let (path, depth) = registry::push(self.id(), self.name, Frame::new(merged));
        Ok(ScopeGuard::new(self.id(), self.name, path, depth))
    }

    fn current_frame(&self) -> Option<Frame> {
        registry::current_frame(self.id())
    }
}

/// Record-flavored context with a fixed schema and declared defaults.
///
/// `T` supplies the schema: any `Serialize + DeserializeOwned + Default`
/// struct works. Reads with no active scope return `T::default()`; merged
/// frames are validated against the schema at entry time, so a read never
/// observes a value that does not round-trip through `T`.
///
/// ```
/// use dynascope::{ContextHandle, Overrides, TypedContext};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Clone, Default, Serialize, Deserialize)]
/// struct LogSettings {
///     level: Option<String>,
///     verbose: bool,
/// }
///
/// static LOG: TypedContext<LogSettings> = TypedContext::new("log_settings");
///
/// let scope = LOG.enter(Overrides::new().set("verbose", true)).unwrap();
/// assert!(LOG.current().verbose);
/// drop(scope);
/// assert!(!LOG.current().verbose);
/// ```
#[derive(Debug)]
pub struct TypedContext<T> {
    name: &'static str,
    id: OnceLock<ContextId>,
    lock: OnceLock<ReentrantMutex<()>>,
    _schema: PhantomData<fn() -> T>,
}

impl<T> TypedContext<T> {
    /// Declare a record-flavored context. Usable in `static` position.
    pub const fn new(name: &'static str) -> Self {
        TypedContext {
            name,
            id: OnceLock::new(),
            lock: OnceLock::new(),
            _schema: PhantomData,
        }
    }

    pub(crate) fn id(&self) -> ContextId {
        *self.id.get_or_init(ContextId::next)
    }

    /// Reentrant mutation lock for the transactional checkout layer.
    pub(crate) fn mutation_lock(&self) -> &ReentrantMutex<()> {
        self.lock.get_or_init(|| ReentrantMutex::new(()))
    }

    /// Current nesting depth on this execution path.
    pub fn depth(&self) -> usize {
        registry::depth(self.id())
    }
}

impl<T> TypedContext<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    /// The current value: the innermost active frame, or the declared
    /// defaults when no scope is active.
    pub fn current(&self) -> T {
        // Frames are validated against the schema on entry, so the fallback
        // is unreachable for values that went through `enter` or `commit`.
        self.try_current().unwrap_or_default()
    }

    /// Fallible form of [`current`](Self::current), surfacing `TypeMismatch`
    /// if the frame payload does not deserialize into the schema.
    pub fn try_current(&self) -> Result<T, ContextError> {
        match registry::current_frame(self.id()) {
            Some(frame) => {
                serde_json::from_value(frame.to_value()).map_err(|e| ContextError::TypeMismatch {
                    context: self.name,
                    detail: e.to_string(),
                })
            }
            None => Ok(T::default()),
        }
    }

    /// Direct field assignment is always rejected: values change only
    /// through [`ContextHandle::enter`] or a transactional checkout.
    pub fn assign(&self, field: &str, _value: Value) -> Result<(), ContextError> {
        Err(ContextError::ReadOnlyViolation {
            context: self.name,
            field: field.to_string(),
        })
    }

    /// The merge base for scope entry: the current frame, or the declared
    /// defaults serialized to a structured value.
    fn base_value(&self) -> Result<Value, ContextError> {
        match registry::current_frame(self.id()) {
            Some(frame) => Ok(frame.to_value()),
            None => self.to_structured(&T::default()),
        }
    }

    pub(crate) fn to_structured(&self, value: &T) -> Result<Value, ContextError> {
        let structured = serde_json::to_value(value).map_err(|e| ContextError::TypeMismatch {
            context: self.name,
            detail: e.to_string(),
        })?;
        if !structured.is_object() {
            return Err(ContextError::TypeMismatch {
                context: self.name,
                detail: format!(
                    "schema serializes to {}, expected a mapping or record",
                    update::kind(&structured)
                ),
            });
        }
        Ok(structured)
    }
}

impl<T> ContextHandle for TypedContext<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    fn name(&self) -> &'static str {
        self.name
    }

    fn enter(&self, overrides: Overrides) -> Result<ScopeGuard, ContextError> {
        let base = self.base_value()?;
        let merged = update::apply(&base, &overrides)?;
        // Validate against the schema before the push becomes observable.
        let validated: T = serde_json::from_value(merged.clone()).map_err(|e| {
            ContextError::TypeMismatch {
                context: self.name,
                detail: e.to_string(),
            }
        })?;
        // Deserialization ignores unknown keys; an override for a field the
        // schema never surfaces must fail, not ride along invisibly.
        let declared = self.to_structured(&validated)?;
        if let (Some(merged_map), Some(declared_map)) = (merged.as_object(), declared.as_object())
        {
            if let Some(unknown) = merged_map
                .keys()
                .find(|key| !declared_map.contains_key(key.as_str()))
            {
                return Err(ContextError::TypeMismatch {
                    context: self.name,
                    detail: format!("field '{unknown}' is not declared in the schema"),
                });
            }
        }
        let (path, depth) = registry::push(self.id(), self.name, Frame::new(merged));
        Ok(ScopeGuard::new(self.id(), self.name, path, depth))
    }

    fn current_frame(&self) -> Option<Frame> {
        registry::current_frame(self.id())
    }
}
