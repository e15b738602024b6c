//! Dynascope: Dynamically Scoped Context Values
//!
//! Named context values that are implicitly visible to all code called
//! within a lexical region and revert automatically when the region exits.
//! Use it for cross-cutting concerns (log level, request metadata, feature
//! flags, theme parameters) that must be readable deep in a call chain
//! without threading parameters through every signature and without global
//! mutable state leaking across threads.
//!
//! ```
//! use dynascope::{ContextHandle, MapContext, Overrides};
//! use serde_json::json;
//!
//! static REQUEST: MapContext = MapContext::new("request");
//!
//! fn deep_in_the_call_chain() -> String {
//!     REQUEST.get("trace_id").map_or_else(|_| "-".into(), |v| v.to_string())
//! }
//!
//! let scope = REQUEST.enter(Overrides::new().set("trace_id", "abc")).unwrap();
//! assert_eq!(deep_in_the_call_chain(), json!("abc").to_string());
//! drop(scope);
//! assert_eq!(deep_in_the_call_chain(), "-");
//! ```
//!
//! # How it works
//!
//! Each declared context owns one stack of immutable frames per execution
//! path. Entering a scope merges overrides onto the current frame with a
//! structural update (`__`-delimited paths address nested containers, a
//! tombstone removes entries) and pushes the result; the returned guard pops
//! it on every exit path, including unwinding. Reads resolve to the
//! innermost active frame on the reader's own execution path.
//!
//! Threads are isolated: a freshly spawned thread sees no frames until it
//! enters scopes of its own. Cooperative tasks inherit by explicit snapshot:
//! capture a [`Snapshot`] where the task group is created and wrap each task
//! with [`Snapshot::scope`].

pub mod error;
pub mod frame;
pub mod handle;
pub mod logging;
pub mod registry;
pub mod task;
pub mod txn;
pub mod update;

pub use error::{ContextError, PathError};
pub use frame::Frame;
pub use handle::{ContextHandle, MapContext, ScopeGuard, TypedContext, Wrapped};
pub use registry::{ContextId, Snapshot};
pub use task::{FutureScopeExt, Scoped};
pub use txn::{Checkout, DEFAULT_LOCK_TIMEOUT};
pub use update::{apply, Override, Overrides, PATH_DELIMITER};
