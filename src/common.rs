//! Common definitions that are shared between different parts of the runtime.

// Hashed maps for runtime-internal tables.  GC-visible maps are the `Map`
// object in `value::map`.
pub use hashbrown::HashMap as Map;

/// Interned names used by non-GC tables (e.g. the module loader registry).
pub type Name = internment::Intern<String>;

/// Signal that an exception has been thrown.  The exception object itself
/// travels in reg-0 of the current frame; this marker only carries the fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thrown;

/// Result of an operation that may raise an exception.
pub type VmResult<T = ()> = Result<T, Thrown>;
