//! Identified Maps
//!
//! An immutable, content-identified mapping in which every value carries a
//! structural identity ([`Hosh`]) derived from its content or from the
//! computation that produces it.
//!
//! # Concepts
//!
//! ## Identified Values
//!
//! A value is either strict (its content is known) or lazy (a deferred call
//! over named dependencies). The identity of a lazy value is derived from the
//! identities of its dependencies and of its function, never from its result,
//! so it is known before anything is computed.
//!
//! ## Map Identity
//!
//! The identity of a map is the commutative combination of
//! `identity(value) * identity(key)` over its fields. Two maps with the same
//! fields have the same `_id` regardless of insertion order.
//!
//! ## Caching
//!
//! Lazy values are evaluated at most once per process. When cache tiers are
//! attached, results are looked up by identity before computing and stored
//! into every tier afterwards. A hit in a later tier is copied into the
//! earlier ones.
//!
//! # Example
//!
//! ```rust,ignore
//! use hoshmap::{Binding, FrozenMap, Function};
//!
//! let square = Function::new("square", |args| {
//!     let x: i64 = args.get_as("x")?;
//!     Ok((x * x).into())
//! });
//!
//! let map = FrozenMap::new([("x", 2)])?;
//! let map = map.bind(&Binding::parse(square, "x->y")?)?;
//!
//! assert!(!map.value("y").unwrap().is_evaluated());
//! assert_eq!(map.get("y")?, 4);
//! ```

pub mod binding;
pub mod cache;
pub mod config;
pub mod content;
pub mod frozen;
pub mod function;
pub mod higherorder;
pub mod hosh;
pub mod map;
pub mod value;

pub use binding::Binding;
pub use cache::{CacheChain, CacheError, CacheStats, CacheTier, DirCache, MemoryCache, SqliteCache, Tier};
pub use config::{CacheConfig, ConfigError};
pub use content::{Content, IntoValue};
pub use frozen::FrozenMap;
pub use function::{Args, Function, Param};
pub use hosh::{Hosh, HoshParseError};
pub use map::{Map, MapLike};
pub use value::{LazyValue, ResultSlot, StrictValue, Value};

use thiserror::Error;

/// Keys starting with this prefix are metadata and stay out of the map identity.
pub const METADATA_PREFIX: char = '_';

/// Reserved key holding the identity of a map.
pub const ID_KEY: &str = "_id";

/// Reserved key holding the identities of the entries of a map.
pub const IDS_KEY: &str = "_ids";

/// Returns true for keys reserved by the map itself.
pub fn is_reserved(key: &str) -> bool {
    key == ID_KEY || key == IDS_KEY
}

/// Returns true for metadata keys (including the reserved ones).
pub fn is_metadata(key: &str) -> bool {
    key.starts_with(METADATA_PREFIX)
}

/// Errors that can occur while building or evaluating identified maps.
#[derive(Debug, Error)]
pub enum HoshmapError {
    #[error("Cannot have a field named '_id'/'_ids': {0}")]
    ReservedKey(String),

    #[error("Wrong result length: {found} differs from {expected}")]
    Arity { expected: usize, found: usize },

    #[error("Unsupported multi-valued result type: {0}")]
    UnsupportedResultType(String),

    #[error("Missing field '{field}' for inputs {inputs:?}")]
    MissingInput { field: String, inputs: Vec<String> },

    #[error("Cannot modify an entry ({0}) of a frozen map")]
    FrozenMutation(String),

    #[error("Cannot compare a map with {0}")]
    TypeMismatch(String),

    #[error("Key not found: {0}")]
    KeyNotFound(String),

    #[error("Invalid binding '{spec}': {reason}")]
    InvalidBinding { spec: String, reason: String },

    #[error("Field '{0}' is not iterable")]
    NotIterable(String),

    #[error("All iterable fields should have the same length: {lengths:?}")]
    IterableLengthMismatch { lengths: Vec<(String, usize)> },

    #[error("Missing argument '{0}'")]
    MissingArgument(String),

    #[error("Invalid argument '{name}': {message}")]
    InvalidArgument { name: String, message: String },

    #[error("Function '{name}' failed: {message}")]
    Function { name: String, message: String },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Identity not cached: {0}")]
    NotCached(String),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Invalid id: {0}")]
    InvalidId(#[from] HoshParseError),
}

impl HoshmapError {
    /// Creates a function failure, for use inside function bodies.
    pub fn function(name: impl Into<String>, message: impl ToString) -> Self {
        HoshmapError::Function {
            name: name.into(),
            message: message.to_string(),
        }
    }
}

/// Result type for map operations.
pub type HoshmapResult<T> = Result<T, HoshmapError>;
