//! # Identified Values
//!
//! Nodes of the value graph. A [`Value`] is either strict (content known up
//! front) or lazy (a deferred call, see [`LazyValue`]). Every value exposes
//! its identity without forcing evaluation.
//!
//! ```text
//!            ┌──────────── Value ────────────┐
//!            │                               │
//!      StrictValue                       LazyValue
//!   content + hosh(content)    function + deps + ResultSlot + caches
//!                              hosh = (Π deps · f)[i:n]
//! ```

mod lazy;
mod strict;

pub use lazy::{LazyValue, ResultSlot};
pub use strict::StrictValue;

use std::fmt;
use std::sync::Arc;

use crate::cache::CacheChain;
use crate::content::Content;
use crate::hosh::Hosh;
use crate::HoshmapResult;

/// A node of the value graph.
///
/// Cloning is cheap: clones share the node, including its memoized result.
#[derive(Clone)]
pub enum Value {
    Strict(Arc<StrictValue>),
    Lazy(Arc<LazyValue>),
}

impl Value {
    /// Wraps known content.
    pub fn strict(content: impl Into<Content>) -> Self {
        Value::Strict(Arc::new(StrictValue::new(content.into())))
    }

    /// Wraps known content under a predefined identity.
    pub fn strict_with_hosh(content: impl Into<Content>, hosh: Hosh) -> Self {
        Value::Strict(Arc::new(StrictValue::with_hosh(content.into(), hosh)))
    }

    /// Wraps a lazy node.
    pub fn lazy(lazy: LazyValue) -> Self {
        Value::Lazy(Arc::new(lazy))
    }

    /// Structural identity. Never forces evaluation.
    pub fn hosh(&self) -> Hosh {
        match self {
            Value::Strict(v) => v.hosh(),
            Value::Lazy(v) => v.hosh(),
        }
    }

    /// Textual identity.
    pub fn id(&self) -> String {
        self.hosh().id()
    }

    /// Whether the content is available without computing anything.
    pub fn is_evaluated(&self) -> bool {
        match self {
            Value::Strict(_) => true,
            Value::Lazy(v) => v.is_evaluated(),
        }
    }

    /// The content, evaluating a lazy node on first access.
    pub fn value(&self) -> HoshmapResult<Content> {
        match self {
            Value::Strict(v) => Ok(v.content().clone()),
            Value::Lazy(v) => v.value(),
        }
    }

    /// Forces evaluation, discarding the content.
    pub fn evaluate(&self) -> HoshmapResult<()> {
        self.value().map(|_| ())
    }

    /// The content if already available.
    pub fn peek(&self) -> Option<Content> {
        match self {
            Value::Strict(v) => Some(v.content().clone()),
            Value::Lazy(v) => v.peek(),
        }
    }

    /// Returns a value backed by the given cache tiers.
    ///
    /// Strict values have nothing to defer and are returned as they are.
    pub fn with_caches(&self, caches: &CacheChain) -> Self {
        match self {
            Value::Strict(_) => self.clone(),
            Value::Lazy(v) => Value::lazy(v.with_caches(caches)),
        }
    }

    pub fn as_lazy(&self) -> Option<&LazyValue> {
        match self {
            Value::Lazy(v) => Some(v),
            Value::Strict(_) => None,
        }
    }
}

impl From<LazyValue> for Value {
    fn from(lazy: LazyValue) -> Self {
        Value::lazy(lazy)
    }
}

impl From<StrictValue> for Value {
    fn from(strict: StrictValue) -> Self {
        Value::Strict(Arc::new(strict))
    }
}

/// Two values are the same iff they denote the same content or computation.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.hosh() == other.hosh()
    }
}

impl Eq for Value {}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Strict(v) => write!(f, "{}", v.content()),
            Value::Lazy(v) => write!(f, "{}", v),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Strict(v) => write!(f, "Strict({}, {:?})", v.content(), v.hosh()),
            Value::Lazy(v) => write!(f, "Lazy({}, {:?})", v, v.hosh()),
        }
    }
}
