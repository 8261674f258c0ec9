//! # Lazy Values
//!
//! A lazy value is output `i` of an `n`-output call of a [`Function`] over
//! named dependencies. It is lazy three times over: computed only when read,
//! computed only once, and looked up in cache tiers before computing.
//!
//! ## Evaluation
//!
//! ```text
//! value()
//!   │  slot already holds output i? ──────────────────────────► return it
//!   ▼
//!   cache tiers attached? ── hit at tier k ── copy into tiers 0..k,
//!   │                                         fill slot[i]    ► return it
//!   ▼
//!   resolve every dependency (may recurse)
//!   invoke the function once
//!   split the result into n outputs
//!   fill every slot of the shared ResultSlot
//!   store (sibling id, output) into every tier
//!   return output i
//! ```
//!
//! All outputs of one call share a [`ResultSlot`]. Its lock is held for the
//! whole evaluation, so concurrent first reads of any sibling run the
//! function once and the others wait for the result.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::{Mutex, MutexGuard};
use tracing::debug;

use super::Value;
use crate::cache::CacheChain;
use crate::content::Content;
use crate::function::{normalize_outputs, Function, Param};
use crate::hosh::Hosh;
use crate::{HoshmapError, HoshmapResult};

/// Results of one function call, shared by all of its outputs.
#[derive(Clone)]
pub struct ResultSlot {
    outputs: Arc<Mutex<Vec<Option<Content>>>>,
}

impl ResultSlot {
    /// Creates an empty slot for `n` outputs.
    pub fn new(n: usize) -> Self {
        Self {
            outputs: Arc::new(Mutex::new(vec![None; n])),
        }
    }

    /// Number of outputs.
    pub fn len(&self) -> usize {
        self.outputs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Output `i`, if it has been produced.
    pub fn get(&self, i: usize) -> Option<Content> {
        self.outputs.lock().get(i).cloned().flatten()
    }

    /// Whether output `i` has been produced.
    pub fn is_set(&self, i: usize) -> bool {
        matches!(self.outputs.lock().get(i), Some(Some(_)))
    }

    /// Whether both handles point to the same slot.
    pub fn same(&self, other: &ResultSlot) -> bool {
        Arc::ptr_eq(&self.outputs, &other.outputs)
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Option<Content>>> {
        self.outputs.lock()
    }

    fn key(&self) -> usize {
        Arc::as_ptr(&self.outputs) as usize
    }
}

/// Whether any lazy node reachable through `deps` shares `results`.
///
/// Such a node would wait on the slot lock held by its own caller.
fn reaches_slot(deps: &IndexMap<Param, Value>, results: &ResultSlot) -> bool {
    let mut visited = HashSet::new();
    let mut pending: Vec<&LazyValue> = deps.values().filter_map(Value::as_lazy).collect();
    while let Some(node) = pending.pop() {
        if node.results.same(results) {
            return true;
        }
        if visited.insert(node.results.key()) {
            pending.extend(node.deps.values().filter_map(Value::as_lazy));
        }
    }
    false
}

impl fmt::Debug for ResultSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let outputs = self.outputs.lock();
        let filled = outputs.iter().filter(|o| o.is_some()).count();
        write!(f, "ResultSlot({}/{})", filled, outputs.len())
    }
}

/// A deferred output of a function call.
#[derive(Clone)]
pub struct LazyValue {
    function: Function,
    index: usize,
    arity: usize,
    deps: Arc<IndexMap<Param, Value>>,
    results: ResultSlot,
    /// Identity of the whole call, before slicing.
    base: Hosh,
    hosh: Hosh,
    caches: CacheChain,
    cacheable: bool,
}

impl LazyValue {
    /// Creates output `index` of an `arity`-output call.
    ///
    /// `results` must be shared by all outputs of the same call and sized for
    /// `arity` outputs. The identity depends only on the dependency
    /// identities and their roles (in order), the function identity, `index`
    /// and `arity`.
    pub fn new(
        function: Function,
        index: usize,
        arity: usize,
        deps: IndexMap<Param, Value>,
        results: ResultSlot,
    ) -> HoshmapResult<Self> {
        Self::with_shared_deps(function, index, arity, Arc::new(deps), results)
    }

    fn with_shared_deps(
        function: Function,
        index: usize,
        arity: usize,
        deps: Arc<IndexMap<Param, Value>>,
        results: ResultSlot,
    ) -> HoshmapResult<Self> {
        if index >= arity {
            return Err(HoshmapError::Conflict(format!(
                "output index {} out of range for {} outputs",
                index, arity
            )));
        }
        if results.len() != arity {
            return Err(HoshmapError::Conflict(format!(
                "result slot holds {} outputs, expected {}",
                results.len(),
                arity
            )));
        }
        if reaches_slot(&deps, &results) {
            return Err(HoshmapError::Conflict(format!(
                "'{}' depends on an output of its own call",
                function.name()
            )));
        }

        let base = deps
            .iter()
            .fold(Hosh::UNIT, |acc, (param, dep)| acc * (dep.hosh() * param.hosh()))
            * function.hosh();
        let hosh = base.slice(index, arity);
        Ok(Self {
            function,
            index,
            arity,
            deps,
            results,
            base,
            hosh,
            caches: CacheChain::new(),
            cacheable: true,
        })
    }

    /// A single output without dependencies, identified by the function
    /// alone. It never reads from or writes to cache tiers.
    pub(crate) fn uncached(function: Function) -> Self {
        let hosh = function.hosh();
        Self {
            function,
            index: 0,
            arity: 1,
            deps: Arc::new(IndexMap::new()),
            results: ResultSlot::new(1),
            base: hosh,
            hosh,
            caches: CacheChain::new(),
            cacheable: false,
        }
    }

    /// Creates all outputs of one call, sharing a fresh result slot.
    pub fn outputs(
        function: Function,
        arity: usize,
        deps: IndexMap<Param, Value>,
    ) -> HoshmapResult<Vec<LazyValue>> {
        let deps = Arc::new(deps);
        let results = ResultSlot::new(arity);
        (0..arity)
            .map(|i| Self::with_shared_deps(function.clone(), i, arity, deps.clone(), results.clone()))
            .collect()
    }

    /// Returns the same node backed by additional cache tiers.
    ///
    /// The new tiers are consulted after the ones already attached. The
    /// result slot is shared, so nothing computed so far is lost. Uncached
    /// nodes are returned as they are.
    pub fn with_caches(&self, caches: &CacheChain) -> LazyValue {
        let mut lazy = self.clone();
        if self.cacheable {
            lazy.caches = self.caches.extended(caches);
        }
        lazy
    }

    pub fn hosh(&self) -> Hosh {
        self.hosh
    }

    pub fn id(&self) -> String {
        self.hosh.id()
    }

    /// Identity of the function alone.
    pub fn function_hosh(&self) -> Hosh {
        self.function.hosh()
    }

    pub fn function(&self) -> &Function {
        &self.function
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn arity(&self) -> usize {
        self.arity
    }

    pub fn deps(&self) -> &IndexMap<Param, Value> {
        &self.deps
    }

    pub fn results(&self) -> &ResultSlot {
        &self.results
    }

    pub fn caches(&self) -> &CacheChain {
        &self.caches
    }

    /// Identity of output `j` of the same call.
    pub fn sibling_hosh(&self, j: usize) -> Hosh {
        self.base.slice(j, self.arity)
    }

    pub fn is_evaluated(&self) -> bool {
        self.results.is_set(self.index)
    }

    /// The content if already produced.
    pub fn peek(&self) -> Option<Content> {
        self.results.get(self.index)
    }

    /// The content, computing or fetching it on first access.
    pub fn value(&self) -> HoshmapResult<Content> {
        let mut slot = self.results.lock();
        if let Some(content) = &slot[self.index] {
            return Ok(content.clone());
        }

        let id = self.id();
        if !self.caches.is_empty() {
            if let Some(content) = self.caches.fetch(&id)? {
                debug!(function = self.function.name(), id = %id, "lazy value served from cache");
                slot[self.index] = Some(content.clone());
                return Ok(content);
            }
        }

        let resolved = self
            .deps
            .iter()
            .map(|(param, dep)| Ok((param.clone(), dep.value()?)))
            .collect::<HoshmapResult<Vec<_>>>()?;

        debug!(function = self.function.name(), id = %id, outputs = self.arity, "computing lazy value");
        let result = self.function.invoke(resolved)?;
        let outputs = normalize_outputs(result, self.arity)?;

        for (j, content) in outputs.iter().enumerate() {
            slot[j] = Some(content.clone());
        }

        if !self.caches.is_empty() {
            for (j, content) in outputs.iter().enumerate() {
                self.caches.store(&self.sibling_hosh(j).id(), content)?;
            }
        }

        Ok(outputs.into_iter().nth(self.index).unwrap_or(Content::Null))
    }
}

/// Shows the content once evaluated, otherwise the dependency skeleton:
/// `λ(x y=λ(z))`, where `=` marks dependencies that are still pending.
impl fmt::Display for LazyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(content) = self.peek() {
            return write!(f, "{}", content);
        }
        write!(f, "λ(")?;
        for (i, (param, dep)) in self.deps.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{}", param)?;
            if !dep.is_evaluated() {
                write!(f, "={}", dep)?;
            }
        }
        write!(f, ")")
    }
}

impl fmt::Debug for LazyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyValue")
            .field("function", &self.function.name())
            .field("index", &self.index)
            .field("arity", &self.arity)
            .field("hosh", &self.hosh)
            .field("results", &self.results)
            .finish()
    }
}
