//! Functions behind lazy values.
//!
//! A [`Function`] pairs a callable with its identity. The identity is what the
//! value graph sees; the callable only runs when a result is actually needed
//! and no cache tier has it.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::de::DeserializeOwned;

use crate::content::{type_name, Content};
use crate::hosh::Hosh;
use crate::{HoshmapError, HoshmapResult};

/// The role a dependency plays when the function is called.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Param {
    /// Passed positionally, ordered by index.
    Position(usize),
    /// Passed by name.
    Named(String),
    /// The dependency is a sequence; the function is called once per element,
    /// with the element bound to this name.
    Each(String),
}

impl Param {
    /// Shorthand for [`Param::Named`].
    pub fn named(name: impl Into<String>) -> Self {
        Param::Named(name.into())
    }

    /// Identity of the role, distinct per kind and name.
    pub fn hosh(&self) -> Hosh {
        match self {
            Param::Position(i) => Hosh::of_parts(&[b"param", b"position", &(*i as u64).to_le_bytes()]),
            Param::Named(name) => Hosh::of_parts(&[b"param", b"named", name.as_bytes()]),
            Param::Each(name) => Hosh::of_parts(&[b"param", b"each", name.as_bytes()]),
        }
    }
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Param::Position(i) => write!(f, "{}", i),
            Param::Named(name) => f.write_str(name),
            Param::Each(name) => write!(f, "*{}", name),
        }
    }
}

/// Arguments handed to a function body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Args {
    positional: Vec<Content>,
    named: IndexMap<String, Content>,
}

impl Args {
    /// Creates an empty argument list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a positional argument.
    pub fn with_positional(mut self, value: Content) -> Self {
        self.positional.push(value);
        self
    }

    /// Adds a named argument.
    pub fn with_named(mut self, name: impl Into<String>, value: Content) -> Self {
        self.named.insert(name.into(), value);
        self
    }

    /// Positional arguments in index order.
    pub fn positional(&self) -> &[Content] {
        &self.positional
    }

    /// Named arguments in declaration order.
    pub fn named(&self) -> &IndexMap<String, Content> {
        &self.named
    }

    /// Returns a named argument.
    pub fn get(&self, name: &str) -> HoshmapResult<&Content> {
        self.named
            .get(name)
            .ok_or_else(|| HoshmapError::MissingArgument(name.to_string()))
    }

    /// Returns a named argument converted to `T`.
    pub fn get_as<T: DeserializeOwned>(&self, name: &str) -> HoshmapResult<T> {
        let value = self.get(name)?;
        T::deserialize(value).map_err(|e| HoshmapError::InvalidArgument {
            name: name.to_string(),
            message: e.to_string(),
        })
    }

    /// Returns a positional argument.
    pub fn at(&self, index: usize) -> HoshmapResult<&Content> {
        self.positional
            .get(index)
            .ok_or_else(|| HoshmapError::MissingArgument(index.to_string()))
    }
}

type Body = dyn Fn(&Args) -> HoshmapResult<Content> + Send + Sync;

/// A named, identified callable.
#[derive(Clone)]
pub struct Function {
    name: Arc<str>,
    hosh: Hosh,
    body: Arc<Body>,
}

impl Function {
    /// Creates a function whose identity is derived from its name.
    pub fn new<F>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn(&Args) -> HoshmapResult<Content> + Send + Sync + 'static,
    {
        let name: String = name.into();
        let hosh = Hosh::of_parts(&[b"function", name.as_bytes()]);
        Self {
            name: name.into(),
            hosh,
            body: Arc::new(body),
        }
    }

    /// Overrides the identity. Accepts a textual id or any label.
    pub fn with_id(self, id: &str) -> Self {
        self.with_hosh(Hosh::from_label(id))
    }

    /// Overrides the identity.
    pub fn with_hosh(mut self, hosh: Hosh) -> Self {
        self.hosh = hosh;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn hosh(&self) -> Hosh {
        self.hosh
    }

    pub fn id(&self) -> String {
        self.hosh.id()
    }

    /// Calls the body once.
    pub fn call(&self, args: &Args) -> HoshmapResult<Content> {
        (self.body)(args)
    }

    /// Calls the function over resolved dependencies.
    ///
    /// Without [`Param::Each`] dependencies this is a single call. Otherwise
    /// the sequences are zipped and the function is called per position; the
    /// collected results form the return value.
    pub fn invoke(&self, deps: Vec<(Param, Content)>) -> HoshmapResult<Content> {
        let mut positional = Vec::new();
        let mut args = Args::new();
        let mut each = Vec::new();
        for (param, content) in deps {
            match param {
                Param::Position(i) => positional.push((i, content)),
                Param::Named(name) => {
                    args.named.insert(name, content);
                }
                Param::Each(name) => match content {
                    Content::Array(items) => each.push((name, items)),
                    other => {
                        return Err(HoshmapError::NotIterable(format!(
                            "{} ({})",
                            name,
                            type_name(&other)
                        )))
                    }
                },
            }
        }
        positional.sort_by_key(|(i, _)| *i);
        args.positional = positional.into_iter().map(|(_, c)| c).collect();

        if each.is_empty() {
            return self.call(&args);
        }

        let len = each[0].1.len();
        if each.iter().any(|(_, items)| items.len() != len) {
            return Err(HoshmapError::IterableLengthMismatch {
                lengths: each.iter().map(|(n, items)| (n.clone(), items.len())).collect(),
            });
        }

        let mut results = Vec::with_capacity(len);
        for i in 0..len {
            let mut call_args = args.clone();
            for (name, items) in &each {
                call_args.named.insert(name.clone(), items[i].clone());
            }
            results.push(self.call(&call_args)?);
        }
        Ok(Content::Array(results))
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function")
            .field("name", &self.name)
            .field("hosh", &self.hosh)
            .finish()
    }
}

/// Splits a function result into exactly `n` outputs.
///
/// A single output takes the result as is. With several outputs an object
/// contributes its values in order and an array its elements; both must have
/// exactly `n` items.
pub fn normalize_outputs(result: Content, n: usize) -> HoshmapResult<Vec<Content>> {
    if n == 1 {
        return Ok(vec![result]);
    }
    let outputs: Vec<Content> = match result {
        Content::Object(map) => map.into_iter().map(|(_, v)| v).collect(),
        Content::Array(items) => items,
        other => {
            return Err(HoshmapError::UnsupportedResultType(
                type_name(&other).to_string(),
            ))
        }
    };
    if outputs.len() != n {
        return Err(HoshmapError::Arity {
            expected: n,
            found: outputs.len(),
        });
    }
    Ok(outputs)
}
