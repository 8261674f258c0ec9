//! Function bindings.
//!
//! A [`Binding`] says which fields feed a function and which fields receive
//! its outputs:
//!
//! ```text
//! "a, b:x -> y, z"     inputs a and b (b passed as x), outputs y and z
//! "xs:*x -> ys"        call once per element of xs, bound to x
//! "~k, data -> model"  k may be drawn from a sample space
//! "-> now"             no inputs
//! ```
//!
//! Inputs and outputs are separated by commas and/or whitespace; `→` may be
//! used instead of `->`. An input is looked up among the fields of the map,
//! then in the sample space, then among the literal defaults.

use indexmap::IndexMap;

use crate::content::{Content, IntoValue};
use crate::function::{Function, Param};
use crate::value::{LazyValue, Value};
use crate::{HoshmapError, HoshmapResult};

/// A parsed binding of a function to map fields.
#[derive(Debug, Clone)]
pub struct Binding {
    function: Function,
    spec: String,
    /// Source field → role in the call.
    inputs: IndexMap<String, Param>,
    sampled: Vec<String>,
    space: IndexMap<String, Vec<Content>>,
    defaults: IndexMap<String, Value>,
    outputs: Vec<String>,
    seed: u64,
}

impl Binding {
    /// Parses `spec` for `function`.
    pub fn parse(function: Function, spec: &str) -> HoshmapResult<Self> {
        let invalid = |reason: &str| HoshmapError::InvalidBinding {
            spec: spec.to_string(),
            reason: reason.to_string(),
        };

        let (ins, outs) = spec
            .split_once("->")
            .or_else(|| spec.split_once('→'))
            .ok_or_else(|| invalid("missing '->' between inputs and outputs"))?;

        let mut inputs = IndexMap::new();
        let mut sampled = Vec::new();
        for token in tokens(ins) {
            let (is_sampled, token) = match token.strip_prefix('~') {
                Some(rest) => (true, rest),
                None => (false, token),
            };
            let (source, param) = match token.split_once(':') {
                Some((source, target)) => match target.strip_prefix('*') {
                    Some(target) => (source, Param::Each(target.to_string())),
                    None => (source, Param::Named(target.to_string())),
                },
                None => (token, Param::Named(token.to_string())),
            };
            let target = match &param {
                Param::Named(t) | Param::Each(t) => t.as_str(),
                Param::Position(_) => "",
            };
            if source.is_empty() || target.is_empty() || !is_name(source) || !is_name(target) {
                return Err(invalid(&format!("malformed input '{}'", token)));
            }
            if inputs.contains_key(source) {
                return Err(invalid(&format!("input '{}' listed twice", source)));
            }
            if inputs.values().any(|p| param_name(p) == target) {
                return Err(invalid(&format!("argument '{}' bound twice", target)));
            }
            if is_sampled {
                sampled.push(source.to_string());
            }
            inputs.insert(source.to_string(), param);
        }

        let mut outputs: Vec<String> = Vec::new();
        for token in tokens(outs) {
            if !is_name(token) {
                return Err(invalid(&format!("malformed output '{}'", token)));
            }
            if outputs.iter().any(|o| o == token) {
                return Err(invalid(&format!("output '{}' listed twice", token)));
            }
            outputs.push(token.to_string());
        }
        if outputs.is_empty() {
            return Err(invalid("missing output field names after '->'"));
        }

        Ok(Self {
            function,
            spec: spec.to_string(),
            inputs,
            sampled,
            space: IndexMap::new(),
            defaults: IndexMap::new(),
            outputs,
            seed: 0,
        })
    }

    /// Values an input may be drawn from when the map lacks it.
    pub fn sample(mut self, field: impl Into<String>, choices: Vec<Content>) -> Self {
        self.space.insert(field.into(), choices);
        self
    }

    /// Literal value for an input the map lacks.
    pub fn default(mut self, field: impl Into<String>, value: impl IntoValue) -> Self {
        self.defaults.insert(field.into(), value.into_value());
        self
    }

    /// Overrides the computation identity. Accepts a textual id or any label.
    pub fn with_id(mut self, id: &str) -> Self {
        self.function = self.function.with_id(id);
        self
    }

    /// Seed for drawing sampled inputs.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn function(&self) -> &Function {
        &self.function
    }

    pub fn spec(&self) -> &str {
        &self.spec
    }

    pub fn inputs(&self) -> &IndexMap<String, Param> {
        &self.inputs
    }

    /// Inputs marked with `~`.
    pub fn sampled(&self) -> &[String] {
        &self.sampled
    }

    pub fn outputs(&self) -> &[String] {
        &self.outputs
    }

    /// Resolves every input against `fields`.
    pub fn resolve(&self, fields: &IndexMap<String, Value>) -> HoshmapResult<IndexMap<Param, Value>> {
        let mut deps = IndexMap::new();
        for (source, param) in &self.inputs {
            let value = if let Some(value) = fields.get(source) {
                value.clone()
            } else if let Some(choices) = self.space.get(source).filter(|c| !c.is_empty()) {
                Value::strict(self.choose(source, choices))
            } else if let Some(value) = self.defaults.get(source) {
                value.clone()
            } else {
                return Err(HoshmapError::MissingInput {
                    field: source.clone(),
                    inputs: self.inputs.keys().cloned().collect(),
                });
            };
            deps.insert(param.clone(), value);
        }
        Ok(deps)
    }

    /// Creates one lazy value per output, all sharing one call.
    pub fn apply(&self, fields: &IndexMap<String, Value>) -> HoshmapResult<Vec<(String, Value)>> {
        let deps = self.resolve(fields)?;
        let lazies = LazyValue::outputs(self.function.clone(), self.outputs.len(), deps)?;
        Ok(self
            .outputs
            .iter()
            .cloned()
            .zip(lazies.into_iter().map(Value::lazy))
            .collect())
    }

    fn choose(&self, field: &str, choices: &[Content]) -> Content {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"sample");
        hasher.update(&self.seed.to_le_bytes());
        hasher.update(field.as_bytes());
        let digest = hasher.finalize();
        let mut word = [0u8; 8];
        word.copy_from_slice(&digest.as_bytes()[..8]);
        let index = (u64::from_le_bytes(word) % choices.len() as u64) as usize;
        choices[index].clone()
    }
}

fn tokens(s: &str) -> impl Iterator<Item = &str> {
    s.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|t| !t.is_empty())
}

fn is_name(s: &str) -> bool {
    !s.is_empty() && !s.contains([':', '*', '~', '>', '-'])
}

fn param_name(param: &Param) -> &str {
    match param {
        Param::Named(name) | Param::Each(name) => name,
        Param::Position(_) => "",
    }
}
