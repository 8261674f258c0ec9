//! # Frozen Maps
//!
//! The immutable identified map. Every operation returns a new map; values
//! are shared between maps, so evaluating a lazy entry through one map makes
//! it evaluated in every map holding it.
//!
//! ## Identity
//!
//! ```text
//! _id = Σ  hosh(value) · hosh(key)        over keys not starting with '_'
//! ```
//!
//! `Σ` is the commutative sum of [`Hosh`], so insertion order does not
//! matter. Metadata entries (`_name`) are carried and listed in `_ids` but do
//! not contribute to `_id`.

use std::fmt;

use indexmap::IndexMap;
use tracing::{debug, trace};

use crate::binding::Binding;
use crate::cache::{CacheChain, CacheError};
use crate::content::{type_name, Content, IntoValue};
use crate::function::Function;
use crate::hosh::Hosh;
use crate::value::{LazyValue, Value};
use crate::{is_metadata, is_reserved, HoshmapError, HoshmapResult, IDS_KEY, ID_KEY};

/// An immutable map from field names to identified values.
#[derive(Clone)]
pub struct FrozenMap {
    data: IndexMap<String, Value>,
    hosh: Hosh,
    id: String,
    ids: IndexMap<String, String>,
}

impl FrozenMap {
    /// The map without entries.
    pub fn empty() -> Self {
        Self::from_values(IndexMap::new())
    }

    /// Builds a map from key/value pairs.
    ///
    /// Raw content becomes strict values; [`Value`]s are kept as they are.
    /// Fails on `_id` or `_ids` keys.
    pub fn new<K, V, I>(entries: I) -> HoshmapResult<Self>
    where
        K: Into<String>,
        V: IntoValue,
        I: IntoIterator<Item = (K, V)>,
    {
        let entries = checked_entries(entries)?;
        let data = entries
            .into_iter()
            .map(|(k, v)| (k, v.into_value()))
            .collect();
        Ok(Self::from_values(data))
    }

    /// Builds a map from a JSON object.
    pub fn from_content(content: &Content) -> HoshmapResult<Self> {
        match content {
            Content::Object(object) => Self::new(object.iter().map(|(k, v)| (k.clone(), v.clone()))),
            other => Err(HoshmapError::TypeMismatch(type_name(other).to_string())),
        }
    }

    /// Builds a map whose strict entries carry predefined identities.
    ///
    /// Every strict entry needs an id in `ids`. Lazy entries keep their own
    /// identity; giving one an id, or giving an id for an absent key, is a
    /// conflict.
    pub fn from_ids<K, V, I>(values: I, ids: &IndexMap<String, String>) -> HoshmapResult<Self>
    where
        K: Into<String>,
        V: IntoValue,
        I: IntoIterator<Item = (K, V)>,
    {
        let entries = checked_entries(values)?;
        if let Some(extra) = ids.keys().find(|k| !entries.iter().any(|(key, _)| key == *k)) {
            return Err(HoshmapError::Conflict(format!(
                "id given for '{}', which has no value",
                extra
            )));
        }
        let mut data = IndexMap::new();
        for (key, value) in entries {
            let value = match (value.into_value(), ids.get(&key)) {
                (Value::Strict(strict), Some(id)) => {
                    Value::strict_with_hosh(strict.content().clone(), Hosh::from_id(id)?)
                }
                (Value::Strict(_), None) => return Err(HoshmapError::KeyNotFound(key)),
                (Value::Lazy(_), Some(_)) => {
                    return Err(HoshmapError::Conflict(format!(
                        "'{}' is computed and cannot take a predefined id",
                        key
                    )))
                }
                (lazy, None) => lazy,
            };
            data.insert(key, value);
        }
        Ok(Self::from_values(data))
    }

    /// Rebuilds a map previously recorded by [`attach_caches`](Self::attach_caches).
    ///
    /// Every entry must be present in the chain.
    pub fn load(id: &str, caches: &CacheChain) -> HoshmapResult<Self> {
        let record = caches
            .fetch(id)?
            .ok_or_else(|| HoshmapError::NotCached(id.to_string()))?;
        let ids = record
            .get(IDS_KEY)
            .and_then(Content::as_object)
            .ok_or_else(|| CacheError::Corrupted(format!("{} has no '{}' record", id, IDS_KEY)))?;

        let mut data = IndexMap::new();
        for (key, value_id) in ids {
            let value_id = value_id.as_str().ok_or_else(|| {
                CacheError::Corrupted(format!("{}: id of '{}' is not a string", id, key))
            })?;
            let content = caches
                .fetch(value_id)?
                .ok_or_else(|| HoshmapError::NotCached(value_id.to_string()))?;
            data.insert(key.clone(), Value::strict_with_hosh(content, Hosh::from_id(value_id)?));
        }

        let map = Self::from_values(data);
        if map.id != id {
            return Err(HoshmapError::Conflict(format!(
                "record {} describes map {}",
                id, map.id
            )));
        }
        debug!(id, entries = map.len(), "map loaded from cache");
        Ok(map)
    }

    fn from_values(data: IndexMap<String, Value>) -> Self {
        let hosh = data
            .iter()
            .filter(|(k, _)| !is_metadata(k))
            .fold(Hosh::UNIT, |acc, (k, v)| acc + v.hosh() * Hosh::of(k.as_bytes()));
        let ids = data.iter().map(|(k, v)| (k.clone(), v.id())).collect();
        Self {
            data,
            hosh,
            id: hosh.id(),
            ids,
        }
    }

    pub fn hosh(&self) -> Hosh {
        self.hosh
    }

    /// Identity of the map.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Identity of every entry, metadata included.
    pub fn ids(&self) -> &IndexMap<String, String> {
        &self.ids
    }

    /// Number of entries, metadata included.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    /// Keys that contribute to the identity.
    pub fn fields(&self) -> Vec<&str> {
        self.data.keys().map(String::as_str).filter(|k| !is_metadata(k)).collect()
    }

    /// Keys that do not.
    pub fn metafields(&self) -> Vec<&str> {
        self.data.keys().map(String::as_str).filter(|k| is_metadata(k)).collect()
    }

    /// The value node stored under `key`, without evaluating it.
    pub fn value(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// The content under `key`, evaluating it if needed.
    ///
    /// `_id` and `_ids` answer with the map identities.
    pub fn get(&self, key: &str) -> HoshmapResult<Content> {
        match key {
            ID_KEY => Ok(Content::String(self.id.clone())),
            IDS_KEY => Ok(self.ids_content()),
            _ => self
                .data
                .get(key)
                .ok_or_else(|| HoshmapError::KeyNotFound(key.to_string()))?
                .value(),
        }
    }

    /// Entries in insertion order. Nothing is evaluated.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.data.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Entries with their content, evaluating as the iteration goes.
    pub fn evaluated_entries(&self) -> impl Iterator<Item = HoshmapResult<(&str, Content)>> {
        self.data
            .iter()
            .map(|(k, v)| v.value().map(|content| (k.as_str(), content)))
    }

    /// Like [`evaluated_entries`](Self::evaluated_entries), followed by `_id`
    /// and `_ids`.
    pub fn items(&self) -> impl Iterator<Item = HoshmapResult<(String, Content)>> + '_ {
        let identities = [
            (ID_KEY.to_string(), Content::String(self.id.clone())),
            (IDS_KEY.to_string(), self.ids_content()),
        ];
        self.evaluated_entries()
            .map(|entry| entry.map(|(k, c)| (k.to_string(), c)))
            .chain(identities.into_iter().map(Ok))
    }

    /// Evaluates every entry.
    pub fn evaluate(&self) -> HoshmapResult<()> {
        for value in self.data.values() {
            value.evaluate()?;
        }
        Ok(())
    }

    /// Fully evaluated JSON object, with `_id` and `_ids`.
    pub fn as_dict(&self) -> HoshmapResult<serde_json::Map<String, Content>> {
        self.items().collect()
    }

    /// Pretty-printed rendering. Pending entries show their skeleton.
    pub fn as_text(&self) -> String {
        format!("{:#}", self.rendered())
    }

    /// Returns this map with `other`'s entries added; `other` wins on
    /// conflicting keys.
    pub fn merge(&self, other: &FrozenMap) -> FrozenMap {
        let mut data = self.data.clone();
        for (k, v) in &other.data {
            data.insert(k.clone(), v.clone());
        }
        Self::from_values(data)
    }

    /// Returns this map with the given entries added or replaced.
    pub fn merge_entries<K, V, I>(&self, entries: I) -> HoshmapResult<FrozenMap>
    where
        K: Into<String>,
        V: IntoValue,
        I: IntoIterator<Item = (K, V)>,
    {
        let mut data = self.data.clone();
        for (k, v) in checked_entries(entries)? {
            data.insert(k, v.into_value());
        }
        Ok(Self::from_values(data))
    }

    /// Returns this map with `key` set.
    pub fn with(&self, key: impl Into<String>, value: impl IntoValue) -> HoshmapResult<FrozenMap> {
        self.merge_entries([(key.into(), value.into_value())])
    }

    /// Returns this map without `key`.
    pub fn without(&self, key: &str) -> HoshmapResult<FrozenMap> {
        let mut data = self.data.clone();
        if data.shift_remove(key).is_none() {
            return Err(HoshmapError::KeyNotFound(key.to_string()));
        }
        Ok(Self::from_values(data))
    }

    /// Returns this map with the outputs of `binding` added as lazy entries.
    ///
    /// Inputs are resolved now; nothing is computed.
    pub fn bind(&self, binding: &Binding) -> HoshmapResult<FrozenMap> {
        if let Some(out) = binding.outputs().iter().find(|o| is_reserved(o)) {
            return Err(HoshmapError::ReservedKey(out.clone()));
        }
        let outputs = binding.apply(&self.data)?;
        trace!(
            function = binding.function().name(),
            outputs = ?binding.outputs(),
            "binding applied"
        );
        let mut data = self.data.clone();
        for (k, v) in outputs {
            data.insert(k, v);
        }
        Ok(Self::from_values(data))
    }

    /// Returns this map backed by `caches`.
    ///
    /// Records `{"_ids": ...}` under the map identity in every tier, writes
    /// already-evaluated entries into the eager tiers and attaches the chain
    /// to every pending entry. The identity does not change.
    pub fn attach_caches(&self, caches: &CacheChain) -> HoshmapResult<FrozenMap> {
        let mut record = serde_json::Map::new();
        record.insert(IDS_KEY.to_string(), self.ids_content());
        let record = Content::Object(record);
        caches.store(&self.id, &record)?;

        let mut data = IndexMap::with_capacity(self.data.len());
        for (k, v) in &self.data {
            match v.peek() {
                Some(content) => {
                    let id = v.id();
                    for tier in caches.eager_tiers() {
                        tier.store().set(&id, &content)?;
                    }
                    data.insert(k.clone(), v.clone());
                }
                None => {
                    data.insert(k.clone(), v.with_caches(caches));
                }
            }
        }
        debug!(id = %self.id, tiers = caches.len(), "caches attached");
        Ok(Self::from_values(data))
    }

    /// Compares with plain content.
    ///
    /// An object carrying `_id` is compared by identity. Otherwise the
    /// non-metadata fields are evaluated and compared.
    pub fn eq_content(&self, other: &Content) -> HoshmapResult<bool> {
        let object = match other {
            Content::Object(object) => object,
            other => return Err(HoshmapError::TypeMismatch(type_name(other).to_string())),
        };
        if let Some(id) = object.get(ID_KEY) {
            return Ok(id.as_str() == Some(self.id.as_str()));
        }
        let theirs: Vec<_> = object.keys().filter(|k| !is_metadata(k)).collect();
        if theirs.len() != self.fields().len() {
            return Ok(false);
        }
        for key in theirs {
            match self.data.get(key) {
                Some(value) if value.value()? == object[key] => {}
                _ => return Ok(false),
            }
        }
        Ok(true)
    }

    fn ids_content(&self) -> Content {
        Content::Object(
            self.ids
                .iter()
                .map(|(k, id)| (k.clone(), Content::String(id.clone())))
                .collect(),
        )
    }

    fn rendered(&self) -> Content {
        let mut object: serde_json::Map<String, Content> = self
            .data
            .iter()
            .map(|(k, v)| (k.clone(), v.peek().unwrap_or_else(|| Content::String(v.to_string()))))
            .collect();
        object.insert(ID_KEY.to_string(), Content::String(self.id.clone()));
        object.insert(IDS_KEY.to_string(), self.ids_content());
        Content::Object(object)
    }
}

fn checked_entries<K, V, I>(entries: I) -> HoshmapResult<Vec<(String, V)>>
where
    K: Into<String>,
    I: IntoIterator<Item = (K, V)>,
{
    entries
        .into_iter()
        .map(|(k, v)| {
            let k = k.into();
            if is_reserved(&k) {
                Err(HoshmapError::ReservedKey(k))
            } else {
                Ok((k, v))
            }
        })
        .collect()
}

/// A nested map keeps its identity. Once every entry is evaluated it becomes
/// strict content, otherwise its pending entries are evaluated on first read.
impl IntoValue for FrozenMap {
    fn into_value(self) -> Value {
        if self.data.values().all(Value::is_evaluated) {
            return Value::strict_with_hosh(self.rendered(), self.hosh);
        }
        let hosh = self.hosh;
        let function = Function::new("frozen map", move |_| Ok(Content::Object(self.as_dict()?)))
            .with_hosh(hosh);
        Value::lazy(LazyValue::uncached(function))
    }
}

impl IntoValue for &FrozenMap {
    fn into_value(self) -> Value {
        self.clone().into_value()
    }
}

impl Default for FrozenMap {
    fn default() -> Self {
        Self::empty()
    }
}

/// Maps are equal iff their identities are.
impl PartialEq for FrozenMap {
    fn eq(&self, other: &Self) -> bool {
        self.hosh == other.hosh
    }
}

impl Eq for FrozenMap {}

impl fmt::Display for FrozenMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.rendered())
    }
}

impl fmt::Debug for FrozenMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrozenMap")
            .field("id", &self.id)
            .field("data", &self.data)
            .finish()
    }
}
