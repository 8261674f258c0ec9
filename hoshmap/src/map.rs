//! Mutable handle over a frozen map.
//!
//! [`Map`] replaces its inner [`FrozenMap`] on every change; clones taken
//! before a change keep seeing the old map.

use std::fmt;
use std::ops::Deref;

use crate::binding::Binding;
use crate::cache::CacheChain;
use crate::content::IntoValue;
use crate::frozen::FrozenMap;
use crate::value::Value;
use crate::{HoshmapError, HoshmapResult};

/// Common surface of [`FrozenMap`] and [`Map`].
pub trait MapLike {
    /// The current immutable state.
    fn frozen(&self) -> &FrozenMap;

    /// Sets `key` to `value`.
    fn set(&mut self, key: &str, value: Value) -> HoshmapResult<()>;

    /// Removes `key`.
    fn remove(&mut self, key: &str) -> HoshmapResult<()>;
}

impl MapLike for FrozenMap {
    fn frozen(&self) -> &FrozenMap {
        self
    }

    fn set(&mut self, key: &str, _value: Value) -> HoshmapResult<()> {
        Err(HoshmapError::FrozenMutation(key.to_string()))
    }

    fn remove(&mut self, key: &str) -> HoshmapResult<()> {
        Err(HoshmapError::FrozenMutation(key.to_string()))
    }
}

/// A map that can be changed in place.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Map {
    frozen: FrozenMap,
}

impl Map {
    pub fn new<K, V, I>(entries: I) -> HoshmapResult<Self>
    where
        K: Into<String>,
        V: IntoValue,
        I: IntoIterator<Item = (K, V)>,
    {
        Ok(Self {
            frozen: FrozenMap::new(entries)?,
        })
    }

    pub fn into_frozen(self) -> FrozenMap {
        self.frozen
    }

    /// Sets `key`, replacing any previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl IntoValue) -> HoshmapResult<()> {
        self.frozen = self.frozen.with(key, value)?;
        Ok(())
    }

    /// Removes `key`.
    pub fn remove(&mut self, key: &str) -> HoshmapResult<()> {
        self.frozen = self.frozen.without(key)?;
        Ok(())
    }

    /// Merges `other` in; its entries win.
    pub fn update(&mut self, other: &FrozenMap) {
        self.frozen = self.frozen.merge(other);
    }

    /// Adds the outputs of `binding`.
    pub fn apply(&mut self, binding: &Binding) -> HoshmapResult<()> {
        self.frozen = self.frozen.bind(binding)?;
        Ok(())
    }

    /// Backs the map with `caches`.
    pub fn attach(&mut self, caches: &CacheChain) -> HoshmapResult<()> {
        self.frozen = self.frozen.attach_caches(caches)?;
        Ok(())
    }
}

impl MapLike for Map {
    fn frozen(&self) -> &FrozenMap {
        &self.frozen
    }

    fn set(&mut self, key: &str, value: Value) -> HoshmapResult<()> {
        self.insert(key, value)
    }

    fn remove(&mut self, key: &str) -> HoshmapResult<()> {
        Map::remove(self, key)
    }
}

impl Deref for Map {
    type Target = FrozenMap;

    fn deref(&self) -> &FrozenMap {
        &self.frozen
    }
}

impl From<FrozenMap> for Map {
    fn from(frozen: FrozenMap) -> Self {
        Self { frozen }
    }
}

impl From<Map> for FrozenMap {
    fn from(map: Map) -> Self {
        map.frozen
    }
}

impl PartialEq<FrozenMap> for Map {
    fn eq(&self, other: &FrozenMap) -> bool {
        &self.frozen == other
    }
}

impl fmt::Display for Map {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.frozen, f)
    }
}

impl fmt::Debug for Map {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Map").field(&self.frozen).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::Function;
    use serde_json::json;

    #[test]
    fn test_insert_changes_identity() {
        let mut map = Map::new([("x", 1)]).unwrap();
        let before = map.id().to_string();
        map.insert("y", 2).unwrap();
        assert_ne!(map.id(), before);
        assert_eq!(map, FrozenMap::new([("x", 1), ("y", 2)]).unwrap());
    }

    #[test]
    fn test_remove() {
        let mut map = Map::new([("x", 1), ("y", 2)]).unwrap();
        map.remove("y").unwrap();
        assert_eq!(map, FrozenMap::new([("x", 1)]).unwrap());
        assert!(matches!(map.remove("y"), Err(HoshmapError::KeyNotFound(_))));
    }

    #[test]
    fn test_insert_reserved() {
        let mut map = Map::default();
        assert!(matches!(map.insert("_id", 1), Err(HoshmapError::ReservedKey(_))));
    }

    #[test]
    fn test_clone_keeps_old_state() {
        let mut map = Map::new([("x", 1)]).unwrap();
        let snapshot = map.clone();
        map.update(&FrozenMap::new([("x", 5)]).unwrap());
        assert_eq!(snapshot.get("x").unwrap(), json!(1));
        assert_eq!(map.get("x").unwrap(), json!(5));
    }

    #[test]
    fn test_apply() {
        let double = Function::new("double", |args| {
            let x: i64 = args.get_as("x")?;
            Ok(json!(2 * x))
        });
        let mut map = Map::new([("x", 21)]).unwrap();
        map.apply(&Binding::parse(double, "x -> y").unwrap()).unwrap();
        assert_eq!(map.get("y").unwrap(), json!(42));
    }

    #[test]
    fn test_frozen_rejects_mutation() {
        let mut frozen = FrozenMap::new([("x", 1)]).unwrap();
        let err = MapLike::set(&mut frozen, "x", Value::strict(2)).unwrap_err();
        assert!(matches!(err, HoshmapError::FrozenMutation(k) if k == "x"));
        assert!(matches!(
            MapLike::remove(&mut frozen, "x"),
            Err(HoshmapError::FrozenMutation(_))
        ));
        assert_eq!(frozen.get("x").unwrap(), json!(1));
    }

    #[test]
    fn test_maplike_on_map() {
        let mut map = Map::default();
        MapLike::set(&mut map, "a", Value::strict("v")).unwrap();
        assert_eq!(map.frozen().get("a").unwrap(), json!("v"));
        MapLike::remove(&mut map, "a").unwrap();
        assert!(map.is_empty());
    }
}
