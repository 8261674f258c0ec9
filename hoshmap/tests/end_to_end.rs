//! End-to-end tests for maps, bindings and cache tiers.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use hoshmap::{
    Binding, CacheChain, CacheConfig, DirCache, FrozenMap, Function, HoshmapError, Map,
    MemoryCache, SqliteCache, Tier,
};
use serde_json::json;
use tempfile::TempDir;

// ============================================================================
// Test Infrastructure
// ============================================================================

/// A function counting its invocations.
fn counted(name: &str, body: fn(i64) -> serde_json::Value) -> (Function, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let function = Function::new(name, move |args| {
        counter.fetch_add(1, Ordering::SeqCst);
        let x: i64 = args.get_as("x")?;
        Ok(body(x))
    });
    (function, calls)
}

fn square() -> (Function, Arc<AtomicUsize>) {
    counted("square", |x| json!(x * x))
}

// ============================================================================
// Maps
// ============================================================================

#[test]
fn test_square_scenario() {
    let (f, calls) = square();
    let map = FrozenMap::new([("x", 3)]).unwrap();
    let map = map.bind(&Binding::parse(f, "x -> y").unwrap()).unwrap();

    assert!(!map.value("y").unwrap().is_evaluated());
    assert_eq!(map.get("y").unwrap(), json!(9));
    assert!(map.value("y").unwrap().is_evaluated());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_identity_determinism() {
    let build = || {
        let (f, _) = square();
        FrozenMap::new([("x", 3)])
            .unwrap()
            .bind(&Binding::parse(f, "x -> y").unwrap())
            .unwrap()
    };
    let a = build();
    let b = build();
    assert_eq!(a.id(), b.id());
    assert_eq!(a.ids(), b.ids());

    // Evaluating does not change identities.
    a.evaluate().unwrap();
    assert_eq!(a.id(), b.id());
}

#[test]
fn test_lazy_identity_differs_from_content() {
    let (f, _) = square();
    let lazy = FrozenMap::new([("x", 3)])
        .unwrap()
        .bind(&Binding::parse(f, "x -> y").unwrap())
        .unwrap();
    let strict = FrozenMap::new([("x", 3), ("y", 9)]).unwrap();
    assert_ne!(lazy.id(), strict.id());
    assert!(lazy.eq_content(&json!({"x": 3, "y": 9})).unwrap());
}

#[test]
fn test_merge_override_and_roundtrip() {
    let a = FrozenMap::new([("x", 1), ("y", 2)]).unwrap();
    let b = FrozenMap::new([("y", 20), ("z", 30)]).unwrap();
    let c = a.merge(&b);
    assert_eq!(c.get("y").unwrap(), json!(20));
    assert_eq!(c.fields(), vec!["x", "y", "z"]);

    let dict = c.as_dict().unwrap();
    assert_eq!(dict["_id"], json!(c.id()));
    let rebuilt = FrozenMap::from_content(&json!({"x": 1, "y": 20, "z": 30})).unwrap();
    assert_eq!(rebuilt, c);
}

#[test]
fn test_reserved_key() {
    assert!(matches!(FrozenMap::new([("_id", 1)]), Err(HoshmapError::ReservedKey(_))));
    assert!(matches!(
        FrozenMap::from_content(&json!({"a": 1, "_ids": {}})),
        Err(HoshmapError::ReservedKey(_))
    ));
}

#[test]
fn test_fan_out_invocation_count() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let divmod = Function::new("divmod", move |args| {
        counter.fetch_add(1, Ordering::SeqCst);
        let a: i64 = args.get_as("a")?;
        let b: i64 = args.get_as("b")?;
        Ok(json!({"q": a / b, "r": a % b}))
    });

    let map = FrozenMap::new([("a", 17), ("b", 5)]).unwrap();
    let map = map.bind(&Binding::parse(divmod, "a b -> q r").unwrap()).unwrap();
    assert_ne!(map.ids()["q"], map.ids()["r"]);

    assert_eq!(map.get("r").unwrap(), json!(2));
    assert!(map.value("q").unwrap().is_evaluated());
    assert_eq!(map.get("q").unwrap(), json!(3));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_fan_out_arity_mismatch() {
    let pair = Function::new("pair", |_| Ok(json!([1, 2, 3])));
    let map = FrozenMap::empty()
        .bind(&Binding::parse(pair, "-> a b").unwrap())
        .unwrap();
    assert!(matches!(
        map.get("a"),
        Err(HoshmapError::Arity { expected: 2, found: 3 })
    ));
}

#[test]
fn test_chained_bindings() {
    let (f, f_calls) = square();
    let (g, g_calls) = counted("inc", |x| json!(x + 1));
    let mut map = Map::new([("x", 4)]).unwrap();
    map.apply(&Binding::parse(f, "x -> y").unwrap()).unwrap();
    map.apply(&Binding::parse(g, "y:x -> z").unwrap()).unwrap();

    assert_eq!(map.get("z").unwrap(), json!(17));
    assert!(map.value("y").unwrap().is_evaluated());
    assert_eq!(f_calls.load(Ordering::SeqCst), 1);
    assert_eq!(g_calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_exploded_input() {
    let (f, calls) = square();
    let map = FrozenMap::new([("xs", json!([1, 2, 3]))]).unwrap();
    let map = map.bind(&Binding::parse(f, "xs:*x -> ys").unwrap()).unwrap();
    assert_eq!(map.get("ys").unwrap(), json!([1, 4, 9]));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[test]
fn test_shared_evaluation_across_maps() {
    let (f, calls) = square();
    let base = FrozenMap::new([("x", 5)])
        .unwrap()
        .bind(&Binding::parse(f, "x -> y").unwrap())
        .unwrap();
    let extended = base.with("note", "derived").unwrap();

    assert_eq!(extended.get("y").unwrap(), json!(25));
    assert!(base.value("y").unwrap().is_evaluated());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

// ============================================================================
// Caching
// ============================================================================

#[test]
fn test_cache_promotion_without_recompute() {
    let a = Arc::new(MemoryCache::named("a"));
    let b = Arc::new(MemoryCache::named("b"));

    // First process: both tiers, computes once.
    let (f, calls) = square();
    let chain = CacheChain::new().with(Tier::new(a.clone())).with(Tier::new(b.clone()));
    let first = FrozenMap::new([("x", 6)])
        .unwrap()
        .bind(&Binding::parse(f, "x -> y").unwrap())
        .unwrap()
        .attach_caches(&chain)
        .unwrap();
    assert_eq!(first.get("y").unwrap(), json!(36));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    let y_id = first.ids()["y"].clone();
    assert_eq!(a.peek(&y_id), Some(json!(36)));

    // Second process: the first tier lost the entry.
    a.clear();
    let (f, calls) = square();
    let second = FrozenMap::new([("x", 6)])
        .unwrap()
        .bind(&Binding::parse(f, "x -> y").unwrap())
        .unwrap()
        .attach_caches(&chain)
        .unwrap();
    assert_eq!(second.get("y").unwrap(), json!(36));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(a.peek(&y_id), Some(json!(36)));

    // Third process: the first tier alone is enough.
    let (f, calls) = square();
    let only_a = CacheChain::new().with(Tier::new(a.clone()));
    let third = FrozenMap::new([("x", 6)])
        .unwrap()
        .bind(&Binding::parse(f, "x -> y").unwrap())
        .unwrap()
        .attach_caches(&only_a)
        .unwrap();
    assert_eq!(third.get("y").unwrap(), json!(36));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_fan_out_outputs_cached_together() {
    let cache = Arc::new(MemoryCache::new());
    let chain = CacheChain::new().with(Tier::new(cache.clone()));
    let split = Function::new("split", |args| {
        let s: String = args.get_as("s")?;
        let (head, tail) = s.split_at(1);
        Ok(json!([head, tail]))
    });
    let map = FrozenMap::new([("s", "hello")])
        .unwrap()
        .bind(&Binding::parse(split, "s -> head tail").unwrap())
        .unwrap()
        .attach_caches(&chain)
        .unwrap();

    assert_eq!(map.get("head").unwrap(), json!("h"));
    assert_eq!(cache.peek(&map.ids()["tail"]), Some(json!("ello")));
}

#[test]
fn test_directory_tier_across_processes() {
    let temp = TempDir::new().unwrap();
    let open = || {
        CacheChain::new().with(Tier::eager(Arc::new(DirCache::open(temp.path()).unwrap())))
    };

    let (f, calls) = square();
    let map = FrozenMap::new([("x", 7)])
        .unwrap()
        .bind(&Binding::parse(f, "x -> y").unwrap())
        .unwrap()
        .attach_caches(&open())
        .unwrap();
    map.evaluate().unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let loaded = FrozenMap::load(map.id(), &open()).unwrap();
    assert_eq!(loaded, map);
    assert_eq!(loaded.get("y").unwrap(), json!(49));
    assert_eq!(loaded.get("x").unwrap(), json!(7));
}

#[test]
fn test_sqlite_tier_behind_memory() {
    let temp = TempDir::new().unwrap();
    let db = temp.path().join("cache.db");

    let (f, _) = square();
    {
        let chain = CacheConfig::builder()
            .memory(false)
            .database(&db)
            .build()
            .unwrap()
            .build_chain()
            .unwrap();
        let map = FrozenMap::new([("x", 8)])
            .unwrap()
            .bind(&Binding::parse(f.clone(), "x -> y").unwrap())
            .unwrap()
            .attach_caches(&chain)
            .unwrap();
        map.evaluate().unwrap();
    }

    let memory = Arc::new(MemoryCache::new());
    let chain = CacheChain::new()
        .with(Tier::new(memory.clone()))
        .with(Tier::eager(Arc::new(SqliteCache::open(&db).unwrap())));
    let (g, calls) = square();
    let map = FrozenMap::new([("x", 8)])
        .unwrap()
        .bind(&Binding::parse(g, "x -> y").unwrap())
        .unwrap()
        .attach_caches(&chain)
        .unwrap();
    assert_eq!(map.get("y").unwrap(), json!(64));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(memory.peek(&map.ids()["y"]), Some(json!(64)));
}

#[test]
fn test_eager_tier_receives_known_values() {
    let lazy_tier = Arc::new(MemoryCache::named("lazy"));
    let eager_tier = Arc::new(MemoryCache::named("eager"));
    let chain = CacheChain::new()
        .with(Tier::new(lazy_tier.clone()))
        .with(Tier::eager(eager_tier.clone()));

    let (f, calls) = square();
    let map = FrozenMap::new([("x", 2)])
        .unwrap()
        .bind(&Binding::parse(f, "x -> y").unwrap())
        .unwrap();
    assert_eq!(map.get("y").unwrap(), json!(4));

    let map = map.attach_caches(&chain).unwrap();
    let x_id = &map.ids()["x"];
    let y_id = &map.ids()["y"];
    assert_eq!(eager_tier.peek(x_id), Some(json!(2)));
    assert_eq!(lazy_tier.peek(x_id), None);
    // Evaluated lazy entries count as known.
    assert_eq!(eager_tier.peek(y_id), Some(json!(4)));
    assert_eq!(lazy_tier.peek(y_id), None);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    // Both tiers record the map itself.
    assert!(lazy_tier.peek(map.id()).is_some());
    assert!(eager_tier.peek(map.id()).is_some());
}

// ============================================================================
// Dependency roles
// ============================================================================

#[test]
fn test_swapped_inputs_do_not_share_cache_entries() {
    let sub = Function::new("sub", |args| {
        let x: i64 = args.get_as("x")?;
        let y: i64 = args.get_as("y")?;
        Ok(json!(x - y))
    });
    let chain = CacheChain::new().with(Tier::new(Arc::new(MemoryCache::new())));
    let base = FrozenMap::new([("a", 5), ("b", 3)]).unwrap();

    let forward = base
        .bind(&Binding::parse(sub.clone(), "a:x b:y -> r").unwrap())
        .unwrap()
        .attach_caches(&chain)
        .unwrap();
    let swapped = base
        .bind(&Binding::parse(sub, "a:y b:x -> r").unwrap())
        .unwrap()
        .attach_caches(&chain)
        .unwrap();

    assert_ne!(forward.ids()["r"], swapped.ids()["r"]);
    assert_ne!(forward.id(), swapped.id());
    assert_eq!(forward.get("r").unwrap(), json!(2));
    assert_eq!(swapped.get("r").unwrap(), json!(-2));
}

#[test]
fn test_exploded_and_whole_inputs_do_not_share_cache_entries() {
    let wrap = Function::new("wrap", |args| {
        let x = args.get("x")?.clone();
        Ok(json!([x]))
    });
    let chain = CacheChain::new().with(Tier::new(Arc::new(MemoryCache::new())));
    let base = FrozenMap::new([("xs", json!([1, 2]))]).unwrap();

    let whole = base
        .bind(&Binding::parse(wrap.clone(), "xs:x -> r").unwrap())
        .unwrap()
        .attach_caches(&chain)
        .unwrap();
    let exploded = base
        .bind(&Binding::parse(wrap, "xs:*x -> r").unwrap())
        .unwrap()
        .attach_caches(&chain)
        .unwrap();

    assert_ne!(whole.ids()["r"], exploded.ids()["r"]);
    assert_eq!(whole.get("r").unwrap(), json!([[1, 2]]));
    assert_eq!(exploded.get("r").unwrap(), json!([[1], [2]]));
}
