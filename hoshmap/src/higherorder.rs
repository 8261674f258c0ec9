//! Higher-order bindings.

use serde_json::json;

use crate::binding::Binding;
use crate::content::{type_name, Content};
use crate::function::{Args, Function};
use crate::hosh::Hosh;
use crate::{HoshmapError, HoshmapResult};

const COLLECTION: &str = "collection";

/// Binds an element-wise function over the collection held in `field`.
///
/// `in_out` lists any extra inputs and the output field, as in
/// `"scale -> scaled"` or `"-> doubled"`. `f` is called with each element
/// and the extra inputs; returning `None` drops the element.
///
/// Arrays map to arrays. Objects are visited as `[key, value]` pairs and `f`
/// must answer with such a pair; the result is an object again.
///
/// The identity of the binding derives from `name`, so two maps over the
/// same collection with the same `name` are the same computation.
pub fn map<F>(name: &str, field: &str, in_out: &str, f: F) -> HoshmapResult<Binding>
where
    F: Fn(&Content, &Args) -> HoshmapResult<Option<Content>> + Send + Sync + 'static,
{
    let (ins, outs) = in_out
        .split_once("->")
        .or_else(|| in_out.split_once('→'))
        .ok_or_else(|| HoshmapError::InvalidBinding {
            spec: in_out.to_string(),
            reason: "missing '->' between inputs and outputs".to_string(),
        })?;
    let spec = format!("{}:{} {} -> {}", field, COLLECTION, ins, outs);

    let element_name = name.to_string();
    let function = Function::new(format!("map({})", name), move |args| {
        let mut rest = Args::new();
        for (k, v) in args.named() {
            if k != COLLECTION {
                rest = rest.with_named(k.clone(), v.clone());
            }
        }
        match args.get(COLLECTION)? {
            Content::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    if let Some(mapped) = f(item, &rest)? {
                        out.push(mapped);
                    }
                }
                Ok(Content::Array(out))
            }
            Content::Object(object) => {
                let mut out = serde_json::Map::new();
                for (k, v) in object {
                    let Some(mapped) = f(&json!([k, v]), &rest)? else {
                        continue;
                    };
                    match mapped {
                        Content::Array(mut pair) if pair.len() == 2 => {
                            let value = pair.pop().unwrap_or(Content::Null);
                            let key = match pair.pop() {
                                Some(Content::String(key)) => key,
                                Some(other) => other.to_string(),
                                None => continue,
                            };
                            out.insert(key, value);
                        }
                        other => {
                            return Err(HoshmapError::function(
                                &element_name,
                                format!("expected a [key, value] pair, got {}", type_name(&other)),
                            ))
                        }
                    }
                }
                Ok(Content::Object(out))
            }
            other => Err(HoshmapError::NotIterable(format!(
                "{} ({})",
                COLLECTION,
                type_name(other)
            ))),
        }
    })
    .with_hosh(Hosh::of_parts(&[b"map", name.as_bytes()]));

    Binding::parse(function, &spec)
}
