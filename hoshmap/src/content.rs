//! Content carried by values.
//!
//! Content is plain JSON. Objects keep their insertion order, which matters
//! both for identities (the canonical bytes follow that order) and for
//! multi-output results returned as objects.

use crate::hosh::Hosh;
use crate::value::{StrictValue, Value};

/// The content of a value.
pub type Content = serde_json::Value;

/// Canonical byte encoding used to identify content.
pub fn canonical_bytes(content: &Content) -> Vec<u8> {
    content.to_string().into_bytes()
}

/// Identity of a piece of content.
pub fn content_hosh(content: &Content) -> Hosh {
    Hosh::of(&canonical_bytes(content))
}

/// Short name of the JSON type, for error messages.
pub fn type_name(content: &Content) -> &'static str {
    match content {
        Content::Null => "null",
        Content::Bool(_) => "bool",
        Content::Number(_) => "number",
        Content::String(_) => "string",
        Content::Array(_) => "array",
        Content::Object(_) => "object",
    }
}

/// Conversion into an identified value.
///
/// Raw content is wrapped into a strict value; values pass through untouched.
/// JSON has no NaN or infinity, so non-finite floats become `null` and share
/// its identity.
pub trait IntoValue {
    fn into_value(self) -> Value;
}

impl IntoValue for Value {
    fn into_value(self) -> Value {
        self
    }
}

impl IntoValue for &Value {
    fn into_value(self) -> Value {
        self.clone()
    }
}

impl IntoValue for StrictValue {
    fn into_value(self) -> Value {
        Value::Strict(std::sync::Arc::new(self))
    }
}

macro_rules! into_strict {
    ($($ty:ty),* $(,)?) => {
        $(
            impl IntoValue for $ty {
                fn into_value(self) -> Value {
                    Value::strict(Content::from(self))
                }
            }
        )*
    };
}

into_strict!(
    Content,
    bool,
    i32,
    i64,
    u32,
    u64,
    f64,
    String,
    &str,
    Vec<Content>,
    serde_json::Map<String, Content>,
);

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_canonical_bytes_follow_order() {
        let a = json!({"x": 1, "y": 2});
        let b = json!({"y": 2, "x": 1});
        assert_eq!(canonical_bytes(&a), b"{\"x\":1,\"y\":2}".to_vec());
        assert_ne!(content_hosh(&a), content_hosh(&b));
    }

    #[test]
    fn test_into_value_wraps_raw_content() {
        let v = 3i64.into_value();
        assert!(v.is_evaluated());
        assert_eq!(v.hosh(), content_hosh(&json!(3)));

        let same = v.clone().into_value();
        assert_eq!(same.hosh(), v.hosh());
    }

    #[test]
    fn test_non_finite_floats_become_null() {
        for x in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let v = x.into_value();
            assert_eq!(v.value().unwrap(), Content::Null);
            assert_eq!(v.hosh(), content_hosh(&Content::Null));
        }
        assert_ne!(1.5f64.into_value().hosh(), content_hosh(&Content::Null));
    }

    #[test]
    fn test_type_name() {
        assert_eq!(type_name(&json!([1])), "array");
        assert_eq!(type_name(&json!(null)), "null");
    }
}
