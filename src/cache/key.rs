//! Cache key derivation.
//!
//! A key is the canonical JSON rendering of a request input. Object fields are
//! sorted recursively before serializing, so inputs that differ only in field
//! order collide on the same key. Keys are plain strings and stay stable across
//! process restarts; they are not hashes.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::RequestError;

/// Derives the cache key for `input`.
///
/// Scalars serialize directly (`"abc"` becomes `"\"abc\""`, `42` becomes `"42"`).
/// Structured inputs are canonicalized with [`sort_object_keys`] first.
///
/// # Errors
///
/// Returns [`RequestError::Key`] when `input` cannot be represented as JSON,
/// e.g. a map whose keys are not strings.
///
/// # Examples
///
/// ```
/// use reqcache::cache::derive_key;
/// use serde_json::json;
///
/// let a = derive_key(&json!({ "b": 1, "a": 2 })).unwrap();
/// let b = derive_key(&json!({ "a": 2, "b": 1 })).unwrap();
/// assert_eq!(a, b);
/// assert_eq!(a, r#"{"a":2,"b":1}"#);
/// ```
pub fn derive_key<T>(input: &T) -> Result<String, RequestError>
where
    T: Serialize + ?Sized,
{
    let value = sort_object_keys(serde_json::to_value(input)?);
    Ok(serde_json::to_string(&value)?)
}

/// Rebuilds `value` with every object's fields in lexicographic order, at every depth.
///
/// Fields are reinserted in sorted order, so the result serializes canonically
/// whether or not serde_json keeps insertion order. Array element order is
/// significant and left untouched.
pub fn sort_object_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut fields: Vec<(String, Value)> = map.into_iter().collect();
            fields.sort_by(|(a, _), (b, _)| a.cmp(b));
            let sorted: Map<String, Value> = fields
                .into_iter()
                .map(|(k, v)| (k, sort_object_keys(v)))
                .collect();
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_object_keys).collect()),
        scalar => scalar,
    }
}
