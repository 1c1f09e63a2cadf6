//! `application/x-www-form-urlencoded` encoding of JSON payloads.
//!
//! Nested objects and arrays flatten into bracketed keys
//! (`custom_fields[city]=Utrecht`, `tags[0]=a`). Booleans encode as `1`/`0`
//! and nulls are left out. Keys keep their insertion order.

use serde_json::Value;
use url::form_urlencoded::Serializer;

/// Encode an object (or array) payload. Scalars at the top level have no key
/// to attach to and encode as an empty string.
pub fn build_query(data: &Value) -> String {
    let mut serializer = Serializer::new(String::new());
    match data {
        Value::Object(map) => {
            for (key, value) in map {
                append(&mut serializer, key, value);
            }
        }
        Value::Array(items) => {
            for (index, value) in items.iter().enumerate() {
                append(&mut serializer, &index.to_string(), value);
            }
        }
        _ => {}
    }
    serializer.finish()
}

/// Encode flat key/value pairs, in order.
pub fn build_query_pairs<K: AsRef<str>, V: AsRef<str>>(pairs: &[(K, V)]) -> String {
    Serializer::new(String::new())
        .extend_pairs(pairs.iter().map(|(k, v)| (k.as_ref(), v.as_ref())))
        .finish()
}

fn append(serializer: &mut Serializer<'_, String>, key: &str, value: &Value) {
    match value {
        Value::Null => {}
        Value::Bool(flag) => {
            serializer.append_pair(key, if *flag { "1" } else { "0" });
        }
        Value::Number(number) => {
            serializer.append_pair(key, &number.to_string());
        }
        Value::String(text) => {
            serializer.append_pair(key, text);
        }
        Value::Array(items) => {
            for (index, item) in items.iter().enumerate() {
                append(serializer, &format!("{key}[{index}]"), item);
            }
        }
        Value::Object(map) => {
            for (name, item) in map {
                append(serializer, &format!("{key}[{name}]"), item);
            }
        }
    }
}
