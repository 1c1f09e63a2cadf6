//! Request bodies in either of the encodings the API accepts.

use axum::body::Bytes;
use axum::extract::{FromRequest, Request};
use axum::http::header::CONTENT_TYPE;
use serde_json::{Map, Value};

use crate::ApiFailure;

/// A JSON or form-encoded body, as a JSON value. Bracketed form keys
/// (`custom_fields[city]=x`) become nested objects.
#[derive(Debug, Clone, PartialEq)]
pub struct Payload(pub Value);

impl<S: Send + Sync> FromRequest<S> for Payload {
    type Rejection = ApiFailure;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_json = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("application/json"));
        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|_| ApiFailure::invalid_request("Could not read request body"))?;

        if bytes.is_empty() {
            return Ok(Payload(Value::Object(Map::new())));
        }
        if is_json {
            return serde_json::from_slice(&bytes)
                .map(Payload)
                .map_err(|_| ApiFailure::invalid_request("Request body is not valid JSON"));
        }
        let pairs: Vec<(String, String)> = serde_urlencoded::from_bytes(&bytes)
            .map_err(|_| ApiFailure::invalid_request("Request body is not valid form data"))?;
        Ok(Payload(nest_pairs(pairs)))
    }
}

impl Payload {
    pub fn str(&self, key: &str) -> Option<&str> {
        self.0.get(key)?.as_str().filter(|s| !s.is_empty())
    }
}

/// Fold `a[b][c]=v` pairs into `{"a": {"b": {"c": "v"}}}`.
pub fn nest_pairs(pairs: Vec<(String, String)>) -> Value {
    let mut root = Map::new();
    for (key, value) in pairs {
        let path = split_key(&key);
        insert(&mut root, &path, value);
    }
    Value::Object(root)
}

fn split_key(key: &str) -> Vec<String> {
    match key.split_once('[') {
        None => vec![key.to_string()],
        Some((head, rest)) => {
            let mut path = vec![head.to_string()];
            path.extend(
                rest.trim_end_matches(']')
                    .split("][")
                    .map(str::to_string),
            );
            path
        }
    }
}

fn insert(map: &mut Map<String, Value>, path: &[String], value: String) {
    let Some((first, rest)) = path.split_first() else {
        return;
    };
    if rest.is_empty() {
        map.insert(first.clone(), Value::String(value));
        return;
    }
    let child = map
        .entry(first.clone())
        .or_insert_with(|| Value::Object(Map::new()));
    if !child.is_object() {
        *child = Value::Object(Map::new());
    }
    if let Value::Object(inner) = child {
        insert(inner, rest, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn flat_pairs_stay_flat() {
        let value = nest_pairs(vec![("email".into(), "a@example.nl".into())]);
        assert_eq!(value, json!({"email": "a@example.nl"}));
    }

    #[test]
    fn bracketed_keys_nest() {
        let value = nest_pairs(vec![
            ("custom_fields[name]".into(), "Jan".into()),
            ("custom_fields[hobbies][0]".into(), "lezen".into()),
            ("custom_fields[hobbies][1]".into(), "fietsen".into()),
        ]);
        assert_eq!(
            value,
            json!({"custom_fields": {"name": "Jan", "hobbies": {"0": "lezen", "1": "fietsen"}}})
        );
    }
}
