//! Shared parts of requests and responses: protocol version, headers, body.
//!
//! # Design
//! `Request` and `Response` each embed a `MessageParts` and implement the
//! `Message` trait, which supplies every header/body/protocol accessor as a
//! provided method. All `with_*` methods return a modified copy and leave the
//! receiver untouched.
//!
//! Header names are stored lower-cased, in insertion order, each with an
//! ordered list of values. Names must match `[A-Za-z0-9-]+` and values must
//! not contain CR or LF; violations are rejected, never sanitized.

use std::sync::{Arc, LazyLock};

use regex::Regex;

use crate::error::MessageError;
use crate::http::stream::Stream;

/// Message bodies are shared between copies of a message.
pub type Body = Arc<Stream>;

static HEADER_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9-]+$").expect("static header pattern is valid"));

/// Case-insensitive, multi-value header collection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, Vec<String>)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    fn position(&self, name: &str) -> Option<usize> {
        let name = normalize_header_name(name);
        self.entries.iter().position(|(n, _)| *n == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// All values for `name`; empty when absent.
    pub fn get(&self, name: &str) -> &[String] {
        match self.position(name) {
            Some(i) => &self.entries[i].1,
            None => &[],
        }
    }

    /// Replace every value of `name`.
    pub fn set(&mut self, name: &str, values: Vec<String>) {
        match self.position(name) {
            Some(i) => self.entries[i].1 = values,
            None => self.entries.push((normalize_header_name(name), values)),
        }
    }

    pub fn append(&mut self, name: &str, values: Vec<String>) {
        match self.position(name) {
            Some(i) => self.entries[i].1.extend(values),
            None => self.entries.push((normalize_header_name(name), values)),
        }
    }

    pub fn remove(&mut self, name: &str) {
        if let Some(i) = self.position(name) {
            self.entries.remove(i);
        }
    }

    /// `(lower-cased name, values)` in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub fn normalize_header_name(name: &str) -> String {
    name.to_ascii_lowercase()
}

/// Reject invalid header names and values containing CR or LF.
pub fn validate_header(name: &str, values: &[String]) -> Result<(), MessageError> {
    if !HEADER_NAME.is_match(name) {
        return Err(MessageError::InvalidHeaderName(name.to_string()));
    }
    if values.iter().any(|v| v.contains(['\r', '\n'])) {
        return Err(MessageError::InvalidHeaderValue(name.to_string()));
    }
    Ok(())
}

/// Conversion into one or more header values.
pub trait IntoHeaderValues {
    fn into_header_values(self) -> Vec<String>;
}

impl IntoHeaderValues for &str {
    fn into_header_values(self) -> Vec<String> {
        vec![self.to_string()]
    }
}

impl IntoHeaderValues for String {
    fn into_header_values(self) -> Vec<String> {
        vec![self]
    }
}

impl IntoHeaderValues for &String {
    fn into_header_values(self) -> Vec<String> {
        vec![self.clone()]
    }
}

impl IntoHeaderValues for Vec<String> {
    fn into_header_values(self) -> Vec<String> {
        self
    }
}

impl IntoHeaderValues for &[String] {
    fn into_header_values(self) -> Vec<String> {
        self.to_vec()
    }
}

impl<const N: usize> IntoHeaderValues for [&str; N] {
    fn into_header_values(self) -> Vec<String> {
        self.iter().map(|v| v.to_string()).collect()
    }
}

/// State common to every message.
#[derive(Debug, Clone)]
pub struct MessageParts {
    pub(crate) protocol_version: String,
    pub(crate) headers: Headers,
    pub(crate) body: Body,
}

impl MessageParts {
    pub fn new(body: Body) -> Self {
        Self {
            protocol_version: "1.1".to_string(),
            headers: Headers::default(),
            body,
        }
    }
}

pub trait Message: Clone {
    fn parts(&self) -> &MessageParts;
    fn parts_mut(&mut self) -> &mut MessageParts;

    fn protocol_version(&self) -> &str {
        &self.parts().protocol_version
    }

    fn with_protocol_version(&self, version: &str) -> Self {
        let mut new = self.clone();
        new.parts_mut().protocol_version = version.to_string();
        new
    }

    fn headers(&self) -> &Headers {
        &self.parts().headers
    }

    fn has_header(&self, name: &str) -> bool {
        self.headers().contains(name)
    }

    fn header(&self, name: &str) -> &[String] {
        self.headers().get(name)
    }

    /// Values of `name` joined with `,`; empty when absent.
    fn header_line(&self, name: &str) -> String {
        self.header(name).join(",")
    }

    /// Replace all values of `name`.
    fn with_header(&self, name: &str, value: impl IntoHeaderValues) -> Result<Self, MessageError> {
        let values = value.into_header_values();
        validate_header(name, &values)?;
        let mut new = self.clone();
        new.parts_mut().headers.set(name, values);
        Ok(new)
    }

    /// Append to the values of `name`, creating it if absent.
    fn with_added_header(&self, name: &str, value: impl IntoHeaderValues) -> Result<Self, MessageError> {
        let values = value.into_header_values();
        validate_header(name, &values)?;
        let mut new = self.clone();
        new.parts_mut().headers.append(name, values);
        Ok(new)
    }

    fn without_header(&self, name: &str) -> Self {
        let mut new = self.clone();
        new.parts_mut().headers.remove(name);
        new
    }

    fn body(&self) -> &Body {
        &self.parts().body
    }

    fn with_body(&self, body: Body) -> Self {
        let mut new = self.clone();
        new.parts_mut().body = body;
        new
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::response::Response;

    fn message() -> Response {
        Response::new(200, "")
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let msg = message().with_header("Content-Type", "a").unwrap();
        assert!(msg.has_header("content-type"));
        assert_eq!(msg.header_line("CONTENT-TYPE"), "a");
        assert_eq!(msg.header("content-TYPE"), ["a"]);
    }

    #[test]
    fn with_header_replaces_case_insensitively() {
        let msg = message()
            .with_header("X-Foo", "one")
            .unwrap()
            .with_header("x-foo", "two")
            .unwrap();
        assert_eq!(msg.header("X-FOO"), ["two"]);
        assert_eq!(msg.headers().len(), 1);
    }

    #[test]
    fn added_headers_keep_insertion_order() {
        let msg = message()
            .with_added_header("X-Custom", "v1")
            .unwrap()
            .with_added_header("x-custom", "v2")
            .unwrap();
        assert_eq!(msg.header("X-Custom"), ["v1", "v2"]);
        assert_eq!(msg.header_line("X-Custom"), "v1,v2");
    }

    #[test]
    fn invalid_header_name_is_rejected() {
        let err = message().with_header("Bad Name!", "x").unwrap_err();
        assert_eq!(err, MessageError::InvalidHeaderName("Bad Name!".to_string()));
        assert!(message().with_added_header("", "x").is_err());
    }

    #[test]
    fn header_value_with_newline_is_rejected() {
        let err = message().with_header("X", "line1\nline2").unwrap_err();
        assert_eq!(err, MessageError::InvalidHeaderValue("X".to_string()));
        assert!(message().with_added_header("X", ["ok", "bad\r"]).is_err());
    }

    #[test]
    fn without_header_removes_entry() {
        let original = message().with_header("X-Gone", "1").unwrap();
        let removed = original.without_header("x-gone");
        assert!(!removed.has_header("X-Gone"));
        assert!(original.has_header("X-Gone"));
        assert_eq!(removed.header_line("X-Gone"), "");
    }

    #[test]
    fn with_methods_do_not_mutate_original() {
        let original = message();
        let changed = original
            .with_protocol_version("2")
            .with_header("X-A", "1")
            .unwrap();
        assert_eq!(original.protocol_version(), "1.1");
        assert!(!original.has_header("X-A"));
        assert_eq!(changed.protocol_version(), "2");
    }

    #[test]
    fn headers_keep_name_order() {
        let msg = message()
            .with_header("B", "1")
            .unwrap()
            .with_header("A", "2")
            .unwrap();
        let names: Vec<_> = msg.headers().iter().map(|(n, _)| n).collect();
        assert_eq!(names, ["b", "a"]);
    }
}
