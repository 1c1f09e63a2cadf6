//! Incoming HTTP responses.

use std::sync::Arc;

use crate::http::message::{Message, MessageParts};
use crate::http::stream::Stream;

#[derive(Debug, Clone)]
pub struct Response {
    parts: MessageParts,
    status_code: u16,
    reason_phrase: String,
}

impl Response {
    /// A response with an empty body. An empty `reason_phrase` is replaced by
    /// the default phrase for `status_code`.
    pub fn new(status_code: u16, reason_phrase: &str) -> Self {
        Self {
            parts: MessageParts::new(Arc::new(Stream::empty())),
            status_code,
            reason_phrase: resolve_reason_phrase(status_code, reason_phrase),
        }
    }

    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    pub fn reason_phrase(&self) -> &str {
        &self.reason_phrase
    }

    pub fn with_status(&self, code: u16, reason_phrase: &str) -> Self {
        Self {
            status_code: code,
            reason_phrase: resolve_reason_phrase(code, reason_phrase),
            ..self.clone()
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}

fn resolve_reason_phrase(code: u16, given: &str) -> String {
    if given.is_empty() {
        default_reason_phrase(code).to_string()
    } else {
        given.to_string()
    }
}

/// Reason phrases for the statuses the API documents; empty for the rest.
pub fn default_reason_phrase(code: u16) -> &'static str {
    match code {
        200 => "OK",
        201 => "Created",
        400 => "Bad Request",
        401 => "Unauthorized",
        402 => "Request Failed",
        404 => "Not Found",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        _ => "",
    }
}

impl Message for Response {
    fn parts(&self) -> &MessageParts {
        &self.parts
    }

    fn parts_mut(&mut self) -> &mut MessageParts {
        &mut self.parts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_reason_phrases() {
        assert_eq!(Response::new(200, "").reason_phrase(), "OK");
        assert_eq!(Response::new(201, "").reason_phrase(), "Created");
        assert_eq!(Response::new(402, "").reason_phrase(), "Request Failed");
        assert_eq!(Response::new(404, "").reason_phrase(), "Not Found");
        assert_eq!(Response::new(429, "").reason_phrase(), "Too Many Requests");
    }

    #[test]
    fn unknown_status_gets_empty_phrase() {
        assert_eq!(Response::new(418, "").reason_phrase(), "");
        assert_eq!(Response::new(503, "").reason_phrase(), "");
    }

    #[test]
    fn explicit_phrase_wins() {
        assert_eq!(Response::new(200, "Fine").reason_phrase(), "Fine");
    }

    #[test]
    fn with_status_returns_new_instance() {
        let original = Response::new(200, "");
        let changed = original.with_status(404, "");
        assert_eq!(changed.status_code(), 404);
        assert_eq!(changed.reason_phrase(), "Not Found");
        assert_eq!(original.status_code(), 200);
        assert_eq!(original.reason_phrase(), "OK");
    }

    #[test]
    fn body_is_always_present() {
        let response = Response::new(204, "");
        assert_eq!(response.body().size(), Some(0));
        assert_eq!(response.body().to_string(), "");
    }

    #[test]
    fn success_range() {
        assert!(Response::new(200, "").is_success());
        assert!(Response::new(299, "").is_success());
        assert!(!Response::new(300, "").is_success());
        assert!(!Response::new(199, "").is_success());
    }
}
