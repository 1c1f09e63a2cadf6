//! Error types for the Laposta client.
//!
//! # Design
//! Failures are split into two tiers. `ClientError` means no usable HTTP
//! response was obtained (connection refused, timeout, malformed reply).
//! `ApiError` means the server did answer, but with a non-2xx status or a body
//! that is not JSON. Callers usually retry the former and inspect the latter.
//!
//! `MessageError` and `StreamError` cover the message value types: invalid
//! header names, unknown methods, detached streams and the like.

use std::fmt;
use std::io;
use std::sync::OnceLock;

use serde_json::Value;
use thiserror::Error;

use crate::http::message::{Headers, Message};
use crate::http::request::Request;
use crate::http::response::Response;
use crate::http::transfer::TransferFailure;

/// Argument errors raised by the HTTP message types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessageError {
    #[error("Invalid header name: \"{0}\".")]
    InvalidHeaderName(String),

    #[error("Invalid header value for \"{0}\". Cannot contain CR or LF characters.")]
    InvalidHeaderValue(String),

    #[error("Invalid HTTP method provided: \"{0}\".")]
    InvalidMethod(String),

    #[error("Invalid request target \"{0}\"; it must not contain whitespace.")]
    InvalidRequestTarget(String),

    #[error("Unable to parse URI \"{0}\".")]
    InvalidUri(String),
}

/// Errors raised by `Stream` operations.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("Stream must be a valid resource")]
    InvalidResource,

    #[error("No stream available")]
    Detached,

    #[error("Stream is not readable")]
    NotReadable,

    #[error("Stream is not writable")]
    NotWritable,

    #[error("Stream is not seekable")]
    NotSeekable,

    /// The underlying primitive call failed.
    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: io::Error,
    },
}

impl StreamError {
    pub(crate) fn io(context: &'static str) -> impl FnOnce(io::Error) -> StreamError {
        move |source| StreamError::Io { context, source }
    }
}

/// A transport-level failure: no HTTP response was obtained, or the one that
/// arrived could not be turned into a `Response`.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ClientError {
    message: String,
    request: Option<Box<Request>>,
    status_code: u16,
    response_headers: Headers,
    response_body: String,
    transfer: Option<TransferFailure>,
}

impl ClientError {
    pub fn new(message: impl Into<String>, request: Option<&Request>) -> Self {
        Self {
            message: message.into(),
            request: request.cloned().map(Box::new),
            status_code: 0,
            response_headers: Headers::default(),
            response_body: String::new(),
            transfer: None,
        }
    }

    /// Attach the transfer failure that caused this error.
    pub fn with_transfer(mut self, failure: TransferFailure) -> Self {
        self.transfer = Some(failure);
        self
    }

    /// Attach whatever partial response data was available.
    pub fn with_response(mut self, status_code: u16, headers: Headers, body: impl Into<String>) -> Self {
        self.status_code = status_code;
        self.response_headers = headers;
        self.response_body = body.into();
        self
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn request(&self) -> Option<&Request> {
        self.request.as_deref()
    }

    /// Status code of the partial response, `0` when none was received.
    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    pub fn response_headers(&self) -> &Headers {
        &self.response_headers
    }

    pub fn response_body(&self) -> &str {
        &self.response_body
    }

    pub fn transfer_failure(&self) -> Option<&TransferFailure> {
        self.transfer.as_ref()
    }

    /// The transfer primitive's error code, if the failure came from it.
    pub fn transfer_code(&self) -> Option<u32> {
        self.transfer.as_ref().map(|f| f.code)
    }

    pub fn is_timeout(&self) -> bool {
        self.transfer
            .as_ref()
            .is_some_and(|f| f.code == TransferFailure::OPERATION_TIMEDOUT)
    }
}

/// The API answered, but with an error status or an undecodable body.
///
/// Bodies and the decoded JSON are read lazily and cached, so the error
/// accessors can be called repeatedly without re-reading the stream.
#[derive(Error)]
pub struct ApiError {
    message: String,
    request: Box<Request>,
    response: Box<Response>,
    #[source]
    source: Option<serde_json::Error>,
    request_body: OnceLock<String>,
    response_body: OnceLock<String>,
    response_data: OnceLock<Value>,
}

impl ApiError {
    pub fn new(message: impl Into<String>, request: Request, response: Response) -> Self {
        Self {
            message: message.into(),
            request: Box::new(request),
            response: Box::new(response),
            source: None,
            request_body: OnceLock::new(),
            response_body: OnceLock::new(),
            response_data: OnceLock::new(),
        }
    }

    pub(crate) fn with_source(mut self, source: serde_json::Error) -> Self {
        self.source = Some(source);
        self
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn response(&self) -> &Response {
        &self.response
    }

    pub fn http_status(&self) -> u16 {
        self.response.status_code()
    }

    pub fn request_body(&self) -> &str {
        self.request_body.get_or_init(|| self.request.body().to_string())
    }

    pub fn response_body(&self) -> &str {
        self.response_body.get_or_init(|| self.response.body().to_string())
    }

    /// The decoded response body; an empty object when the body is empty or
    /// not JSON.
    pub fn response_data(&self) -> &Value {
        self.response_data.get_or_init(|| {
            let body = self.response_body();
            if body.is_empty() {
                return Value::Object(Default::default());
            }
            serde_json::from_str(body).unwrap_or_else(|_| Value::Object(Default::default()))
        })
    }

    fn error_field(&self, key: &str) -> Option<&Value> {
        self.response_data().get("error")?.get(key)
    }

    pub fn error_type(&self) -> Option<&str> {
        self.error_field("type")?.as_str()
    }

    /// `error.code`, accepting both numbers and numeric strings.
    pub fn error_code(&self) -> Option<i64> {
        match self.error_field("code")? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn error_parameter(&self) -> Option<&str> {
        self.error_field("parameter")?.as_str()
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_field("message")?.as_str()
    }

    /// Multi-line report of the failure, suitable for logs.
    pub fn details(&self) -> String {
        let mut out = format!("{}\nHTTP Status: {}", self.message, self.http_status());
        if let Some(code) = self.error_code() {
            out.push_str(&format!("\nError Code: {code}"));
        }
        if let Some(kind) = self.error_type() {
            out.push_str(&format!("\nError Type: {kind}"));
        }
        if let Some(parameter) = self.error_parameter() {
            out.push_str(&format!("\nError Parameter: {parameter}"));
        }
        if let Some(message) = self.error_message() {
            out.push_str(&format!("\nError Message: {message}"));
        }
        out.push_str(&format!("\nResponse Body: {}", self.response_body()));
        out
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl fmt::Debug for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiError")
            .field("message", &self.message)
            .field("method", &self.request.method())
            .field("uri", &self.request.uri().to_string())
            .field("status", &self.response.status_code())
            .finish()
    }
}

/// Any failure produced by the client.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Message(#[from] MessageError),

    #[error(transparent)]
    Stream(#[from] StreamError),

    /// The request payload could not be encoded.
    #[error("failed to encode request body: {0}")]
    Encode(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    pub fn as_api(&self) -> Option<&ApiError> {
        match self {
            Error::Api(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_client(&self) -> Option<&ClientError> {
        match self {
            Error::Client(e) => Some(e),
            _ => None,
        }
    }
}
