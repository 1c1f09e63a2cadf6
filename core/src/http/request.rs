//! Outgoing HTTP requests.

use std::fmt;
use std::str::FromStr;

use crate::error::MessageError;
use crate::http::message::{Body, Message, MessageParts};
use crate::http::uri::Uri;

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
    Head,
    Options,
    Patch,
    Trace,
    Connect,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Head => "HEAD",
            Method::Options => "OPTIONS",
            Method::Patch => "PATCH",
            Method::Trace => "TRACE",
            Method::Connect => "CONNECT",
        }
    }
}

impl FromStr for Method {
    type Err = MessageError;

    /// Case-insensitive; anything outside the standard set is rejected.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "DELETE" => Ok(Method::Delete),
            "HEAD" => Ok(Method::Head),
            "OPTIONS" => Ok(Method::Options),
            "PATCH" => Ok(Method::Patch),
            "TRACE" => Ok(Method::Trace),
            "CONNECT" => Ok(Method::Connect),
            other => Err(MessageError::InvalidMethod(other.to_string())),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct Request {
    parts: MessageParts,
    method: Method,
    uri: Uri,
    request_target: Option<String>,
}

impl Request {
    /// Build a request; the `Host` header is taken from `uri` when it has one.
    pub fn new(method: &str, uri: Uri, body: Body) -> Result<Self, MessageError> {
        let method = method.parse()?;
        let mut request = Self {
            parts: MessageParts::new(body),
            method,
            uri,
            request_target: None,
        };
        request.update_host_from_uri();
        Ok(request)
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn with_method(&self, method: &str) -> Result<Self, MessageError> {
        let method = method.parse()?;
        Ok(Self { method, ..self.clone() })
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Replace the URI. Unless `preserve_host` is set, the `Host` header is
    /// recomputed from the new URI (left alone if it has no host).
    pub fn with_uri(&self, uri: Uri, preserve_host: bool) -> Self {
        let mut new = Self { uri, ..self.clone() };
        if !preserve_host {
            new.update_host_from_uri();
        }
        new
    }

    /// The explicit target if one was set, otherwise `path[?query]` of the
    /// current URI with an empty path rendered as `/`.
    pub fn request_target(&self) -> String {
        if let Some(target) = &self.request_target {
            return target.clone();
        }
        let path = match self.uri.path() {
            "" => "/",
            path => path,
        };
        match self.uri.query() {
            "" => path.to_string(),
            query => format!("{path}?{query}"),
        }
    }

    pub fn with_request_target(&self, target: &str) -> Result<Self, MessageError> {
        if target.chars().any(char::is_whitespace) {
            return Err(MessageError::InvalidRequestTarget(target.to_string()));
        }
        Ok(Self {
            request_target: Some(target.to_string()),
            ..self.clone()
        })
    }

    fn update_host_from_uri(&mut self) {
        let host = self.uri.host();
        if host.is_empty() {
            return;
        }
        let host = match self.uri.port() {
            Some(port) if port != 0 => format!("{host}:{port}"),
            _ => host.to_string(),
        };
        self.parts.headers.set("host", vec![host]);
    }
}

impl Message for Request {
    fn parts(&self) -> &MessageParts {
        &self.parts
    }

    fn parts_mut(&mut self) -> &mut MessageParts {
        &mut self.parts
    }
}
