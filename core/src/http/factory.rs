//! Factories for the message types.
//!
//! The transport and the pipeline only ever create messages through these
//! traits, so any of them can be replaced by a test double or a different
//! implementation.

use std::fmt;
use std::sync::Arc;

use crate::error::{Error, MessageError, StreamError};
use crate::http::request::Request;
use crate::http::response::Response;
use crate::http::stream::{IoStreamAdapter, Resource, Stream, StreamAdapter};
use crate::http::uri::Uri;

pub trait RequestFactory: Send + Sync + fmt::Debug {
    fn create_request(&self, method: &str, uri: Uri) -> Result<Request, Error>;
}

pub trait ResponseFactory: Send + Sync + fmt::Debug {
    fn create_response(&self, code: u16, reason_phrase: &str) -> Response;
}

pub trait StreamFactory: Send + Sync + fmt::Debug {
    fn create_stream(&self, content: &[u8]) -> Result<Stream, StreamError>;
}

pub trait UriFactory: Send + Sync + fmt::Debug {
    fn create_uri(&self, uri: &str) -> Result<Uri, MessageError>;
}

/// Streams over temporary resources opened through a `StreamAdapter`.
#[derive(Debug, Clone)]
pub struct TempStreamFactory {
    adapter: Arc<dyn StreamAdapter>,
}

impl TempStreamFactory {
    pub fn new(adapter: Arc<dyn StreamAdapter>) -> Self {
        Self { adapter }
    }

    /// Wrap an already open resource.
    pub fn create_stream_from_resource(&self, resource: Resource) -> Result<Stream, StreamError> {
        Stream::new(resource, Arc::clone(&self.adapter))
    }
}

impl Default for TempStreamFactory {
    fn default() -> Self {
        Self::new(Arc::new(IoStreamAdapter))
    }
}

impl StreamFactory for TempStreamFactory {
    fn create_stream(&self, content: &[u8]) -> Result<Stream, StreamError> {
        let mut resource = self
            .adapter
            .open_temp("r+")
            .map_err(StreamError::io("Could not create temporary stream"))?;
        if !content.is_empty() {
            self.adapter
                .write(&mut resource, content)
                .map_err(StreamError::io("Failed to write to the stream"))?;
            self.adapter
                .rewind(&mut resource)
                .map_err(StreamError::io("Unable to rewind the stream"))?;
        }
        Stream::new(resource, Arc::clone(&self.adapter))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultUriFactory;

impl UriFactory for DefaultUriFactory {
    fn create_uri(&self, uri: &str) -> Result<Uri, MessageError> {
        Uri::parse(uri)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultResponseFactory;

impl ResponseFactory for DefaultResponseFactory {
    fn create_response(&self, code: u16, reason_phrase: &str) -> Response {
        Response::new(code, reason_phrase)
    }
}

/// Requests with an empty body from the stream factory.
#[derive(Debug, Clone)]
pub struct DefaultRequestFactory {
    stream_factory: Arc<dyn StreamFactory>,
}

impl DefaultRequestFactory {
    pub fn new(stream_factory: Arc<dyn StreamFactory>) -> Self {
        Self { stream_factory }
    }
}

impl Default for DefaultRequestFactory {
    fn default() -> Self {
        Self::new(Arc::new(TempStreamFactory::default()))
    }
}

impl RequestFactory for DefaultRequestFactory {
    fn create_request(&self, method: &str, uri: Uri) -> Result<Request, Error> {
        let body = self.stream_factory.create_stream(b"")?;
        Ok(Request::new(method, uri, Arc::new(body))?)
    }
}
