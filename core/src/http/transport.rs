//! Request execution over the transfer primitive.
//!
//! # Design
//! `Transport` owns no connection state. Every `send_request` acquires a
//! fresh handle from the `TransferAdapter`, sets options one by one, performs
//! the transfer and closes the handle on every exit path. The raw output is
//! split into header block and body by the byte offset the handle reports,
//! never by searching for a blank line.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::ClientError;
use crate::http::factory::{DefaultResponseFactory, ResponseFactory, StreamFactory, TempStreamFactory};
use crate::http::message::{Headers, Message};
use crate::http::request::{Method, Request};
use crate::http::response::Response;
use crate::http::transfer::{SocketTransferAdapter, TransferAdapter, TransferFailure, TransferHandle, TransferOption};

/// Sends a request and returns the response, or a transport-level error.
pub trait HttpClient: Send + Sync + fmt::Debug {
    fn send_request(&self, request: &Request) -> Result<Response, ClientError>;
}

#[derive(Debug, Clone)]
pub struct Transport {
    adapter: Arc<dyn TransferAdapter>,
    stream_factory: Arc<dyn StreamFactory>,
    response_factory: Arc<dyn ResponseFactory>,
    request_timeout: Option<Duration>,
    connection_timeout: Option<Duration>,
}

impl Default for Transport {
    fn default() -> Self {
        Self::new(
            Arc::new(SocketTransferAdapter::new()),
            Arc::new(TempStreamFactory::default()),
            Arc::new(DefaultResponseFactory),
        )
    }
}

impl Transport {
    pub fn new(
        adapter: Arc<dyn TransferAdapter>,
        stream_factory: Arc<dyn StreamFactory>,
        response_factory: Arc<dyn ResponseFactory>,
    ) -> Self {
        Self {
            adapter,
            stream_factory,
            response_factory,
            request_timeout: None,
            connection_timeout: None,
        }
    }

    /// Limit for the whole transfer; `None` leaves the primitive's default.
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout
    }

    pub fn set_request_timeout(&mut self, timeout: Option<Duration>) {
        self.request_timeout = timeout;
    }

    pub fn connection_timeout(&self) -> Option<Duration> {
        self.connection_timeout
    }

    pub fn set_connection_timeout(&mut self, timeout: Option<Duration>) {
        self.connection_timeout = timeout;
    }

    fn transfer_options(&self, request: &Request) -> Vec<TransferOption> {
        let mut options = vec![
            TransferOption::Url(request.uri().to_string()),
            TransferOption::ReturnTransfer(true),
            TransferOption::IncludeHeader(true),
        ];
        if let Some(timeout) = self.connection_timeout {
            options.push(TransferOption::ConnectTimeout(timeout));
        }
        if let Some(timeout) = self.request_timeout {
            options.push(TransferOption::Timeout(timeout));
        }
        match request.method() {
            Method::Get => {}
            Method::Post => options.push(TransferOption::Post(true)),
            other => options.push(TransferOption::CustomRequest(other.as_str().to_string())),
        }

        let lines = request
            .headers()
            .iter()
            .flat_map(|(name, values)| values.iter().map(move |value| format!("{name}: {value}")))
            .collect();
        options.push(TransferOption::HttpHeader(lines));

        if request.body().size().unwrap_or(0) > 0 {
            options.push(TransferOption::PostFields(request.body().to_bytes()));
        }
        options
    }

    fn configure(&self, handle: &mut dyn TransferHandle, request: &Request) -> Result<(), ClientError> {
        for option in self.transfer_options(request) {
            let name = option.name();
            handle.set_option(option).map_err(|failure| {
                warn!(option = name, code = failure.code, "transfer option rejected");
                ClientError::new(format!("Could not set transfer option {name}"), Some(request))
                    .with_transfer(failure)
            })?;
        }
        Ok(())
    }

    fn build_response(
        &self,
        request: &Request,
        status: u16,
        raw_headers: &[u8],
        body: &[u8],
    ) -> Result<Response, ClientError> {
        let parsed = parse_headers(raw_headers);
        let partial = |message: String| {
            let mut headers = Headers::new();
            for (name, values) in &parsed {
                headers.append(name, values.clone());
            }
            ClientError::new(message, Some(request)).with_response(
                status,
                headers,
                String::from_utf8_lossy(body),
            )
        };

        let stream = self
            .stream_factory
            .create_stream(body)
            .map_err(|e| partial(format!("Could not create response stream: {e}")))?;

        let mut response = self.response_factory.create_response(status, "");
        for (name, values) in &parsed {
            response = response
                .with_header(name, values.as_slice())
                .map_err(|e| partial(format!("Invalid response header: {e}")))?;
        }
        Ok(response.with_body(Arc::new(stream)))
    }
}

impl HttpClient for Transport {
    fn send_request(&self, request: &Request) -> Result<Response, ClientError> {
        debug!(method = %request.method(), uri = %request.uri(), "sending request");

        let mut handle = self.adapter.init().map_err(|failure| {
            warn!(code = failure.code, "could not acquire transfer handle");
            ClientError::new("Could not initialize transfer session", Some(request)).with_transfer(failure)
        })?;

        if let Err(e) = self.configure(handle.as_mut(), request) {
            handle.close();
            return Err(e);
        }

        let output = match handle.perform() {
            Ok(output) => output,
            Err(failure) => {
                handle.close();
                warn!(code = failure.code, error = %failure.message, "transfer failed");
                return Err(execution_failed(request, failure));
            }
        };
        let status = handle.response_code();
        let header_size = handle.header_size();
        handle.close();
        debug!(status, header_size, bytes = output.len(), "transfer complete");

        let (raw_headers, body) = split_response_headers_and_body(&output, header_size);
        self.build_response(request, status, raw_headers, body)
    }
}

fn execution_failed(request: &Request, failure: TransferFailure) -> ClientError {
    ClientError::new(format!("transfer execution failed: {failure}"), Some(request)).with_transfer(failure)
}

/// Split raw transfer output at `header_size` bytes. An offset past the end
/// yields everything as headers and an empty body.
pub fn split_response_headers_and_body(content: &[u8], header_size: usize) -> (&[u8], &[u8]) {
    content.split_at(header_size.min(content.len()))
}

/// Parse a raw header block into lower-cased names with their values in
/// order of appearance. Lines without a colon (status lines, blank lines)
/// are skipped.
pub fn parse_headers(raw: &[u8]) -> Vec<(String, Vec<String>)> {
    let text = String::from_utf8_lossy(raw);
    let mut headers: Vec<(String, Vec<String>)> = Vec::new();
    for line in text.split("\r\n") {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let name = name.trim().to_ascii_lowercase();
        let value = value.trim().to_string();
        match headers.iter_mut().find(|(n, _)| *n == name) {
            Some((_, values)) => values.push(value),
            None => headers.push((name, vec![value])),
        }
    }
    headers
}
