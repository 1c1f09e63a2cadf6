//! The low-level transfer primitive underneath `Transport`.
//!
//! # Design
//! A transfer is driven the way a libcurl easy handle is: acquire a handle,
//! set options one at a time (each can fail), perform the transfer, read the
//! status and header size back, close. The output of a transfer is the raw
//! header block followed by the (de-chunked) body, and `header_size()`
//! reports where one ends and the other begins.
//!
//! `SocketTransferAdapter` is the default implementation: one HTTP/1.1
//! exchange over a fresh TCP connection (TLS via rustls for `https`), closed
//! when the response has been read. There is no pooling, redirect handling
//! or retrying. Failures carry curl-compatible error codes so callers can
//! tell a timeout (28) from a refused connection (7).

use std::fmt;
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use rustls::pki_types::ServerName;
use rustls::{ClientConfig, ClientConnection, RootCertStore, StreamOwned};
use thiserror::Error;

use crate::http::uri::Uri;

/// A single configurable aspect of a transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOption {
    Url(String),
    /// Return the output from `perform` instead of writing it to stdout.
    ReturnTransfer(bool),
    /// Prefix the output with the raw response header block.
    IncludeHeader(bool),
    ConnectTimeout(Duration),
    /// Limit for the whole transfer, connect included.
    Timeout(Duration),
    Post(bool),
    /// Method override for anything other than GET/POST.
    CustomRequest(String),
    /// Complete `name: value` header lines.
    HttpHeader(Vec<String>),
    PostFields(Vec<u8>),
}

impl TransferOption {
    pub fn name(&self) -> &'static str {
        match self {
            TransferOption::Url(_) => "URL",
            TransferOption::ReturnTransfer(_) => "RETURNTRANSFER",
            TransferOption::IncludeHeader(_) => "HEADER",
            TransferOption::ConnectTimeout(_) => "CONNECTTIMEOUT",
            TransferOption::Timeout(_) => "TIMEOUT",
            TransferOption::Post(_) => "POST",
            TransferOption::CustomRequest(_) => "CUSTOMREQUEST",
            TransferOption::HttpHeader(_) => "HTTPHEADER",
            TransferOption::PostFields(_) => "POSTFIELDS",
        }
    }
}

/// Error code and message reported by a failed transfer step.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("[{code}] {message}")]
pub struct TransferFailure {
    pub code: u32,
    pub message: String,
}

impl TransferFailure {
    pub const UNSUPPORTED_PROTOCOL: u32 = 1;
    pub const FAILED_INIT: u32 = 2;
    pub const URL_MALFORMAT: u32 = 3;
    pub const COULDNT_RESOLVE_HOST: u32 = 6;
    pub const COULDNT_CONNECT: u32 = 7;
    pub const WEIRD_SERVER_REPLY: u32 = 8;
    pub const OPERATION_TIMEDOUT: u32 = 28;
    pub const SSL_CONNECT_ERROR: u32 = 35;
    pub const BAD_FUNCTION_ARGUMENT: u32 = 43;
    pub const SEND_ERROR: u32 = 55;
    pub const RECV_ERROR: u32 = 56;

    pub fn new(code: u32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// One in-flight transfer. Single use.
pub trait TransferHandle: Send {
    fn set_option(&mut self, option: TransferOption) -> Result<(), TransferFailure>;

    /// Run the transfer and return its output.
    fn perform(&mut self) -> Result<Vec<u8>, TransferFailure>;

    /// Final HTTP status of the last `perform`.
    fn response_code(&self) -> u16;

    /// Byte length of all header blocks at the start of the output.
    fn header_size(&self) -> usize;

    /// Release the handle and anything it still holds.
    fn close(self: Box<Self>);
}

/// Hands out transfer handles.
pub trait TransferAdapter: Send + Sync + fmt::Debug {
    fn init(&self) -> Result<Box<dyn TransferHandle>, TransferFailure>;
}

/// Plain-socket HTTP/1.1 transfers with rustls for `https`.
#[derive(Debug, Clone, Default)]
pub struct SocketTransferAdapter {
    tls: Arc<OnceLock<Arc<ClientConfig>>>,
}

impl SocketTransferAdapter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TransferAdapter for SocketTransferAdapter {
    fn init(&self) -> Result<Box<dyn TransferHandle>, TransferFailure> {
        Ok(Box::new(SocketHandle::new(Arc::clone(&self.tls))))
    }
}

#[derive(Debug)]
pub struct SocketHandle {
    tls: Arc<OnceLock<Arc<ClientConfig>>>,
    url: Option<String>,
    return_transfer: bool,
    include_header: bool,
    connect_timeout: Option<Duration>,
    timeout: Option<Duration>,
    post: bool,
    custom_request: Option<String>,
    headers: Vec<String>,
    post_fields: Option<Vec<u8>>,
    response_code: u16,
    header_size: usize,
}

impl SocketHandle {
    fn new(tls: Arc<OnceLock<Arc<ClientConfig>>>) -> Self {
        Self {
            tls,
            url: None,
            return_transfer: false,
            include_header: false,
            connect_timeout: None,
            timeout: None,
            post: false,
            custom_request: None,
            headers: Vec::new(),
            post_fields: None,
            response_code: 0,
            header_size: 0,
        }
    }

    fn method(&self) -> &str {
        match &self.custom_request {
            Some(method) => method,
            None if self.post || self.post_fields.is_some() => "POST",
            None => "GET",
        }
    }

    fn has_header(&self, name: &str) -> bool {
        self.headers.iter().any(|line| {
            line.split_once(':')
                .is_some_and(|(n, _)| n.trim().eq_ignore_ascii_case(name))
        })
    }

    fn encode_request(&self, target: &Target) -> Vec<u8> {
        let mut head = format!("{} {} HTTP/1.1\r\n", self.method(), target.request_target);
        if !self.has_header("host") {
            head.push_str(&format!("Host: {}\r\n", target.host_header));
        }
        if !self.has_header("accept") {
            head.push_str("Accept: */*\r\n");
        }
        for line in &self.headers {
            head.push_str(line);
            head.push_str("\r\n");
        }
        match &self.post_fields {
            Some(body) => {
                if !self.has_header("content-type") {
                    head.push_str("Content-Type: application/x-www-form-urlencoded\r\n");
                }
                if !self.has_header("content-length") {
                    head.push_str(&format!("Content-Length: {}\r\n", body.len()));
                }
            }
            None if self.method() == "POST" => head.push_str("Content-Length: 0\r\n"),
            None => {}
        }
        head.push_str("Connection: close\r\n\r\n");

        let mut bytes = head.into_bytes();
        if let Some(body) = &self.post_fields {
            bytes.extend_from_slice(body);
        }
        bytes
    }

    fn tls_config(&self) -> Result<Arc<ClientConfig>, TransferFailure> {
        if let Some(config) = self.tls.get() {
            return Ok(Arc::clone(config));
        }
        let config = build_tls_config()?;
        Ok(Arc::clone(self.tls.get_or_init(|| config)))
    }

    fn connect(&self, target: &Target, budget: &Budget) -> Result<Connection, TransferFailure> {
        let tcp = connect_tcp(target, self.connect_timeout, budget)?;
        if !target.tls {
            return Ok(Connection::Plain(tcp));
        }

        let server_name = ServerName::try_from(target.host.clone()).map_err(|_| {
            TransferFailure::new(
                TransferFailure::URL_MALFORMAT,
                format!("Invalid TLS server name: {}", target.host),
            )
        })?;
        let mut tls = ClientConnection::new(self.tls_config()?, server_name).map_err(|e| {
            TransferFailure::new(TransferFailure::SSL_CONNECT_ERROR, format!("SSL connect error: {e}"))
        })?;
        let mut tcp = tcp;
        while tls.is_handshaking() {
            budget.arm(&tcp, 0)?;
            tls.complete_io(&mut tcp).map_err(|e| {
                if is_timeout(&e) {
                    budget.timed_out(0)
                } else {
                    TransferFailure::new(TransferFailure::SSL_CONNECT_ERROR, format!("SSL connect error: {e}"))
                }
            })?;
        }
        Ok(Connection::Tls(Box::new(StreamOwned::new(tls, tcp))))
    }

    fn receive(&self, conn: &mut Connection, budget: &Budget) -> Result<Vec<u8>, TransferFailure> {
        let mut progress = ReplyProgress::new(self.method() == "HEAD");
        let mut raw = Vec::new();
        let mut buf = [0u8; 16 * 1024];
        loop {
            if progress.complete(&raw)? {
                break;
            }
            budget.arm(conn.socket(), raw.len())?;
            match conn.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => raw.extend_from_slice(&buf[..n]),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                // Peers that close without a TLS close_notify.
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof && !raw.is_empty() => break,
                Err(e) if is_timeout(&e) => return Err(budget.timed_out(raw.len())),
                Err(e) => {
                    return Err(TransferFailure::new(
                        TransferFailure::RECV_ERROR,
                        format!("Failure when receiving data from the peer: {e}"),
                    ))
                }
            }
        }
        Ok(raw)
    }
}

impl TransferHandle for SocketHandle {
    fn set_option(&mut self, option: TransferOption) -> Result<(), TransferFailure> {
        match option {
            TransferOption::Url(url) => self.url = Some(url),
            TransferOption::ReturnTransfer(on) => self.return_transfer = on,
            TransferOption::IncludeHeader(on) => self.include_header = on,
            TransferOption::ConnectTimeout(t) => self.connect_timeout = Some(t).filter(|t| !t.is_zero()),
            TransferOption::Timeout(t) => self.timeout = Some(t).filter(|t| !t.is_zero()),
            TransferOption::Post(on) => self.post = on,
            TransferOption::CustomRequest(method) => {
                if method.is_empty() || method.contains(|c: char| c.is_whitespace() || c.is_control()) {
                    return Err(TransferFailure::new(
                        TransferFailure::BAD_FUNCTION_ARGUMENT,
                        format!("Invalid request method: {method:?}"),
                    ));
                }
                self.custom_request = Some(method);
            }
            TransferOption::HttpHeader(lines) => {
                if let Some(bad) = lines.iter().find(|l| l.contains(['\r', '\n'])) {
                    return Err(TransferFailure::new(
                        TransferFailure::BAD_FUNCTION_ARGUMENT,
                        format!("Header line contains CR or LF: {bad:?}"),
                    ));
                }
                self.headers = lines;
            }
            TransferOption::PostFields(body) => self.post_fields = Some(body),
        }
        Ok(())
    }

    fn perform(&mut self) -> Result<Vec<u8>, TransferFailure> {
        self.response_code = 0;
        self.header_size = 0;

        let budget = Budget::start(self.timeout);
        let target = Target::parse(self.url.as_deref().unwrap_or_default())?;
        tracing::trace!(host = %target.host, port = target.port, tls = target.tls, "opening connection");

        let mut conn = self.connect(&target, &budget)?;
        budget.arm(conn.socket(), 0)?;
        conn.write_all(&self.encode_request(&target))
            .and_then(|()| conn.flush())
            .map_err(|e| {
                if is_timeout(&e) {
                    budget.timed_out(0)
                } else {
                    TransferFailure::new(
                        TransferFailure::SEND_ERROR,
                        format!("Failed sending data to the peer: {e}"),
                    )
                }
            })?;

        let raw = self.receive(&mut conn, &budget)?;
        conn.shutdown();

        let head = ReplyHead::parse(&raw).ok_or_else(|| {
            TransferFailure::new(TransferFailure::WEIRD_SERVER_REPLY, "Weird server reply")
        })?;
        let body = head.body(&raw[head.header_size..], self.method() == "HEAD")?;

        self.response_code = head.status;
        self.header_size = head.header_size;

        let mut output = Vec::with_capacity(head.header_size + body.len());
        if self.include_header {
            output.extend_from_slice(&raw[..head.header_size]);
        }
        output.extend_from_slice(&body);

        if self.return_transfer {
            Ok(output)
        } else {
            let mut stdout = io::stdout();
            stdout
                .write_all(&output)
                .and_then(|()| stdout.flush())
                .map_err(|e| TransferFailure::new(23, format!("Failed writing body: {e}")))?;
            Ok(Vec::new())
        }
    }

    fn response_code(&self) -> u16 {
        self.response_code
    }

    fn header_size(&self) -> usize {
        self.header_size
    }

    fn close(self: Box<Self>) {}
}

fn build_tls_config() -> Result<Arc<ClientConfig>, TransferFailure> {
    let roots = RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    };
    let config = ClientConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
        .with_safe_default_protocol_versions()
        .map_err(|e| {
            TransferFailure::new(TransferFailure::SSL_CONNECT_ERROR, format!("TLS setup failed: {e}"))
        })?
        .with_root_certificates(roots)
        .with_no_client_auth();
    Ok(Arc::new(config))
}

fn is_timeout(e: &io::Error) -> bool {
    matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
}

/// Time limit shared by every phase of one transfer.
struct Budget {
    started: Instant,
    deadline: Option<Instant>,
}

impl Budget {
    fn start(timeout: Option<Duration>) -> Self {
        let started = Instant::now();
        Self {
            started,
            deadline: timeout.map(|t| started + t),
        }
    }

    /// Time left, `None` when unlimited.
    fn remaining(&self, received: usize) -> Result<Option<Duration>, TransferFailure> {
        match self.deadline {
            None => Ok(None),
            Some(deadline) => match deadline.checked_duration_since(Instant::now()) {
                Some(left) if !left.is_zero() => Ok(Some(left)),
                _ => Err(self.timed_out(received)),
            },
        }
    }

    /// Apply the remaining time as the socket's read and write timeouts.
    fn arm(&self, socket: &TcpStream, received: usize) -> Result<(), TransferFailure> {
        let left = self.remaining(received)?;
        socket
            .set_read_timeout(left)
            .and_then(|()| socket.set_write_timeout(left))
            .map_err(|e| TransferFailure::new(TransferFailure::RECV_ERROR, format!("socket setup failed: {e}")))
    }

    fn timed_out(&self, received: usize) -> TransferFailure {
        TransferFailure::new(
            TransferFailure::OPERATION_TIMEDOUT,
            format!(
                "Operation timed out after {} milliseconds with {received} bytes received",
                self.started.elapsed().as_millis()
            ),
        )
    }
}

/// Where a transfer goes, derived from its URL.
struct Target {
    tls: bool,
    host: String,
    port: u16,
    host_header: String,
    request_target: String,
}

impl Target {
    fn parse(url: &str) -> Result<Self, TransferFailure> {
        let malformed = || {
            TransferFailure::new(
                TransferFailure::URL_MALFORMAT,
                format!("URL using bad/illegal format or missing URL: {url:?}"),
            )
        };
        let uri = Uri::parse(url).map_err(|_| malformed())?;
        let (tls, default_port) = match uri.scheme().to_ascii_lowercase().as_str() {
            "http" => (false, 80),
            "https" => (true, 443),
            "" => return Err(malformed()),
            other => {
                return Err(TransferFailure::new(
                    TransferFailure::UNSUPPORTED_PROTOCOL,
                    format!("Protocol \"{other}\" not supported"),
                ))
            }
        };
        if uri.host().is_empty() {
            return Err(malformed());
        }

        let host = uri.host().trim_start_matches('[').trim_end_matches(']').to_string();
        let host_header = match uri.port() {
            Some(port) => format!("{}:{port}", uri.host()),
            None => uri.host().to_string(),
        };
        let path = match uri.path() {
            "" => "/",
            path => path,
        };
        let request_target = match uri.query() {
            "" => path.to_string(),
            query => format!("{path}?{query}"),
        };

        Ok(Self {
            tls,
            host,
            port: uri.port().unwrap_or(default_port),
            host_header,
            request_target,
        })
    }
}

fn connect_tcp(
    target: &Target,
    connect_timeout: Option<Duration>,
    budget: &Budget,
) -> Result<TcpStream, TransferFailure> {
    let unresolved = || {
        TransferFailure::new(
            TransferFailure::COULDNT_RESOLVE_HOST,
            format!("Could not resolve host: {}", target.host),
        )
    };
    let addrs: Vec<SocketAddr> = (target.host.as_str(), target.port)
        .to_socket_addrs()
        .map_err(|_| unresolved())?
        .collect();
    if addrs.is_empty() {
        return Err(unresolved());
    }

    let mut last_error = None;
    for addr in &addrs {
        let limit = match (connect_timeout, budget.remaining(0)?) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        let attempt = match limit {
            Some(limit) => TcpStream::connect_timeout(addr, limit),
            None => TcpStream::connect(addr),
        };
        match attempt {
            Ok(stream) => {
                let _ = stream.set_nodelay(true);
                return Ok(stream);
            }
            Err(e) => last_error = Some(e),
        }
    }

    match last_error {
        Some(e) if is_timeout(&e) => Err(TransferFailure::new(
            TransferFailure::OPERATION_TIMEDOUT,
            format!("Connection timed out after {} milliseconds", budget.started.elapsed().as_millis()),
        )),
        Some(e) => Err(TransferFailure::new(
            TransferFailure::COULDNT_CONNECT,
            format!("Failed to connect to {} port {}: {e}", target.host, target.port),
        )),
        None => Err(unresolved()),
    }
}

enum Connection {
    Plain(TcpStream),
    Tls(Box<StreamOwned<ClientConnection, TcpStream>>),
}

impl Connection {
    fn socket(&self) -> &TcpStream {
        match self {
            Connection::Plain(s) => s,
            Connection::Tls(s) => &s.sock,
        }
    }

    fn shutdown(&mut self) {
        if let Connection::Tls(s) = self {
            s.conn.send_close_notify();
            let _ = s.conn.complete_io(&mut s.sock);
        }
        let _ = self.socket().shutdown(std::net::Shutdown::Both);
    }
}

impl Read for Connection {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Connection::Plain(s) => s.read(buf),
            Connection::Tls(s) => s.read(buf),
        }
    }
}

impl Write for Connection {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Connection::Plain(s) => s.write(buf),
            Connection::Tls(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Connection::Plain(s) => s.flush(),
            Connection::Tls(s) => s.flush(),
        }
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// The final header block of a reply, after any interim 1xx blocks.
#[derive(Debug, PartialEq, Eq)]
struct ReplyHead {
    status: u16,
    header_size: usize,
    chunked: bool,
    content_length: Option<usize>,
}

impl ReplyHead {
    fn parse(raw: &[u8]) -> Option<Self> {
        let mut offset = 0;
        loop {
            let end = offset + find(&raw[offset..], b"\r\n\r\n")? + 4;
            let block = String::from_utf8_lossy(&raw[offset..end]);
            let mut lines = block.split("\r\n");
            let status = parse_status_line(lines.next()?)?;
            if (100..200).contains(&status) && status != 101 {
                offset = end;
                continue;
            }

            let mut chunked = false;
            let mut content_length = None;
            for line in lines {
                let Some((name, value)) = line.split_once(':') else {
                    continue;
                };
                let name = name.trim();
                if name.eq_ignore_ascii_case("transfer-encoding") {
                    chunked = value.to_ascii_lowercase().contains("chunked");
                } else if name.eq_ignore_ascii_case("content-length") {
                    content_length = value.trim().parse().ok();
                }
            }
            return Some(Self {
                status,
                header_size: end,
                chunked,
                content_length,
            });
        }
    }

    fn has_no_body(&self, head_request: bool) -> bool {
        head_request || self.status == 204 || self.status == 304
    }

    fn body(&self, rest: &[u8], head_request: bool) -> Result<Vec<u8>, TransferFailure> {
        if self.has_no_body(head_request) {
            return Ok(Vec::new());
        }
        if self.chunked {
            return decode_chunked(rest);
        }
        match self.content_length {
            Some(len) if rest.len() < len => Err(TransferFailure::new(
                TransferFailure::RECV_ERROR,
                format!("transfer closed with {} bytes remaining to read", len - rest.len()),
            )),
            Some(len) => Ok(rest[..len].to_vec()),
            None => Ok(rest.to_vec()),
        }
    }
}

fn parse_status_line(line: &str) -> Option<u16> {
    let mut parts = line.split_whitespace();
    if !parts.next()?.starts_with("HTTP/") {
        return None;
    }
    let code = parts.next()?;
    if code.len() != 3 {
        return None;
    }
    code.parse().ok()
}

/// Largest chunk accepted from a peer.
const MAX_CHUNK_SIZE: usize = 1 << 30;
/// Longest chunk-size line (size plus extensions) accepted from a peer.
const MAX_CHUNK_LINE: usize = 4096;
/// Largest header section accepted before the blank line arrives.
const MAX_HEADER_SIZE: usize = 100 * 1024;

fn chunk_failure() -> TransferFailure {
    TransferFailure::new(TransferFailure::RECV_ERROR, "Problem in the Chunked-Encoded data")
}

/// A chunk-size line at the start of some chunked data.
#[derive(Debug, PartialEq, Eq)]
enum ChunkLine {
    Incomplete,
    Invalid,
    Size { size: usize, data_start: usize },
}

fn chunk_line(data: &[u8]) -> ChunkLine {
    let window = &data[..data.len().min(MAX_CHUNK_LINE + 2)];
    let Some(line_end) = find(window, b"\r\n") else {
        return if data.len() > MAX_CHUNK_LINE {
            ChunkLine::Invalid
        } else {
            ChunkLine::Incomplete
        };
    };
    let Ok(line) = std::str::from_utf8(&data[..line_end]) else {
        return ChunkLine::Invalid;
    };
    let digits = line.split(';').next().unwrap_or_default().trim();
    if digits.is_empty() || digits.len() > 16 {
        return ChunkLine::Invalid;
    }
    match usize::from_str_radix(digits, 16) {
        Ok(size) if size <= MAX_CHUNK_SIZE => ChunkLine::Size {
            size,
            data_start: line_end + 2,
        },
        _ => ChunkLine::Invalid,
    }
}

/// Walks a chunked body as it arrives. Chunks already seen complete are
/// never looked at again.
#[derive(Debug, Default)]
struct ChunkScan {
    offset: usize,
}

impl ChunkScan {
    /// Whether the terminating zero-size chunk has arrived.
    fn advance(&mut self, body: &[u8]) -> Result<bool, TransferFailure> {
        loop {
            match chunk_line(&body[self.offset..]) {
                ChunkLine::Incomplete => return Ok(false),
                ChunkLine::Invalid => return Err(chunk_failure()),
                ChunkLine::Size { size: 0, .. } => return Ok(true),
                ChunkLine::Size { size, data_start } => {
                    let data_end = self.offset + data_start + size;
                    let next = data_end.checked_add(2).ok_or_else(chunk_failure)?;
                    if body.len() < next {
                        return Ok(false);
                    }
                    if &body[data_end..next] != b"\r\n" {
                        return Err(chunk_failure());
                    }
                    self.offset = next;
                }
            }
        }
    }
}

/// Tracks whether the bytes received so far hold the whole reply, so
/// reading can stop before the peer closes. The head is parsed once.
#[derive(Debug)]
struct ReplyProgress {
    head_request: bool,
    head: Option<ReplyHead>,
    chunks: ChunkScan,
}

impl ReplyProgress {
    fn new(head_request: bool) -> Self {
        Self {
            head_request,
            head: None,
            chunks: ChunkScan::default(),
        }
    }

    fn complete(&mut self, raw: &[u8]) -> Result<bool, TransferFailure> {
        if self.head.is_none() {
            self.head = ReplyHead::parse(raw);
        }
        let Some(head) = &self.head else {
            if raw.len() > MAX_HEADER_SIZE {
                return Err(TransferFailure::new(
                    TransferFailure::RECV_ERROR,
                    "Too large response headers",
                ));
            }
            return Ok(false);
        };
        if head.has_no_body(self.head_request) {
            return Ok(true);
        }
        let rest = &raw[head.header_size..];
        if head.chunked {
            return self.chunks.advance(rest);
        }
        Ok(head.content_length.is_some_and(|len| rest.len() >= len))
    }
}

fn decode_chunked(mut data: &[u8]) -> Result<Vec<u8>, TransferFailure> {
    let mut out = Vec::new();
    loop {
        let ChunkLine::Size { size, data_start } = chunk_line(data) else {
            return Err(chunk_failure());
        };
        data = &data[data_start..];
        if size == 0 {
            return Ok(out);
        }
        let next = size.checked_add(2).ok_or_else(chunk_failure)?;
        if data.len() < next || &data[size..next] != b"\r\n" {
            return Err(chunk_failure());
        }
        out.extend_from_slice(&data[..size]);
        data = &data[next..];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_final_block_after_continue() {
        let raw = b"HTTP/1.1 100 Continue\r\n\r\nHTTP/1.1 201 Created\r\nContent-Length: 2\r\n\r\n{}";
        let head = ReplyHead::parse(raw).unwrap();
        assert_eq!(head.status, 201);
        assert_eq!(head.header_size, raw.len() - 2);
        assert_eq!(head.content_length, Some(2));
        assert!(!head.chunked);
    }

    #[test]
    fn garbage_is_not_a_reply() {
        assert!(ReplyHead::parse(b"hello\r\n\r\n").is_none());
        assert!(ReplyHead::parse(b"HTTP/1.1 200 OK\r\n").is_none());
    }

    #[test]
    fn decodes_chunked_body() {
        let body = decode_chunked(b"4\r\nWiki\r\n5;ext=1\r\npedia\r\n0\r\n\r\n").unwrap();
        assert_eq!(body, b"Wikipedia");
        assert_eq!(decode_chunked(b"4\r\nWi").unwrap_err().code, TransferFailure::RECV_ERROR);
    }

    #[test]
    fn oversized_chunk_is_a_receive_error() {
        for size in ["ffffffffffffffff", "fffffffffffffffff", "40000001"] {
            let body = format!("{size}\r\nab");
            let err = decode_chunked(body.as_bytes()).unwrap_err();
            assert_eq!(err.code, TransferFailure::RECV_ERROR, "{size}");
            assert_eq!(err.message, "Problem in the Chunked-Encoded data");
            assert_eq!(ChunkScan::default().advance(body.as_bytes()).unwrap_err().code, 56, "{size}");
        }
        let raw = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\nffffffffffffffff\r\nab";
        assert_eq!(ReplyProgress::new(false).complete(raw).unwrap_err().code, 56);
    }

    #[test]
    fn malformed_chunk_lines_are_rejected() {
        assert_eq!(chunk_line(b"zz\r\n"), ChunkLine::Invalid);
        assert_eq!(chunk_line(b"\r\n"), ChunkLine::Invalid);
        assert_eq!(chunk_line(&[b'1'; MAX_CHUNK_LINE + 1]), ChunkLine::Invalid);
        assert_eq!(chunk_line(b"1f"), ChunkLine::Incomplete);
        assert_eq!(chunk_line(b"1f;x=y\r\n"), ChunkLine::Size { size: 31, data_start: 8 });
        // Data not followed by CRLF.
        assert!(ChunkScan::default().advance(b"2\r\nabcd").is_err());
    }

    #[test]
    fn chunk_scan_resumes_where_it_stopped() {
        let body = b"4\r\nWiki\r\n5\r\npedia\r\n0\r\n\r\n";
        let mut scan = ChunkScan::default();
        assert!(!scan.advance(&body[..5]).unwrap());
        assert_eq!(scan.offset, 0);
        assert!(!scan.advance(&body[..12]).unwrap());
        assert_eq!(scan.offset, 9);
        assert!(scan.advance(body).unwrap());
        assert_eq!(scan.offset, 19);
    }

    #[test]
    fn content_length_truncates_and_detects_short_reads() {
        let head = ReplyHead::parse(b"HTTP/1.1 200 OK\r\nContent-Length: 3\r\n\r\n").unwrap();
        assert_eq!(head.body(b"abcdef", false).unwrap(), b"abc");
        let err = head.body(b"ab", false).unwrap_err();
        assert_eq!(err.code, TransferFailure::RECV_ERROR);
    }

    fn complete(raw: &[u8], head_request: bool) -> bool {
        ReplyProgress::new(head_request).complete(raw).unwrap()
    }

    #[test]
    fn reply_completion() {
        assert!(!complete(b"HTTP/1.1 200 OK\r\nContent-Length: 3\r\n\r\nab", false));
        assert!(complete(b"HTTP/1.1 200 OK\r\nContent-Length: 3\r\n\r\nabc", false));
        assert!(complete(b"HTTP/1.1 204 No Content\r\n\r\n", false));
        assert!(complete(b"HTTP/1.1 200 OK\r\nContent-Length: 9\r\n\r\n", true));
        assert!(!complete(b"HTTP/1.1 200 OK\r\n\r\nopen-ended", false));
        assert!(complete(b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n2\r\n{}\r\n0\r\n\r\n", false));
    }

    #[test]
    fn reply_progress_keeps_head_across_reads() {
        let mut progress = ReplyProgress::new(false);
        assert!(!progress.complete(b"HTTP/1.1 200 OK\r\nContent-Le").unwrap());
        assert!(progress.head.is_none());
        let raw = b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\n{";
        assert!(!progress.complete(raw).unwrap());
        assert_eq!(progress.head.as_ref().unwrap().content_length, Some(2));
        assert!(progress.complete(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\n{}").unwrap());
    }

    #[test]
    fn endless_headers_are_refused() {
        let mut raw = b"HTTP/1.1 200 OK\r\n".to_vec();
        raw.resize(MAX_HEADER_SIZE + 1, b'a');
        assert_eq!(ReplyProgress::new(false).complete(&raw).unwrap_err().code, 56);
    }

    #[test]
    fn target_from_url() {
        let target = Target::parse("https://api.laposta.nl/v2/member?list_id=x").unwrap();
        assert!(target.tls);
        assert_eq!(target.port, 443);
        assert_eq!(target.host_header, "api.laposta.nl");
        assert_eq!(target.request_target, "/v2/member?list_id=x");

        let target = Target::parse("http://127.0.0.1:3000").unwrap();
        assert!(!target.tls);
        assert_eq!(target.port, 3000);
        assert_eq!(target.host_header, "127.0.0.1:3000");
        assert_eq!(target.request_target, "/");
    }

    #[test]
    fn target_rejects_unsupported_urls() {
        assert_eq!(Target::parse("ftp://example.com").err().unwrap().code, TransferFailure::UNSUPPORTED_PROTOCOL);
        assert_eq!(Target::parse("/no/host").err().unwrap().code, TransferFailure::URL_MALFORMAT);
        assert_eq!(Target::parse("").err().unwrap().code, TransferFailure::URL_MALFORMAT);
    }

    #[test]
    fn request_encoding_adds_defaults() {
        let mut handle = SocketHandle::new(Arc::default());
        handle.set_option(TransferOption::Post(true)).unwrap();
        handle
            .set_option(TransferOption::HttpHeader(vec!["user-agent: test".to_string()]))
            .unwrap();
        handle.set_option(TransferOption::PostFields(b"a=1".to_vec())).unwrap();
        let target = Target::parse("http://example.com:81/v2/list").unwrap();
        let encoded = String::from_utf8(handle.encode_request(&target)).unwrap();
        assert!(encoded.starts_with("POST /v2/list HTTP/1.1\r\n"));
        assert!(encoded.contains("Host: example.com:81\r\n"));
        assert!(encoded.contains("user-agent: test\r\n"));
        assert!(encoded.contains("Content-Type: application/x-www-form-urlencoded\r\n"));
        assert!(encoded.contains("Content-Length: 3\r\n"));
        assert!(encoded.ends_with("Connection: close\r\n\r\na=1"));
    }

    #[test]
    fn custom_method_and_explicit_host() {
        let mut handle = SocketHandle::new(Arc::default());
        handle.set_option(TransferOption::CustomRequest("DELETE".into())).unwrap();
        handle
            .set_option(TransferOption::HttpHeader(vec!["host: api.example".to_string()]))
            .unwrap();
        let target = Target::parse("http://10.0.0.1/v2/list/abc").unwrap();
        let encoded = String::from_utf8(handle.encode_request(&target)).unwrap();
        assert!(encoded.starts_with("DELETE /v2/list/abc HTTP/1.1\r\n"));
        assert!(!encoded.contains("Host: 10.0.0.1"));
        assert!(!encoded.contains("Content-Length"));
    }

    #[test]
    fn invalid_options_are_refused() {
        let mut handle = SocketHandle::new(Arc::default());
        let err = handle
            .set_option(TransferOption::CustomRequest("BAD METHOD".into()))
            .unwrap_err();
        assert_eq!(err.code, TransferFailure::BAD_FUNCTION_ARGUMENT);
        assert!(handle
            .set_option(TransferOption::HttpHeader(vec!["x: a\r\ny: b".into()]))
            .is_err());
    }

    #[test]
    fn refused_connection_maps_to_couldnt_connect() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let mut handle = SocketHandle::new(Arc::default());
        handle.set_option(TransferOption::Url(format!("http://{addr}/"))).unwrap();
        handle.set_option(TransferOption::ReturnTransfer(true)).unwrap();
        let err = handle.perform().unwrap_err();
        assert_eq!(err.code, TransferFailure::COULDNT_CONNECT);
    }

    #[test]
    fn silent_server_times_out() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = std::thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            std::thread::sleep(Duration::from_millis(500));
            drop(stream);
        });

        let mut handle = SocketHandle::new(Arc::default());
        handle.set_option(TransferOption::Url(format!("http://{addr}/"))).unwrap();
        handle.set_option(TransferOption::ReturnTransfer(true)).unwrap();
        handle.set_option(TransferOption::Timeout(Duration::from_millis(100))).unwrap();
        let err = handle.perform().unwrap_err();
        assert_eq!(err.code, TransferFailure::OPERATION_TIMEDOUT);
        assert!(err.message.contains("timed out"));
        server.join().unwrap();
    }

    #[test]
    fn performs_exchange_with_raw_server() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = [0u8; 1024];
            let n = stream.read(&mut buf).unwrap();
            let request = String::from_utf8_lossy(&buf[..n]).to_string();
            stream
                .write_all(b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\nX-Name: caf\xc3\xa9\r\n\r\n2\r\n{}\r\n0\r\n\r\n")
                .unwrap();
            request
        });

        let mut handle = SocketHandle::new(Arc::default());
        handle.set_option(TransferOption::Url(format!("http://{addr}/v2/list"))).unwrap();
        handle.set_option(TransferOption::ReturnTransfer(true)).unwrap();
        handle.set_option(TransferOption::IncludeHeader(true)).unwrap();
        let output = handle.perform().unwrap();

        assert_eq!(handle.response_code(), 200);
        let header_size = handle.header_size();
        assert!(output[..header_size].ends_with(b"\r\n\r\n"));
        assert_eq!(&output[header_size..], b"{}");

        let request = server.join().unwrap();
        assert!(request.starts_with("GET /v2/list HTTP/1.1\r\n"));
        assert!(request.contains("Connection: close"));
    }

    fn serve_once(reply: Vec<u8>) -> (SocketAddr, std::thread::JoinHandle<()>) {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = [0u8; 1024];
            let _ = stream.read(&mut buf).unwrap();
            // The client may hang up early on a bad reply.
            let _ = stream.write_all(&reply);
        });
        (addr, server)
    }

    #[test]
    fn overflowing_chunk_size_from_server_fails_cleanly() {
        let (addr, server) =
            serve_once(b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\nffffffffffffffff\r\nab".to_vec());

        let mut handle = SocketHandle::new(Arc::default());
        handle.set_option(TransferOption::Url(format!("http://{addr}/"))).unwrap();
        handle.set_option(TransferOption::ReturnTransfer(true)).unwrap();
        handle.set_option(TransferOption::Timeout(Duration::from_secs(5))).unwrap();
        let err = handle.perform().unwrap_err();
        assert_eq!(err.code, TransferFailure::RECV_ERROR);
        assert_eq!(err.message, "Problem in the Chunked-Encoded data");
        server.join().unwrap();
    }

    #[test]
    fn receives_large_chunked_body() {
        let chunk = [b'x'; 1024];
        let mut reply = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n".to_vec();
        for _ in 0..8192 {
            reply.extend_from_slice(b"400\r\n");
            reply.extend_from_slice(&chunk);
            reply.extend_from_slice(b"\r\n");
        }
        reply.extend_from_slice(b"0\r\n\r\n");
        let (addr, server) = serve_once(reply);

        let mut handle = SocketHandle::new(Arc::default());
        handle.set_option(TransferOption::Url(format!("http://{addr}/"))).unwrap();
        handle.set_option(TransferOption::ReturnTransfer(true)).unwrap();
        handle.set_option(TransferOption::Timeout(Duration::from_secs(10))).unwrap();
        let output = handle.perform().unwrap();
        assert_eq!(output.len(), 8 * 1024 * 1024);
        assert!(output.iter().all(|b| *b == b'x'));
        server.join().unwrap();
    }
}
