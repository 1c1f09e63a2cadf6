//! Synchronous client for the Laposta marketing API.
//!
//! # Overview
//! Resource clients (`campaigns()`, `lists()`, `members()`, ...) map API
//! endpoints onto one shared request pipeline, which builds a `Request`,
//! sends it through an `HttpClient` and decodes the JSON `Response`.
//!
//! # Design
//! - `http` is a small immutable message model (`Uri`, `Stream`, `Request`,
//!   `Response`) plus `Transport`, which drives a curl-like transfer
//!   primitive. The default primitive speaks HTTP/1.1 over a plain socket,
//!   with rustls for `https`.
//! - Failures come in two tiers: `ClientError` when no usable response was
//!   received, `ApiError` when the API answered with an error.
//! - Payloads in and out are `serde_json::Value`; request bodies may be any
//!   `Serialize` type.
//! - No global state. Configuration is passed in through `Config`.
//!
//! ```no_run
//! use laposta_core::{Config, LapostaClient};
//!
//! let client = LapostaClient::new(Config::new("JdMtbsMq2jqJdQZD9AHC"));
//! let lists = client.lists().all()?;
//! # Ok::<(), laposta_core::Error>(())
//! ```

pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod pipeline;
pub mod query;
pub mod types;

pub use client::{LapostaClient, LapostaClientBuilder};
pub use config::Config;
pub use error::{ApiError, ClientError, Error, MessageError, StreamError};
pub use pipeline::{Pipeline, Resource, VERSION};
pub use types::{BulkMembers, BulkMode, ContentType, SyncAction, SyncMembers};
