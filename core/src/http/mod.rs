//! Minimal HTTP message model and transport.

pub mod factory;
pub mod message;
pub mod request;
pub mod response;
pub mod stream;
pub mod transfer;
pub mod transport;
pub mod uri;

pub use factory::{
    DefaultRequestFactory, DefaultResponseFactory, DefaultUriFactory, RequestFactory, ResponseFactory,
    StreamFactory, TempStreamFactory, UriFactory,
};
pub use message::{Body, Headers, Message};
pub use request::{Method, Request};
pub use response::Response;
pub use stream::Stream;
pub use transfer::{SocketTransferAdapter, TransferAdapter, TransferFailure, TransferHandle, TransferOption};
pub use transport::{HttpClient, Transport};
pub use uri::Uri;
