//! An embeddable, multi-threaded HTTP/1.1 server library.
//!
//! A [`Socket`] is constructed from validated [`Settings`], optionally bound to one or more TLS
//! hosts via SNI, and then driven with a caller-supplied [`RequestHandler`]. Each exchange gets
//! an immutable [`Request`] snapshot, a [`Connection`] response sink, and a per-exchange
//! [`ObjectContext`], bundled together as a [`RequestContext`]. Request bodies are delivered
//! incrementally through the [`Writer`] trait; response bodies may be sent from memory, from a
//! file, or pulled incrementally through the [`Reader`] trait.

mod body;
mod connection;
pub(crate) mod engine;
mod error;
mod headers;
mod object_context;
mod request;
mod request_context;
mod response;
mod settings;
mod sni;
mod socket;
#[cfg(feature = "tls")]
mod tls;

pub use body::{BodyError, Input, Output, Reader, WriteOutcome, Writer};
pub use connection::Connection;
pub use error::{Result, ServerError};
pub use headers::Headers;
pub use object_context::ObjectContext;
pub use request::{Request, RequestLine};
pub use request_context::{RequestContext, RequestHandler};
pub use response::Response;
pub use settings::Settings;
pub use sni::Certs;
pub use socket::Socket;

/// The concrete TLS server configuration type threaded from [`Socket`] into the [`engine`]
/// module, so the engine never has to name `rustls` types directly when the `tls` feature is
/// disabled.
#[cfg(feature = "tls")]
pub(crate) type ServerTlsConfig = std::sync::Arc<rustls::ServerConfig>;

#[cfg(not(feature = "tls"))]
#[derive(Clone)]
pub(crate) enum ServerTlsConfig {}
