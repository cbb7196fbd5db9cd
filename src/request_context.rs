use crate::connection::Connection;
use crate::object_context::ObjectContext;
use crate::request::Request;
use std::sync::Arc;

/// Binds one [`Request`], one [`Connection`], and a per-exchange [`ObjectContext`] together for
/// the duration of a single exchange.
///
/// created when the engine first delivers headers for a new exchange, and dropped once that
/// exchange's callback chain completes. handlers must not retain a `RequestContext` past that
/// point.
pub struct RequestContext {
    /// The immutable request snapshot.
    pub request: Request,
    /// The response sink for this exchange. shared via `Arc` because the engine loop and the
    /// handler-provided writer both hold a reference to it.
    pub connection: Arc<Connection>,
    /// Per-exchange, handler-owned, string-keyed object storage.
    pub objects: ObjectContext,
}

impl RequestContext {
    /// Bind a freshly-parsed request to a fresh response sink.
    pub fn new(request: Request) -> Self {
        Self {
            request,
            connection: Arc::new(Connection::new()),
            objects: ObjectContext::new(),
        }
    }
}

/// Implemented by callers to accept or decline each exchange and supply a request-body sink.
pub trait RequestHandler: Send + Sync + 'static {
    /// Called once per exchange, immediately after the request head is parsed. Returning
    /// [`Input::none`][crate::Input::none] declines the exchange (the socket will serve its
    /// default 404 page unless this call itself queued a response on
    /// `request_context.connection`).
    fn accept(&self, request_context: &mut RequestContext) -> crate::body::Input;
}

impl<F> RequestHandler for F
where
    F: Fn(&mut RequestContext) -> crate::body::Input + Send + Sync + 'static,
{
    fn accept(&self, request_context: &mut RequestContext) -> crate::body::Input {
        self(request_context)
    }
}
