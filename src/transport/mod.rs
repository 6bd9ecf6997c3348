//! The network-facing seam.
//!
//! The cache layer never talks to the network itself. Hosts plug in whatever
//! HTTP client they use by implementing [`Transport`], or by passing a closure
//! with the matching signature.

use serde_json::Value;

use crate::http::{Headers, Method, Params};
use crate::observe::LazySequence;

/// Everything a transport needs to perform one call.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportRequest {
    pub method: Method,
    pub url: String,
    pub body: Option<Value>,
    pub headers: Headers,
    pub params: Params,
}

/// Performs HTTP calls on behalf of a [`RequestEngine`](crate::engine::RequestEngine).
///
/// The returned sequence is polled once by the engine; it should yield the raw
/// decoded payload (usually exactly one item) or a
/// [`TransportError`](crate::TransportError).
///
/// # Examples
///
/// ```rust
/// use futures::{stream, StreamExt};
/// use reqcache::TransportError;
/// use reqcache::transport::{Transport, TransportRequest};
/// use serde_json::json;
///
/// let transport = |req: TransportRequest| {
///     stream::once(async move { Ok::<_, TransportError>(json!({ "echo": req.url })) }).boxed()
/// };
/// fn assert_transport<T: Transport>(_: &T) {}
/// assert_transport(&transport);
/// ```
pub trait Transport: Send + Sync + 'static {
    fn perform_request(&self, request: TransportRequest) -> LazySequence<Value>;
}

impl<F> Transport for F
where
    F: Fn(TransportRequest) -> LazySequence<Value> + Send + Sync + 'static,
{
    fn perform_request(&self, request: TransportRequest) -> LazySequence<Value> {
        (self)(request)
    }
}
