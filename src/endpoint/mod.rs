//! Per-endpoint contract.
//!
//! An [`Endpoint`] describes one remote operation: which verb it uses, how to
//! build the URL, body, headers and params from an entry, and how to turn the
//! raw payload (or a failure) into the typed output. It is the only piece an
//! integrator writes per operation; caching and dedup come from the
//! [`RequestEngine`](crate::engine::RequestEngine).

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::cache::RequestEntry;
use crate::error::TransportError;
use crate::http::{Headers, Method, Params};
use crate::observe::Observation;

/// Describes one remote operation.
///
/// Only [`method`](Self::method), [`url`](Self::url) and [`body`](Self::body)
/// are required. By default headers and params are empty, the raw JSON payload
/// is decoded straight into [`Output`](Self::Output), and errors are re-raised
/// to subscribers unchanged.
///
/// # Examples
///
/// ```rust
/// use reqcache::cache::RequestEntry;
/// use reqcache::endpoint::Endpoint;
/// use reqcache::http::{Method, Params};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Clone, Serialize)]
/// struct UserQuery { id: u64 }
///
/// #[derive(Clone, Deserialize)]
/// struct User { name: String }
///
/// struct GetUser;
///
/// impl Endpoint for GetUser {
///     type Input = UserQuery;
///     type Output = User;
///
///     fn method(&self) -> Method {
///         Method::Get
///     }
///
///     fn url(&self, entry: &RequestEntry<UserQuery, User>) -> String {
///         let id = entry.latest_request().map(|q| q.id).unwrap_or_default();
///         format!("https://api.example.com/users/{id}")
///     }
///
///     fn body(&self, _entry: &RequestEntry<UserQuery, User>) -> Option<serde_json::Value> {
///         None
///     }
///
///     fn params(&self, _entry: &RequestEntry<UserQuery, User>) -> Params {
///         Params::new().with("fields", "name")
///     }
/// }
/// ```
pub trait Endpoint: Send + Sync + 'static {
    /// The logical request input; its canonical JSON form is the cache key.
    type Input: Serialize + Clone + Send + Sync + 'static;

    /// The typed result subscribers receive.
    type Output: DeserializeOwned + Clone + Send + Sync + 'static;

    /// The verb this endpoint is bound to.
    fn method(&self) -> Method;

    fn url(&self, entry: &RequestEntry<Self::Input, Self::Output>) -> String;

    fn body(&self, entry: &RequestEntry<Self::Input, Self::Output>) -> Option<Value>;

    fn headers(&self, _entry: &RequestEntry<Self::Input, Self::Output>) -> Headers {
        Headers::new()
    }

    fn params(&self, _entry: &RequestEntry<Self::Input, Self::Output>) -> Params {
        Params::new()
    }

    /// Turns the raw payload into the output, now or lazily.
    ///
    /// # Errors
    ///
    /// The default returns [`TransportError::Decode`] when the payload does not
    /// deserialize into [`Output`](Self::Output).
    fn transform(&self, raw: Value) -> Result<Observation<Self::Output>, TransportError> {
        let output = serde_json::from_value(raw)?;
        Ok(Observation::Value(output))
    }

    /// Recovers from a transport failure, or re-raises it.
    ///
    /// Whatever this returns becomes the outcome of the call. The default
    /// re-raises `error` unchanged.
    fn on_error(&self, error: TransportError) -> Result<Observation<Self::Output>, TransportError> {
        Err(error)
    }
}
