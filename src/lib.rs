//! # reqcache
//!
//! In-memory HTTP request caching and in-flight deduplication.
//!
//! Given a logical request input, a [`RequestEngine`] decides whether to issue
//! a new network call or serve the result it already has, and makes sure only
//! one call per distinct input is in flight at a time. The network itself is
//! behind the [`Transport`] trait; each remote operation is described once by
//! an [`Endpoint`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use futures::{stream, StreamExt};
//! use reqcache::{Endpoint, RequestEngine, TransportError};
//! use reqcache::cache::RequestEntry;
//! use reqcache::http::Method;
//! use reqcache::transport::TransportRequest;
//! use serde_json::{json, Value};
//!
//! struct Repo;
//!
//! impl Endpoint for Repo {
//!     type Input = Value;
//!     type Output = Value;
//!
//!     fn method(&self) -> Method { Method::Get }
//!     fn url(&self, entry: &RequestEntry<Value, Value>) -> String {
//!         let name = entry.latest_request().unwrap_or_default();
//!         format!("https://api.example.com/repos/{}", name["name"].as_str().unwrap_or(""))
//!     }
//!     fn body(&self, _entry: &RequestEntry<Value, Value>) -> Option<Value> { None }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let transport = |req: TransportRequest| {
//!         stream::once(async move { Ok::<_, TransportError>(json!({ "url": req.url })) }).boxed()
//!     };
//!     let engine = RequestEngine::new(Repo, transport);
//!
//!     let mut ticket = engine.send(json!({ "name": "reqcache" }))?;
//!     println!("{:?}", ticket.recv().await);
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod endpoint;
pub mod engine;
pub mod error;
pub mod http;
pub mod observe;
pub mod transport;

// ── Convenience re-exports ────────────────────────────────────────────────────
pub use cache::{RequestEntry, derive_key};
pub use config::EngineConfig;
pub use endpoint::Endpoint;
pub use engine::{Completion, Dispatch, RequestEngine, Ticket};
pub use error::{RequestError, TransportError};
pub use http::{Headers, Method, Params};
pub use observe::{LazySequence, Observation, ensure_observation};
pub use transport::{Transport, TransportRequest};
