//! Request engine — cache-first dispatch with at most one call in flight per key.
//!
//! A [`RequestEngine`] binds one [`Endpoint`] to a [`Transport`]. For every
//! [`send`](RequestEngine::send) it:
//!
//! 1. derives the cache key and fetches (or creates) the entry,
//! 2. records the input as the entry's latest request,
//! 3. joins an in-flight call instead of starting another, unless forced,
//! 4. replays the cached response on the entry's listener on a later task turn,
//! 5. starts a transport call when forced or when the entry is stale.
//!
//! When a call finishes, successfully or not, the entry becomes fresh, its
//! active-call slot is released, the result goes out on the entry's listener
//! and a [`Completion`] goes out on the engine broadcast. A timer then flips the
//! entry back to stale after [`EngineConfig::stale_after`]. A call that ends
//! without producing anything reports [`TransportError::EmptyResponse`] unless
//! a cached response exists; one that is dropped or panics reports
//! [`TransportError::Aborted`] and leaves the entry stale.
//!
//! `send` spawns tasks and must be called from within a Tokio runtime.

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::cache::{Registry, RequestEntry, derive_key};
use crate::config::EngineConfig;
use crate::endpoint::Endpoint;
use crate::error::{RequestError, TransportError};
use crate::http::Method;
use crate::observe::{Observation, ensure_observation};
use crate::transport::{Transport, TransportRequest};

pub mod ticket;

pub use ticket::{Completion, Dispatch, Ticket};

/// Entry type used by an engine for endpoint `E`.
pub type EntryOf<E> = RequestEntry<<E as Endpoint>::Input, <E as Endpoint>::Output>;

/// Ticket type returned by an engine for endpoint `E`.
pub type TicketOf<E> = Ticket<<E as Endpoint>::Input, <E as Endpoint>::Output>;

/// Completion type broadcast by an engine for endpoint `E`.
pub type CompletionOf<E> = Completion<<E as Endpoint>::Input, <E as Endpoint>::Output>;

/// Caches and deduplicates calls to one endpoint.
///
/// Cloning an engine is cheap and clones share the same registry.
///
/// # Examples
///
/// ```rust
/// use futures::{stream, StreamExt};
/// use reqcache::cache::RequestEntry;
/// use reqcache::endpoint::Endpoint;
/// use reqcache::engine::RequestEngine;
/// use reqcache::http::Method;
/// use reqcache::transport::TransportRequest;
/// use reqcache::TransportError;
/// use serde_json::{json, Value};
///
/// struct Ping;
///
/// impl Endpoint for Ping {
///     type Input = String;
///     type Output = Value;
///
///     fn method(&self) -> Method { Method::Get }
///     fn url(&self, _entry: &RequestEntry<String, Value>) -> String { "/ping".into() }
///     fn body(&self, _entry: &RequestEntry<String, Value>) -> Option<Value> { None }
/// }
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let transport = |_req: TransportRequest| {
///         stream::once(async { Ok::<_, TransportError>(json!("pong")) }).boxed()
///     };
///     let engine = RequestEngine::new(Ping, transport);
///
///     let mut ticket = engine.send("hello".to_owned())?;
///     assert_eq!(ticket.recv().await.unwrap()?, json!("pong"));
///     Ok(())
/// }
/// ```
pub struct RequestEngine<E: Endpoint> {
    shared: Arc<Shared<E>>,
}

struct Shared<E: Endpoint> {
    endpoint: E,
    transport: Arc<dyn Transport>,
    registry: Registry<E::Input, E::Output>,
    completions: broadcast::Sender<CompletionOf<E>>,
    config: EngineConfig,
}

impl<E: Endpoint> Clone for RequestEngine<E> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<E: Endpoint> RequestEngine<E> {
    /// Creates an engine with the default [`EngineConfig`].
    pub fn new<T: Transport>(endpoint: E, transport: T) -> Self {
        Self::with_config(endpoint, transport, EngineConfig::default())
    }

    pub fn with_config<T: Transport>(endpoint: E, transport: T, config: EngineConfig) -> Self {
        Self::with_shared_transport(endpoint, Arc::new(transport), config)
    }

    /// Creates an engine that shares `transport` with other engines.
    pub fn with_shared_transport(
        endpoint: E,
        transport: Arc<dyn Transport>,
        config: EngineConfig,
    ) -> Self {
        let (completions, _) = broadcast::channel(config.broadcast_capacity.max(1));
        Self {
            shared: Arc::new(Shared {
                endpoint,
                transport,
                registry: Registry::new(config.listener_capacity),
                completions,
                config,
            }),
        }
    }

    /// Sends `input` with the endpoint verb's default `force_request` flag.
    ///
    /// GET, HEAD and OPTIONS endpoints are cache-first; POST, PUT, PATCH and
    /// DELETE endpoints re-issue the call every time.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::Key`] if `input` has no canonical JSON form.
    pub fn send(&self, input: E::Input) -> Result<TicketOf<E>, RequestError> {
        let force_request = self.method().forces_request();
        self.send_with(input, force_request)
    }

    /// Sends `input`, forcing a new transport call when `force_request` is `true`.
    ///
    /// Unforced sends join a call already in flight for the same key. Forced
    /// sends always start a call, even if one is in flight; the newest issued
    /// call's response wins regardless of completion order.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::Key`] if `input` has no canonical JSON form.
    pub fn send_with(
        &self,
        input: E::Input,
        force_request: bool,
    ) -> Result<TicketOf<E>, RequestError> {
        let key = derive_key(&input)?;
        let entry = self.shared.registry.fetch_entry(&key);
        let listener = entry.subscribe();
        let plan = entry.plan_send(input, force_request);
        let dispatch = Dispatch::from_plan(plan.deduped, plan.replay, plan.call.is_some());

        if plan.deduped {
            debug!(key = %key, "call already in flight — joining listener");
            return Ok(Ticket::new(entry, listener, dispatch));
        }

        if plan.replay {
            debug!(key = %key, "replaying cached response");
            spawn_replay(Arc::clone(&entry));
        }

        if let Some(call) = plan.call {
            let shared = Arc::clone(&self.shared);
            let call_entry = Arc::clone(&entry);
            tokio::spawn(async move { shared.run_call(call_entry, call).await });
        }

        Ok(Ticket::new(entry, listener, dispatch))
    }

    /// Re-issues the entry's latest request with `force_request = true`.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::NeverRequested`] if the entry has no recorded
    /// request. The entry is left untouched.
    pub fn refresh(&self, entry: &EntryOf<E>) -> Result<TicketOf<E>, RequestError> {
        let input = entry
            .latest_request()
            .ok_or_else(|| RequestError::NeverRequested {
                key: entry.key().to_owned(),
            })?;
        self.send_with(input, true)
    }

    /// Subscribes to every completion across all keys of this engine.
    pub fn subscribe(&self) -> broadcast::Receiver<CompletionOf<E>> {
        self.shared.completions.subscribe()
    }

    /// Looks up the entry `input` maps to, without creating it.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::Key`] if `input` has no canonical JSON form.
    pub fn entry(&self, input: &E::Input) -> Result<Option<Arc<EntryOf<E>>>, RequestError> {
        let key = derive_key(input)?;
        Ok(self.shared.registry.get(&key))
    }

    /// Number of distinct keys this engine has seen. Entries are never evicted.
    pub fn len(&self) -> usize {
        self.shared.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.registry.is_empty()
    }

    pub fn method(&self) -> Method {
        self.shared.endpoint.method()
    }

    pub fn endpoint(&self) -> &E {
        &self.shared.endpoint
    }

    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }
}

// Publishes the entry's cached response from its own task, never inline with
// the caller of `send`. The response is read when the task runs, so a replay
// never publishes something older than what a racing call already stored.
fn spawn_replay<I, O>(entry: Arc<RequestEntry<I, O>>)
where
    I: Clone + Send + Sync + 'static,
    O: Clone + Send + Sync + 'static,
{
    tokio::spawn(async move {
        if let Some(response) = entry.latest_response() {
            entry.publish(Ok(response));
        }
    });
}

impl<E: Endpoint> Shared<E> {
    async fn run_call(&self, entry: Arc<EntryOf<E>>, call: u64) {
        let mut guard = ActiveCall::new(self, &entry);

        let request = TransportRequest {
            method: self.endpoint.method(),
            url: self.endpoint.url(&entry),
            body: self.endpoint.body(&entry),
            headers: self.endpoint.headers(&entry),
            params: self.endpoint.params(&entry),
        };
        debug!(
            key = %entry.key(),
            call,
            method = %request.method,
            url = %request.url,
            "issuing transport call"
        );

        let result = self.drive(&entry, call, request).await;
        guard.disarm();
        self.complete(&entry, result);
    }

    // Runs the transport, routes failures through `on_error`, transforms and
    // stores every produced value.
    async fn drive(
        &self,
        entry: &EntryOf<E>,
        call: u64,
        request: TransportRequest,
    ) -> Result<(), TransportError> {
        let mut payloads = self.transport.perform_request(request);

        while let Some(item) = payloads.next().await {
            let (observation, recovered) = match item {
                Ok(raw) => (self.endpoint.transform(raw)?, false),
                Err(error) => {
                    debug!(key = %entry.key(), call, error = %error, "transport failed — consulting error handler");
                    (self.endpoint.on_error(error)?, true)
                }
            };

            self.store_all(entry, call, observation).await?;

            // A recovered failure ends the call with the handler's output.
            if recovered {
                break;
            }
        }

        Ok(())
    }

    async fn store_all(
        &self,
        entry: &EntryOf<E>,
        call: u64,
        observation: Observation<E::Output>,
    ) -> Result<(), TransportError> {
        let mut outputs = ensure_observation(observation);
        while let Some(output) = outputs.next().await {
            if !entry.store_response(call, output?) {
                debug!(key = %entry.key(), call, "discarding response from superseded call");
            }
        }
        Ok(())
    }

    fn complete(&self, entry: &Arc<EntryOf<E>>, result: Result<(), TransportError>) {
        let generation = entry.complete_call();

        let error = match result {
            Ok(()) => match entry.latest_response() {
                Some(response) => {
                    entry.publish(Ok(response));
                    None
                }
                None => Some(TransportError::EmptyResponse),
            },
            Err(error) => Some(error),
        };

        if let Some(error) = &error {
            warn!(key = %entry.key(), error = %error, "transport call failed");
            entry.publish(Err(error.clone()));
        }
        self.announce(entry, error);

        let stale_at = tokio::time::Instant::now() + self.config.stale_after;
        let timer_entry = Arc::clone(entry);
        tokio::spawn(async move {
            tokio::time::sleep_until(stale_at).await;
            if timer_entry.expire(generation) {
                debug!(key = %timer_entry.key(), "entry went stale");
            }
        });
    }

    fn announce(&self, entry: &Arc<EntryOf<E>>, error: Option<TransportError>) {
        // Nobody listening on the engine broadcast is fine.
        let _ = self.completions.send(Completion {
            entry: Arc::clone(entry),
            error,
        });
    }
}

// Settles a call that is dropped or panics before reaching completion: the
// slot is released, the entry stays stale and waiters get `Aborted`.
struct ActiveCall<'a, E: Endpoint> {
    shared: &'a Shared<E>,
    entry: &'a Arc<EntryOf<E>>,
    armed: bool,
}

impl<'a, E: Endpoint> ActiveCall<'a, E> {
    fn new(shared: &'a Shared<E>, entry: &'a Arc<EntryOf<E>>) -> Self {
        Self {
            shared,
            entry,
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl<E: Endpoint> Drop for ActiveCall<'_, E> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        warn!(key = %self.entry.key(), "call dropped before completion — releasing slot");
        self.entry.abandon_call();
        self.entry.publish(Err(TransportError::Aborted));
        self.shared.announce(self.entry, Some(TransportError::Aborted));
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use futures::stream;
    use serde_json::{Value, json};

    use super::*;

    struct Echo(Method);

    impl Endpoint for Echo {
        type Input = Value;
        type Output = Value;

        fn method(&self) -> Method {
            self.0
        }

        fn url(&self, _entry: &EntryOf<Self>) -> String {
            "/echo".to_owned()
        }

        fn body(&self, entry: &EntryOf<Self>) -> Option<Value> {
            entry.latest_request()
        }
    }

    fn counting_transport(calls: Arc<AtomicUsize>) -> impl Transport {
        move |req: TransportRequest| {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            let body = req.body.unwrap_or(Value::Null);
            stream::once(async move { Ok::<_, TransportError>(json!({ "n": n, "body": body })) })
                .boxed()
        }
    }

    #[tokio::test]
    async fn get_sends_once_then_replays() {
        let calls = Arc::new(AtomicUsize::new(0));
        let engine = RequestEngine::new(Echo(Method::Get), counting_transport(Arc::clone(&calls)));

        let mut first = engine.send(json!({ "q": 1 })).unwrap();
        assert_eq!(first.dispatch(), Dispatch::Called);
        let value = first.recv().await.unwrap().unwrap();
        assert_eq!(value["n"], 1);

        let mut second = engine.send(json!({ "q": 1 })).unwrap();
        assert_eq!(second.dispatch(), Dispatch::Replayed);
        assert_eq!(second.recv().await.unwrap().unwrap(), value);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn post_always_reissues() {
        let calls = Arc::new(AtomicUsize::new(0));
        let engine = RequestEngine::new(Echo(Method::Post), counting_transport(Arc::clone(&calls)));

        let mut first = engine.send(json!("x")).unwrap();
        first.recv().await.unwrap().unwrap();

        let mut second = engine.send(json!("x")).unwrap();
        assert_eq!(second.dispatch(), Dispatch::ReplayedAndCalled);
        // Cached replay first, then the fresh response.
        assert_eq!(second.recv().await.unwrap().unwrap()["n"], 1);
        assert_eq!(second.recv().await.unwrap().unwrap()["n"], 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn refresh_without_request_fails() {
        let calls = Arc::new(AtomicUsize::new(0));
        let engine = RequestEngine::new(Echo(Method::Get), counting_transport(calls));
        let orphan: EntryOf<Echo> = RequestEntry::new("\"orphan\"".to_owned(), 1);

        let err = engine.refresh(&orphan).unwrap_err();
        assert!(matches!(err, RequestError::NeverRequested { ref key } if key == "\"orphan\""));
        assert!(orphan.latest_request().is_none());
        assert!(orphan.is_stale());
    }

    #[tokio::test]
    async fn entry_lookup_does_not_create() {
        let calls = Arc::new(AtomicUsize::new(0));
        let engine = RequestEngine::new(Echo(Method::Get), counting_transport(calls));
        assert!(engine.entry(&json!(1)).unwrap().is_none());
        assert!(engine.is_empty());

        let ticket = engine.send(json!(1)).unwrap();
        let found = engine.entry(&json!(1)).unwrap().unwrap();
        assert!(Arc::ptr_eq(ticket.entry(), &found));
        assert_eq!(engine.len(), 1);
    }

    #[tokio::test]
    async fn empty_call_reports_missing_response() {
        let engine = RequestEngine::with_config(
            Echo(Method::Get),
            |_req: TransportRequest| stream::empty::<Result<Value, TransportError>>().boxed(),
            EngineConfig::default().listener_capacity(2),
        );
        assert_eq!(engine.config().listener_capacity, 2);
        let mut completions = engine.subscribe();

        let (entry, mut listener) = engine.send(json!("nothing")).unwrap().into_parts();
        assert_eq!(listener.recv().await.unwrap(), Err(TransportError::EmptyResponse));

        let completion = completions.recv().await.unwrap();
        assert_eq!(completion.error, Some(TransportError::EmptyResponse));
        assert!(Arc::ptr_eq(&completion.entry, &entry));
        assert!(!entry.has_active_call());
        assert_eq!(entry.latest_response(), None);
    }

    #[tokio::test]
    async fn empty_call_republishes_cached_response() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&calls);
        let transport = move |_req: TransportRequest| {
            let n = counted.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                stream::once(async { Ok::<_, TransportError>(json!("cached")) }).boxed()
            } else {
                stream::empty().boxed()
            }
        };
        let engine = RequestEngine::new(Echo(Method::Post), transport);

        let mut first = engine.send(json!("k")).unwrap();
        first.recv().await.unwrap().unwrap();

        let mut listener = engine.send(json!("k")).unwrap().into_listener();
        // Replay, then the empty call's completion republishes what is cached.
        assert_eq!(listener.recv().await.unwrap(), Ok(json!("cached")));
        assert_eq!(listener.recv().await.unwrap(), Ok(json!("cached")));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
