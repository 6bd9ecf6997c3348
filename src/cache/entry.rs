//! The per-key request entry.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tokio::sync::broadcast;

use crate::error::TransportError;

/// What an entry's listener delivers: a response or the error that ended a call.
pub type Outcome<O> = Result<O, TransportError>;

/// Cache and dedup state for one distinct request input of one endpoint.
///
/// Entries are created by the [`Registry`](super::Registry) and live as long as
/// the engine that owns them. Only the engine mutates the cached fields; any
/// number of callers may read them or [`subscribe`](Self::subscribe) to the
/// listener.
pub struct RequestEntry<I, O> {
    key: String,
    state: Mutex<EntryState<I, O>>,
    listener: broadcast::Sender<Outcome<O>>,
    invalidated: AtomicBool,
}

struct EntryState<I, O> {
    latest_request: Option<I>,
    latest_response: Option<O>,
    stale: bool,
    in_flight: usize,
    // Sequence number handed to the most recently issued call.
    issued: u64,
    // Sequence number of the call that produced `latest_response`.
    applied: u64,
    // Bumped on every completion; staleness timers only fire for their own generation.
    generation: u64,
}

/// What `send` should do after recording a request, decided in one critical section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SendPlan {
    pub(crate) deduped: bool,
    pub(crate) replay: bool,
    pub(crate) call: Option<u64>,
}

impl<I, O> RequestEntry<I, O> {
    /// The canonical key this entry was derived from.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn is_invalidated(&self) -> bool {
        self.invalidated.load(Ordering::Acquire)
    }

    /// Flags the entry as invalidated. The engine only ever initializes this to
    /// `false`; it exists for collaborators that want to force invalidation.
    pub fn set_invalidated(&self, invalidated: bool) {
        self.invalidated.store(invalidated, Ordering::Release);
    }
}

impl<I, O> RequestEntry<I, O>
where
    I: Clone,
    O: Clone,
{
    pub(crate) fn new(key: String, listener_capacity: usize) -> Self {
        let (listener, _) = broadcast::channel(listener_capacity.max(1));
        Self {
            key,
            state: Mutex::new(EntryState {
                latest_request: None,
                latest_response: None,
                stale: true,
                in_flight: 0,
                issued: 0,
                applied: 0,
                generation: 0,
            }),
            listener,
            invalidated: AtomicBool::new(false),
        }
    }

    /// The input most recently passed to `send` for this key.
    pub fn latest_request(&self) -> Option<I> {
        self.state.lock().latest_request.clone()
    }

    /// The most recent successful response, kept after it goes stale.
    pub fn latest_response(&self) -> Option<O> {
        self.state.lock().latest_response.clone()
    }

    /// `true` until the first completion, and again once the stale window elapses.
    pub fn is_stale(&self) -> bool {
        self.state.lock().stale
    }

    /// `true` while at least one transport call for this key is in flight.
    pub fn has_active_call(&self) -> bool {
        self.state.lock().in_flight > 0
    }

    /// Subscribes to every result published for this entry from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Outcome<O>> {
        self.listener.subscribe()
    }

    /// Number of live listener receivers, including tickets not yet dropped.
    pub fn subscriber_count(&self) -> usize {
        self.listener.receiver_count()
    }

    // Records `input` and applies the dedup / replay / trigger policy atomically.
    pub(crate) fn plan_send(&self, input: I, force: bool) -> SendPlan {
        let mut state = self.state.lock();
        state.latest_request = Some(input);

        if !force && state.in_flight > 0 {
            return SendPlan {
                deduped: true,
                replay: false,
                call: None,
            };
        }

        let replay = state.latest_response.is_some();
        let call = if force || state.stale {
            state.in_flight += 1;
            state.issued += 1;
            Some(state.issued)
        } else {
            None
        };

        SendPlan {
            deduped: false,
            replay,
            call,
        }
    }

    // Stores a response unless a newer call already landed one.
    pub(crate) fn store_response(&self, call: u64, response: O) -> bool {
        let mut state = self.state.lock();
        if call < state.applied {
            return false;
        }
        state.applied = call;
        state.latest_response = Some(response);
        true
    }

    // Marks the entry fresh and releases one in-flight slot. Returns the
    // freshness generation the staleness timer must match.
    pub(crate) fn complete_call(&self) -> u64 {
        let mut state = self.state.lock();
        state.stale = false;
        state.in_flight = state.in_flight.saturating_sub(1);
        state.generation += 1;
        state.generation
    }

    // Releases an in-flight slot for a call that never reached completion.
    pub(crate) fn abandon_call(&self) {
        let mut state = self.state.lock();
        state.in_flight = state.in_flight.saturating_sub(1);
    }

    // Flips the entry stale if no completion happened since `generation`.
    pub(crate) fn expire(&self, generation: u64) -> bool {
        let mut state = self.state.lock();
        if state.generation != generation {
            return false;
        }
        state.stale = true;
        true
    }

    pub(crate) fn publish(&self, outcome: Outcome<O>) {
        // No receivers is not an error: results stay readable via `latest_response`.
        let _ = self.listener.send(outcome);
    }
}

impl<I, O> std::fmt::Debug for RequestEntry<I, O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("RequestEntry")
            .field("key", &self.key)
            .field("stale", &state.stale)
            .field("in_flight", &state.in_flight)
            .field("has_response", &state.latest_response.is_some())
            .field("invalidated", &self.invalidated.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> RequestEntry<String, u32> {
        RequestEntry::new("\"k\"".to_owned(), 4)
    }

    #[test]
    fn new_entry_is_stale_and_empty() {
        let e = entry();
        assert_eq!(e.key(), "\"k\"");
        assert!(e.is_stale());
        assert!(!e.is_invalidated());
        assert!(!e.has_active_call());
        assert_eq!(e.latest_request(), None);
        assert_eq!(e.latest_response(), None);
    }

    #[test]
    fn first_send_triggers_a_call() {
        let e = entry();
        let plan = e.plan_send("k".into(), false);
        assert!(!plan.deduped);
        assert_eq!(plan.call, Some(1));
        assert!(!plan.replay);
        assert!(e.has_active_call());
    }

    #[test]
    fn dedup_still_records_request() {
        let e = entry();
        e.plan_send("first".into(), false);
        let plan = e.plan_send("second".into(), false);
        assert!(plan.deduped);
        assert_eq!(plan.call, None);
        assert_eq!(e.latest_request().as_deref(), Some("second"));
    }

    #[test]
    fn fresh_entry_replays_without_calling() {
        let e = entry();
        let call = e.plan_send("k".into(), false).call.unwrap();
        assert!(e.store_response(call, 7));
        e.complete_call();

        let plan = e.plan_send("k".into(), false);
        assert!(plan.replay);
        assert_eq!(plan.call, None);
    }

    #[test]
    fn force_bypasses_dedup_and_counts_in_flight() {
        let e = entry();
        e.plan_send("k".into(), true);
        let plan = e.plan_send("k".into(), true);
        assert_eq!(plan.call, Some(2));

        e.complete_call();
        assert!(e.has_active_call());
        e.complete_call();
        assert!(!e.has_active_call());
    }

    #[test]
    fn older_call_cannot_overwrite_newer_response() {
        let e = entry();
        let first = e.plan_send("k".into(), true).call.unwrap();
        let second = e.plan_send("k".into(), true).call.unwrap();

        assert!(e.store_response(second, 2));
        assert!(!e.store_response(first, 1));
        assert_eq!(e.latest_response(), Some(2));
    }

    #[test]
    fn expire_ignores_superseded_generation() {
        let e = entry();
        e.plan_send("k".into(), true);
        let old = e.complete_call();
        e.plan_send("k".into(), true);
        let current = e.complete_call();

        assert!(!e.expire(old));
        assert!(!e.is_stale());
        assert!(e.expire(current));
        assert!(e.is_stale());
    }

    #[test]
    fn abandon_releases_slot_without_freshening() {
        let e = entry();
        e.plan_send("k".into(), false);
        e.abandon_call();
        assert!(!e.has_active_call());
        assert!(e.is_stale());
    }

    #[tokio::test]
    async fn publish_reaches_every_subscriber() {
        let e = entry();
        assert_eq!(e.subscriber_count(), 0);
        // No receivers: the result is dropped, not an error.
        e.publish(Ok(1));

        let mut a = e.subscribe();
        let mut b = e.subscribe();
        assert_eq!(e.subscriber_count(), 2);
        e.publish(Err(TransportError::Aborted));
        assert_eq!(a.recv().await.unwrap(), Err(TransportError::Aborted));
        assert_eq!(b.recv().await.unwrap(), Err(TransportError::Aborted));

        drop(a);
        assert_eq!(e.subscriber_count(), 1);
    }

    #[test]
    fn invalidated_flag_is_toggleable() {
        let e = entry();
        e.set_invalidated(true);
        assert!(e.is_invalidated());
        e.set_invalidated(false);
        assert!(!e.is_invalidated());
    }
}
