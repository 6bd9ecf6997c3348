//! Handles returned by the engine.

use std::sync::Arc;

use tokio::sync::broadcast::{self, error::RecvError};
use tracing::warn;

use crate::cache::{Outcome, RequestEntry};
use crate::error::TransportError;

/// What `send` decided to do for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// A call for the same key was already in flight; nothing new was started.
    Deduped,
    /// The cached response will be replayed; the entry is fresh so no call was made.
    Replayed,
    /// A transport call was started and no cached response existed to replay.
    Called,
    /// The cached response will be replayed and a transport call was started too.
    ReplayedAndCalled,
    /// Nothing replayed and nothing started: the entry is fresh but its last
    /// call produced no response (it failed or yielded nothing).
    Idle,
}

impl Dispatch {
    pub(crate) fn from_plan(deduped: bool, replay: bool, call: bool) -> Self {
        match (deduped, replay, call) {
            (true, _, _) => Self::Deduped,
            (false, true, true) => Self::ReplayedAndCalled,
            (false, true, false) => Self::Replayed,
            (false, false, true) => Self::Called,
            (false, false, false) => Self::Idle,
        }
    }

    /// `true` if this `send` started a transport call.
    pub fn started_call(self) -> bool {
        matches!(self, Self::Called | Self::ReplayedAndCalled)
    }

    /// `true` if the cached response is being replayed on the listener.
    pub fn replays(self) -> bool {
        matches!(self, Self::Replayed | Self::ReplayedAndCalled)
    }
}

/// The result of [`RequestEngine::send`](super::RequestEngine::send).
///
/// The ticket's listener was subscribed before any replay or call was
/// scheduled, so it observes every result for the entry from this `send` on,
/// including the deferred replay of a cached response.
pub struct Ticket<I, O> {
    entry: Arc<RequestEntry<I, O>>,
    listener: broadcast::Receiver<Outcome<O>>,
    dispatch: Dispatch,
}

impl<I, O> Ticket<I, O>
where
    I: Clone,
    O: Clone,
{
    pub(crate) fn new(
        entry: Arc<RequestEntry<I, O>>,
        listener: broadcast::Receiver<Outcome<O>>,
        dispatch: Dispatch,
    ) -> Self {
        Self {
            entry,
            listener,
            dispatch,
        }
    }

    /// The entry this request resolved to.
    pub fn entry(&self) -> &Arc<RequestEntry<I, O>> {
        &self.entry
    }

    pub fn dispatch(&self) -> Dispatch {
        self.dispatch
    }

    /// Waits for the next result published on the entry's listener.
    ///
    /// Results dropped because this receiver fell behind are skipped with a
    /// warning. Returns `None` only if the listener closed.
    pub async fn recv(&mut self) -> Option<Outcome<O>> {
        loop {
            match self.listener.recv().await {
                Ok(outcome) => return Some(outcome),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(key = %self.entry.key(), skipped, "listener lagged — skipping results");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Gives up the ticket, keeping only its listener.
    pub fn into_listener(self) -> broadcast::Receiver<Outcome<O>> {
        self.listener
    }

    /// Splits the ticket into its entry and listener.
    pub fn into_parts(self) -> (Arc<RequestEntry<I, O>>, broadcast::Receiver<Outcome<O>>) {
        (self.entry, self.listener)
    }
}

impl<I, O> std::fmt::Debug for Ticket<I, O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ticket")
            .field("key", &self.entry.key())
            .field("dispatch", &self.dispatch)
            .finish()
    }
}

/// Published on the engine broadcast each time a transport call completes, for any key.
pub struct Completion<I, O> {
    pub entry: Arc<RequestEntry<I, O>>,
    /// The error that ended the call, or `None` if it succeeded.
    pub error: Option<TransportError>,
}

impl<I, O> Completion<I, O> {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

impl<I, O> Clone for Completion<I, O> {
    fn clone(&self) -> Self {
        Self {
            entry: Arc::clone(&self.entry),
            error: self.error.clone(),
        }
    }
}

impl<I, O> std::fmt::Debug for Completion<I, O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Completion")
            .field("key", &self.entry.key())
            .field("error", &self.error)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_from_plan() {
        assert_eq!(Dispatch::from_plan(true, false, false), Dispatch::Deduped);
        assert_eq!(Dispatch::from_plan(false, true, true), Dispatch::ReplayedAndCalled);
        assert_eq!(Dispatch::from_plan(false, true, false), Dispatch::Replayed);
        assert_eq!(Dispatch::from_plan(false, false, true), Dispatch::Called);
        assert_eq!(Dispatch::from_plan(false, false, false), Dispatch::Idle);
    }

    #[test]
    fn dispatch_flags() {
        assert!(Dispatch::ReplayedAndCalled.started_call());
        assert!(Dispatch::ReplayedAndCalled.replays());
        assert!(!Dispatch::Deduped.started_call());
        assert!(!Dispatch::Deduped.replays());
        assert!(Dispatch::Replayed.replays());
    }
}
