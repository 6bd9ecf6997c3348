//! Observation normalizer.
//!
//! Response transforms and error handlers may answer either with a plain value
//! or with a lazily produced sequence of values (e.g. a value that needs a
//! second lookup). [`ensure_observation`] folds both shapes into one
//! [`LazySequence`] so the engine never branches on which one it got.

use futures::stream::{self, BoxStream, StreamExt};

use crate::error::TransportError;

/// A lazily evaluated sequence of results, as produced by a transport or a transform.
pub type LazySequence<T> = BoxStream<'static, Result<T, TransportError>>;

/// Either an immediately available value or a sequence that yields values later.
pub enum Observation<T> {
    Value(T),
    Sequence(LazySequence<T>),
}

impl<T> Observation<T>
where
    T: Send + 'static,
{
    pub fn value(value: T) -> Self {
        Self::Value(value)
    }

    /// Wraps any `Send` stream of results as an observation.
    pub fn sequence<S>(sequence: S) -> Self
    where
        S: futures::Stream<Item = Result<T, TransportError>> + Send + 'static,
    {
        Self::Sequence(sequence.boxed())
    }

    /// Returns `true` if the value is already available.
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Value(_))
    }
}

impl<T> std::fmt::Debug for Observation<T>
where
    T: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Self::Sequence(_) => f.write_str("Sequence(..)"),
        }
    }
}

/// Normalizes an observation into a lazy sequence.
///
/// Sequences pass through untouched; a plain value becomes a single-element
/// sequence that resolves immediately.
///
/// # Examples
///
/// ```
/// use futures::StreamExt;
/// use reqcache::observe::{ensure_observation, Observation};
///
/// # futures::executor::block_on(async {
/// let mut seq = ensure_observation(Observation::value(7));
/// assert_eq!(seq.next().await.unwrap().unwrap(), 7);
/// assert!(seq.next().await.is_none());
/// # });
/// ```
pub fn ensure_observation<T>(observation: Observation<T>) -> LazySequence<T>
where
    T: Send + 'static,
{
    match observation {
        Observation::Value(value) => stream::once(async move { Ok(value) }).boxed(),
        Observation::Sequence(sequence) => sequence,
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;

    use super::*;

    #[tokio::test]
    async fn value_becomes_single_element_sequence() {
        let items: Vec<_> = ensure_observation(Observation::value("v")).collect().await;
        assert_eq!(items, vec![Ok("v")]);
    }

    #[tokio::test]
    async fn sequence_passes_through_unchanged() {
        let source = stream::iter(vec![Ok(1), Ok(2), Err(TransportError::Network("reset".into()))]);
        let items: Vec<_> = ensure_observation(Observation::sequence(source)).collect().await;
        assert_eq!(
            items,
            vec![Ok(1), Ok(2), Err(TransportError::Network("reset".into()))]
        );
    }

    #[tokio::test]
    async fn deferred_sequence_is_not_double_wrapped() {
        let source = stream::once(async {
            tokio::task::yield_now().await;
            Ok::<_, TransportError>(vec![1, 2, 3])
        });
        let observation = Observation::sequence(source);
        assert!(!observation.is_ready());
        let items: Vec<_> = ensure_observation(observation).collect().await;
        assert_eq!(items, vec![Ok(vec![1, 2, 3])]);
    }
}
