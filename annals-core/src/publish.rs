//! Delivery of committed events to the outside world.
//!
//! Publication happens after a successful save, so a publisher failure never
//! undoes persisted events. The default [`NoPublisher`] discards everything;
//! [`RecordingPublisher`] keeps events in memory for tests and in-process
//! wiring.

use std::{
    convert::Infallible,
    future::Future,
    sync::{Arc, Mutex},
};

use crate::event::Event;

/// Receives events once they are committed to a stream.
pub trait EventPublisher<E>: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Publish a batch of events just saved to `stream_id`.
    ///
    /// # Errors
    ///
    /// Returns a publisher-specific error if delivery fails.
    fn publish<'a>(
        &'a self,
        stream_id: &'a str,
        events: &'a [Event<E>],
    ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;
}

/// Publisher that drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPublisher;

impl<E> EventPublisher<E> for NoPublisher {
    type Error = Infallible;

    fn publish<'a>(
        &'a self,
        _stream_id: &'a str,
        _events: &'a [Event<E>],
    ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a {
        std::future::ready(Ok(()))
    }
}

/// In-process publisher that keeps every published event.
///
/// Clones share the same buffer.
#[derive(Debug)]
pub struct RecordingPublisher<E> {
    published: Arc<Mutex<Vec<(String, Event<E>)>>>,
}

impl<E> RecordingPublisher<E> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            published: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Events published so far, oldest first.
    #[must_use]
    pub fn published(&self) -> Vec<Event<E>>
    where
        E: Clone,
    {
        let published = self.published.lock().expect("publisher lock poisoned");
        published.iter().map(|(_, event)| event.clone()).collect()
    }

    /// Events published so far for one stream, oldest first.
    #[must_use]
    pub fn published_to(&self, stream_id: &str) -> Vec<Event<E>>
    where
        E: Clone,
    {
        let published = self.published.lock().expect("publisher lock poisoned");
        published
            .iter()
            .filter(|(stream, _)| stream == stream_id)
            .map(|(_, event)| event.clone())
            .collect()
    }
}

impl<E> Clone for RecordingPublisher<E> {
    fn clone(&self) -> Self {
        Self {
            published: Arc::clone(&self.published),
        }
    }
}

impl<E> Default for RecordingPublisher<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> EventPublisher<E> for RecordingPublisher<E>
where
    E: Clone + Send + Sync,
{
    type Error = Infallible;

    fn publish<'a>(
        &'a self,
        stream_id: &'a str,
        events: &'a [Event<E>],
    ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a {
        let mut published = self.published.lock().expect("publisher lock poisoned");
        published.extend(
            events
                .iter()
                .map(|event| (stream_id.to_string(), event.clone())),
        );
        tracing::trace!(stream_id, event_count = events.len(), "recorded published events");
        std::future::ready(Ok(()))
    }
}
