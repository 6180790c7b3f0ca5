//! In-memory event store implementation for testing.
//!
//! This module provides [`Store`], a thread-safe in-memory implementation of
//! [`EventStore`](super::EventStore) suitable for unit tests and examples.
//! Payloads are held as `serde_json::Value`, so every save and load goes
//! through the same serde round trip a real backend would.
//!
//! # Example
//!
//! ```
//! use annals_core::store::inmemory;
//!
//! let store = inmemory::Store::new();
//! let shared = store.clone(); // both handles see the same streams
//! # drop(shared);
//! ```

use std::{
    collections::HashMap,
    future::Future,
    sync::{Arc, RwLock},
};

use nonempty::NonEmpty;
use serde::{Serialize, de::DeserializeOwned};

use crate::{
    event::{Event, EventType, Version},
    store::{
        AppendError, ConcurrencyViolation, EventStore, EventStream, LoadError, ensure_contiguous,
        expected_version_matches,
    },
};

/// Event as held by the in-memory store.
#[derive(Clone, Debug, PartialEq)]
pub struct StoredEvent {
    pub version: Version,
    pub kind: String,
    pub data: serde_json::Value,
}

/// In-memory event store that keeps streams in a hash map.
///
/// Cloning is cheap and every clone shares the same streams.
#[derive(Clone, Default)]
pub struct Store {
    inner: Arc<RwLock<HashMap<String, Vec<StoredEvent>>>>,
}

impl Store {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw stored form of a stream, for inspection in tests.
    #[must_use]
    pub fn stored_events(&self, stream_id: &str) -> Vec<StoredEvent> {
        let inner = self.inner.read().expect("in-memory store lock poisoned");
        inner.get(stream_id).cloned().unwrap_or_default()
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read().expect("in-memory store lock poisoned");
        f.debug_struct("Store")
            .field("streams", &inner.len())
            .finish()
    }
}

/// Error type for in-memory store.
#[derive(Debug, thiserror::Error)]
pub enum InMemoryError {
    #[error("failed to serialize event at index {index}: {source}")]
    Serialization {
        index: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to deserialize event with version {version}: {source}")]
    Deserialization {
        version: Version,
        #[source]
        source: serde_json::Error,
    },
}

impl EventStore for Store {
    type Error = InMemoryError;

    #[tracing::instrument(skip(self))]
    fn stream_version<'a>(
        &'a self,
        stream_id: &'a str,
    ) -> impl Future<Output = Result<Option<Version>, Self::Error>> + Send + 'a {
        let version = {
            let inner = self.inner.read().expect("in-memory store lock poisoned");
            inner
                .get(stream_id)
                .and_then(|stream| stream.last().map(|e| e.version))
        };
        tracing::trace!(?version, "retrieved stream version");
        std::future::ready(Ok(version))
    }

    #[tracing::instrument(skip(self, events), fields(event_count = events.len()))]
    fn append<'a, E>(
        &'a self,
        stream_id: &'a str,
        expected_version: Version,
        events: NonEmpty<Event<E>>,
    ) -> impl Future<Output = Result<(), AppendError<Self::Error>>> + Send + 'a
    where
        E: EventType + Serialize + Send + 'a,
    {
        let result = (|| -> Result<(), AppendError<InMemoryError>> {
            ensure_contiguous(stream_id, expected_version, &events).inspect_err(|e| {
                tracing::debug!(position = e.position, found = e.found, "batch out of sequence");
            })?;

            // Serialize everything before taking the lock
            let mut staged = Vec::with_capacity(events.len());
            for (index, event) in events.iter().enumerate() {
                let data = serde_json::to_value(event.payload()).map_err(|source| {
                    AppendError::store(InMemoryError::Serialization { index, source })
                })?;
                staged.push(StoredEvent {
                    version: event.version(),
                    kind: event.kind().to_string(),
                    data,
                });
            }

            let mut inner = self.inner.write().expect("in-memory store lock poisoned");
            let current = inner
                .get(stream_id)
                .and_then(|stream| stream.last().map(|e| e.version));

            if !expected_version_matches(expected_version, current) {
                tracing::debug!(
                    expected_version,
                    ?current,
                    "version mismatch, rejecting append"
                );
                return Err(ConcurrencyViolation {
                    stream_id: stream_id.to_string(),
                    expected: expected_version,
                    actual: current,
                }
                .into());
            }

            let version = staged.last().map(|e| e.version);
            inner.entry(stream_id.to_string()).or_default().extend(staged);
            drop(inner);
            tracing::debug!(?version, "events appended to stream");
            Ok(())
        })();

        std::future::ready(result)
    }

    #[tracing::instrument(skip(self))]
    fn load<'a, E>(
        &'a self,
        stream_id: &'a str,
        up_to: Option<Version>,
    ) -> impl Future<Output = Result<EventStream<E>, LoadError<Self::Error>>> + Send + 'a
    where
        E: DeserializeOwned + Send + 'a,
    {
        let stored = self.stored_events(stream_id);

        let result = (|| -> Result<EventStream<E>, LoadError<InMemoryError>> {
            let mut events = Vec::with_capacity(stored.len());
            for StoredEvent { version, data, .. } in stored {
                let payload = serde_json::from_value(data).map_err(|source| {
                    LoadError::store(InMemoryError::Deserialization { version, source })
                })?;
                events.push(Event::new(version, payload));
            }

            let stream = EventStream::truncated(stream_id, events, up_to)?;
            tracing::trace!(
                event_count = stream.len(),
                version = stream.version(),
                "loaded stream"
            );
            Ok(stream)
        })();

        std::future::ready(result)
    }
}
