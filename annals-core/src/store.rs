//! Persistence layer abstractions.
//!
//! This module describes the storage contract ([`EventStore`]), the ordered
//! read model a load returns ([`EventStream`]), the errors both sides raise,
//! and a reference in-memory implementation.
//!
//! Streams are addressed by a plain string id, derived from the aggregate's
//! kind and id by [`Conventions::stream_id`](crate::config::Conventions::stream_id).
use std::future::Future;

pub use nonempty::NonEmpty;
use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;

use crate::event::{Event, EventType, INITIAL_VERSION, Version};

pub mod inmemory;

/// The stream's recorded version did not match the version the writer
/// expected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", format_violation(.stream_id, .expected, .actual.as_ref()))]
pub struct ConcurrencyViolation {
    pub stream_id: String,
    /// Version the writer based its changes on.
    pub expected: Version,
    /// Version actually recorded. `None` for an empty stream.
    pub actual: Option<Version>,
}

/// Build a human-readable message for a [`ConcurrencyViolation`], including
/// an actionable hint for the caller.
fn format_violation(stream_id: &str, expected: &Version, actual: Option<&Version>) -> String {
    match actual {
        Some(actual) if *expected == INITIAL_VERSION => format!(
            "concurrency violation on stream `{stream_id}`: expected new stream, found version \
             {actual} (hint: another process created this aggregate; reload and retry)"
        ),
        Some(actual) => format!(
            "concurrency violation on stream `{stream_id}`: expected version {expected}, found \
             {actual} (hint: stream was modified; reload and retry)"
        ),
        None => format!(
            "concurrency violation on stream `{stream_id}`: expected version {expected}, found an \
             empty stream (hint: the aggregate was never saved; load it before saving)"
        ),
    }
}

/// A load asked for a version the stream does not contain.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("stream `{stream_id}` has no event with version {version}")]
pub struct VersionOutOfRange {
    pub stream_id: String,
    pub version: Version,
}

/// A batch whose versions do not continue the stream from the expected
/// version.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "batch for stream `{stream_id}` does not continue from version {expected_version}: event \
     {position} has version {found}, expected {expected} (hint: number new events from the \
     version the writer loaded)"
)]
pub struct NonContiguousBatch {
    pub stream_id: String,
    pub expected_version: Version,
    /// Index of the first mis-numbered event in the batch.
    pub position: usize,
    pub expected: Version,
    pub found: Version,
}

/// Check that `events` are numbered `expected_version + 1, + 2, ...` with no
/// gaps.
///
/// Backends call this before the version check so that a stream's recorded
/// version only ever moves forward.
///
/// # Errors
///
/// Returns [`NonContiguousBatch`] naming the first event out of sequence.
pub fn ensure_contiguous<E>(
    stream_id: &str,
    expected_version: Version,
    events: &NonEmpty<Event<E>>,
) -> Result<(), NonContiguousBatch> {
    let mismatch = events
        .iter()
        .zip(expected_version + 1..)
        .enumerate()
        .find(|(_, (event, next))| event.version() != *next);

    match mismatch {
        Some((position, (event, next))) => Err(NonContiguousBatch {
            stream_id: stream_id.to_string(),
            expected_version,
            position,
            expected: next,
            found: event.version(),
        }),
        None => Ok(()),
    }
}

/// Error from append operations.
#[derive(Debug, Error)]
pub enum AppendError<StoreError>
where
    StoreError: std::error::Error,
{
    /// Another writer moved the stream past the expected version.
    #[error(transparent)]
    Conflict(#[from] ConcurrencyViolation),
    /// The batch is not numbered to follow the expected version. Nothing was
    /// written.
    #[error(transparent)]
    NonContiguous(#[from] NonContiguousBatch),
    /// Underlying store error.
    #[error("store error: {0}")]
    Store(#[source] StoreError),
}

impl<StoreError: std::error::Error> AppendError<StoreError> {
    /// Create a store error variant.
    pub const fn store(err: StoreError) -> Self {
        Self::Store(err)
    }
}

/// Error from load operations.
#[derive(Debug, Error)]
pub enum LoadError<StoreError>
where
    StoreError: std::error::Error,
{
    #[error(transparent)]
    VersionOutOfRange(#[from] VersionOutOfRange),
    /// Underlying store error.
    #[error("store error: {0}")]
    Store(#[source] StoreError),
}

impl<StoreError: std::error::Error> LoadError<StoreError> {
    /// Create a store error variant.
    pub const fn store(err: StoreError) -> Self {
        Self::Store(err)
    }
}

/// Ordered events of a single stream, as returned by [`EventStore::load`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventStream<E> {
    stream_id: String,
    events: Vec<Event<E>>,
}

impl<E> EventStream<E> {
    #[must_use]
    pub fn new(stream_id: impl Into<String>, events: Vec<Event<E>>) -> Self {
        Self {
            stream_id: stream_id.into(),
            events,
        }
    }

    /// Build a stream from events in ascending version order, keeping only
    /// those up to and including `up_to` when given.
    ///
    /// # Errors
    ///
    /// Returns [`VersionOutOfRange`] if `up_to` is given and no event carries
    /// exactly that version, which includes every request against an empty
    /// stream.
    pub fn truncated(
        stream_id: impl Into<String>,
        mut events: Vec<Event<E>>,
        up_to: Option<Version>,
    ) -> Result<Self, VersionOutOfRange> {
        let stream_id = stream_id.into();
        if let Some(version) = up_to {
            let Some(index) = events.iter().position(|e| e.version() == version) else {
                return Err(VersionOutOfRange { stream_id, version });
            };
            events.truncate(index + 1);
        }
        Ok(Self { stream_id, events })
    }

    #[must_use]
    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    #[must_use]
    pub fn events(&self) -> &[Event<E>] {
        &self.events
    }

    #[must_use]
    pub fn into_events(self) -> Vec<Event<E>> {
        self.events
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Version of the last event, or [`INITIAL_VERSION`] for an empty stream.
    #[must_use]
    pub fn version(&self) -> Version {
        self.events.last().map_or(INITIAL_VERSION, Event::version)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Event<E>> {
        self.events.iter()
    }
}

impl<E> IntoIterator for EventStream<E> {
    type IntoIter = std::vec::IntoIter<Event<E>>;
    type Item = Event<E>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.into_iter()
    }
}

impl<'a, E> IntoIterator for &'a EventStream<E> {
    type IntoIter = std::slice::Iter<'a, Event<E>>;
    type Item = &'a Event<E>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.iter()
    }
}

/// Whether a stream whose recorded version is `current` accepts a write based
/// on `expected`.
///
/// A non-empty stream requires an exact match with its last event's version.
/// An empty stream accepts both [`INITIAL_VERSION`] and `0`, so writers
/// numbering from the aggregate sentinel and writers numbering an
/// [`EventChain`](crate::chain::EventChain) from 1 can both create it.
///
/// The two schemes overlap at `0`: a stream holding a single event with
/// version `0` also accepts a writer at `0` that believes the stream is
/// empty. Combined with [`ensure_contiguous`] the stream stays strictly
/// increasing, but mixing both schemes on one stream is not detected as a
/// conflict.
#[must_use]
pub const fn expected_version_matches(expected: Version, current: Option<Version>) -> bool {
    match current {
        Some(current) => current == expected,
        None => expected == INITIAL_VERSION || expected == 0,
    }
}

/// Abstraction over the persistence layer for event streams.
///
/// Backends only need to provide an atomic conditional [`append`](Self::append)
/// and an ordered [`load`](Self::load); [`save`](Self::save) layers the
/// empty-batch rule on top.
pub trait EventStore: Send + Sync {
    /// Store-specific error type.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Get the version of the last event recorded in a stream.
    ///
    /// Returns `None` for streams with no events.
    ///
    /// # Errors
    ///
    /// Returns a store-specific error when the operation fails.
    fn stream_version<'a>(
        &'a self,
        stream_id: &'a str,
    ) -> impl Future<Output = Result<Option<Version>, Self::Error>> + Send + 'a;

    /// Append events iff the stream's recorded version equals
    /// `expected_version` (see [`expected_version_matches`]).
    ///
    /// The batch must be numbered `expected_version + 1` onwards with no gaps
    /// (see [`ensure_contiguous`]), so versions within a stream are unique and
    /// strictly increasing. The check and the append happen atomically with
    /// respect to other appends on the same stream.
    ///
    /// # Errors
    ///
    /// Returns [`AppendError::NonContiguous`] if the batch is mis-numbered,
    /// [`AppendError::Conflict`] if the version doesn't match, or
    /// [`AppendError::Store`] if persistence fails.
    fn append<'a, E>(
        &'a self,
        stream_id: &'a str,
        expected_version: Version,
        events: NonEmpty<Event<E>>,
    ) -> impl Future<Output = Result<(), AppendError<Self::Error>>> + Send + 'a
    where
        E: EventType + Serialize + Send + 'a;

    /// Persist a batch of events for one stream.
    ///
    /// An empty batch is a no-op that succeeds without touching the store.
    /// A non-empty batch must be numbered from `expected_version + 1`, as
    /// [`EventChain::continuing_from`](crate::chain::EventChain::continuing_from)
    /// does.
    ///
    /// # Errors
    ///
    /// Same as [`append`](Self::append).
    fn save<'a, E>(
        &'a self,
        stream_id: &'a str,
        expected_version: Version,
        events: Vec<Event<E>>,
    ) -> impl Future<Output = Result<(), AppendError<Self::Error>>> + Send + 'a
    where
        E: EventType + Serialize + Send + 'a,
    {
        async move {
            let Some(events) = NonEmpty::from_vec(events) else {
                tracing::trace!(stream_id, "empty batch; nothing to save");
                return Ok(());
            };
            self.append(stream_id, expected_version, events).await
        }
    }

    /// Load a stream's events in ascending version order.
    ///
    /// A stream that was never written yields an empty [`EventStream`]. With
    /// `up_to`, the stream is truncated at the event carrying that version.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::VersionOutOfRange`] if `up_to` names a version the
    /// stream does not contain, or [`LoadError::Store`] if loading or decoding
    /// fails.
    fn load<'a, E>(
        &'a self,
        stream_id: &'a str,
        up_to: Option<Version>,
    ) -> impl Future<Output = Result<EventStream<E>, LoadError<Self::Error>>> + Send + 'a
    where
        E: DeserializeOwned + Send + 'a;
}
