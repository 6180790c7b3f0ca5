//! Ordered event buffers with sequential versions.
//!
//! An [`EventChain`] builds a batch of events independently of any store,
//! assigning each one the next version as it is added. It is handy both as a
//! batch container for [`EventStore::save`](crate::store::EventStore::save) and
//! for building test histories.
//!
//! ```
//! use annals_core::chain::EventChain;
//!
//! let chain = EventChain::<&str>::new().add("signed-up").add("subscribed");
//! assert_eq!(chain[1].version(), 2);
//! assert_eq!(chain[..1].len(), 1);
//! ```

use std::ops::Deref;

use crate::event::{Event, Version};

/// Append-only sequence of events with gap-free, strictly increasing versions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventChain<E> {
    events: Vec<Event<E>>,
    last_version: Version,
}

impl<E> EventChain<E> {
    /// Start a chain whose first event gets version 1.
    #[must_use]
    pub const fn new() -> Self {
        Self::continuing_from(0)
    }

    /// Start a chain that continues a stream whose last event has
    /// `last_version`.
    #[must_use]
    pub const fn continuing_from(last_version: Version) -> Self {
        Self {
            events: Vec::new(),
            last_version,
        }
    }

    /// Append an event, builder style.
    #[must_use]
    pub fn add(mut self, payload: impl Into<E>) -> Self {
        self.push(payload);
        self
    }

    /// Append an event and return the version it was assigned.
    pub fn push(&mut self, payload: impl Into<E>) -> Version {
        self.last_version += 1;
        self.events
            .push(Event::new(self.last_version, payload.into()));
        self.last_version
    }

    /// Version of the most recently added event, or the starting point if
    /// nothing has been added.
    #[must_use]
    pub const fn last_version(&self) -> Version {
        self.last_version
    }

    #[must_use]
    pub fn into_vec(self) -> Vec<Event<E>> {
        self.events
    }
}

impl<E> Default for EventChain<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Deref for EventChain<E> {
    type Target = [Event<E>];

    fn deref(&self) -> &Self::Target {
        &self.events
    }
}

impl<E> IntoIterator for EventChain<E> {
    type IntoIter = std::vec::IntoIter<Event<E>>;
    type Item = Event<E>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.into_iter()
    }
}

impl<'a, E> IntoIterator for &'a EventChain<E> {
    type IntoIter = std::slice::Iter<'a, Event<E>>;
    type Item = &'a Event<E>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.iter()
    }
}

impl<E> From<EventChain<E>> for Vec<Event<E>> {
    fn from(chain: EventChain<E>) -> Self {
        chain.events
    }
}
