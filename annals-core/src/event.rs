//! Domain events and their versioned envelope.
//!
//! [`DomainEvent`] is the lightweight trait every concrete event struct
//! implements. [`EventType`] is its instance-level counterpart, implemented by
//! the per-aggregate event enums, and is what the kernel dispatches on.
//! [`Event`] pairs a payload with the version it was assigned when recorded.

use serde::{Deserialize, Serialize};

/// Position of an event within its aggregate's stream.
pub type Version = i64;

/// Version of an aggregate that has neither applied nor persisted anything.
pub const INITIAL_VERSION: Version = -1;

/// Marker trait for concrete event types.
///
/// Each event carries a stable [`Self::KIND`] identifier. Event types that
/// stand in for a family of events (an "interface" such as "any sales order
/// event", or a more general "ancestor" event) are named by
/// [`Self::INTERFACES`] and [`Self::ANCESTORS`]. Aggregates may register apply
/// handlers against any of these identities.
///
/// Most projects derive this with `#[derive(DomainEvent)]`.
pub trait DomainEvent {
    const KIND: &'static str;

    /// Capabilities this event provides, walked before its own kind.
    const INTERFACES: &'static [&'static str] = &[];

    /// More general event types, most-derived first, walked after its own
    /// kind.
    const ANCESTORS: &'static [&'static str] = &[];
}

/// Runtime type identity of an event value.
///
/// This trait has a blanket implementation for every [`DomainEvent`], so a
/// single event struct can serve directly as an aggregate's event type. Sum
/// types (generated by `#[derive(Aggregate)]`) forward to the variant they
/// hold.
pub trait EventType {
    /// Concrete kind of this event.
    fn kind(&self) -> &'static str;

    fn interfaces(&self) -> &'static [&'static str] {
        &[]
    }

    fn ancestors(&self) -> &'static [&'static str] {
        &[]
    }

    /// Every type identity this event is dispatched under, in walk order:
    /// interfaces, then the concrete kind, then ancestors.
    fn type_hierarchy(&self) -> impl Iterator<Item = &'static str> {
        self.interfaces()
            .iter()
            .copied()
            .chain(std::iter::once(self.kind()))
            .chain(self.ancestors().iter().copied())
    }
}

impl<T: DomainEvent> EventType for T {
    fn kind(&self) -> &'static str {
        T::KIND
    }

    fn interfaces(&self) -> &'static [&'static str] {
        T::INTERFACES
    }

    fn ancestors(&self) -> &'static [&'static str] {
        T::ANCESTORS
    }
}

/// Borrow a concrete event out of an aggregate's event sum type.
///
/// Generated by `#[derive(Aggregate)]` for every listed event. The blanket
/// implementation covers aggregates whose event type is a single struct.
pub trait EventVariant<E> {
    fn as_variant(&self) -> Option<&E>;
}

impl<E> EventVariant<E> for E {
    fn as_variant(&self) -> Option<&E> {
        Some(self)
    }
}

/// An immutable, versioned fact about one aggregate.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event<E> {
    version: Version,
    payload: E,
}

impl<E> Event<E> {
    #[must_use]
    pub const fn new(version: Version, payload: E) -> Self {
        Self { version, payload }
    }

    #[must_use]
    pub const fn version(&self) -> Version {
        self.version
    }

    #[must_use]
    pub const fn payload(&self) -> &E {
        &self.payload
    }

    #[must_use]
    pub fn into_payload(self) -> E {
        self.payload
    }
}

impl<E: EventType> Event<E> {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        self.payload.kind()
    }
}
