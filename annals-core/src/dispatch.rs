//! Apply-handler registry and per-instance dispatch cache.
//!
//! Each aggregate type registers its handlers once into an
//! [`ApplyHandlers`] table keyed by event type identity. When an event is
//! applied, the kernel walks the event's type hierarchy (see
//! [`EventType::type_hierarchy`]) and collects the handler registered for each
//! identity, so a handler for an interface and a handler for the concrete
//! kind both fire. The walk result is memoised per aggregate instance by
//! [`DispatchCache`], keyed by the event's concrete kind.

use std::collections::HashMap;

use crate::{
    aggregate::{Aggregate, AggregateError, Apply},
    event::{DomainEvent, EventType, EventVariant},
};

/// Handler invoked with the aggregate state and the event being applied.
pub type ApplyFn<A> = fn(&mut A, &<A as Aggregate>::Event);

/// Table of apply handlers for one aggregate type.
///
/// At most one handler is held per type identity; registering a second
/// handler for the same identity replaces the first.
///
/// ```ignore
/// impl Aggregate for SalesOrder {
///     // ...
///     fn register_handlers(handlers: &mut ApplyHandlers<Self>) {
///         handlers
///             .apply::<OrderPlaced>()
///             .on("sales-order-event", |order, _| order.touched += 1);
///     }
/// }
/// ```
pub struct ApplyHandlers<A: Aggregate> {
    by_type: HashMap<&'static str, ApplyFn<A>>,
}

impl<A: Aggregate> ApplyHandlers<A> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            by_type: HashMap::new(),
        }
    }

    /// Build the table for `A` by running its registration hook.
    #[must_use]
    pub fn for_aggregate() -> Self {
        let mut handlers = Self::new();
        A::register_handlers(&mut handlers);
        tracing::trace!(
            aggregate = A::KIND,
            handler_count = handlers.len(),
            "registered apply handlers"
        );
        handlers
    }

    /// Register a raw handler for a type identity (a concrete kind, an
    /// interface or an ancestor).
    pub fn on(&mut self, type_identity: &'static str, handler: ApplyFn<A>) -> &mut Self {
        if self.by_type.insert(type_identity, handler).is_some() {
            tracing::warn!(
                aggregate = A::KIND,
                type_identity,
                "apply handler registered twice; keeping the latest"
            );
        }
        self
    }

    /// Register `A`'s [`Apply<E>`] implementation for the concrete event `E`.
    pub fn apply<E>(&mut self) -> &mut Self
    where
        E: DomainEvent,
        A: Apply<E>,
        A::Event: EventVariant<E>,
    {
        self.on(E::KIND, apply_variant::<A, E>)
    }

    #[must_use]
    pub fn contains(&self, type_identity: &str) -> bool {
        self.by_type.contains_key(type_identity)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_type.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_type.is_empty()
    }

    /// Walk the event's type hierarchy and collect matching handlers in walk
    /// order.
    fn resolve(&self, event: &A::Event) -> Vec<ApplyFn<A>> {
        event
            .type_hierarchy()
            .filter_map(|identity| self.by_type.get(identity).copied())
            .collect()
    }
}

impl<A: Aggregate> Default for ApplyHandlers<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: Aggregate> std::fmt::Debug for ApplyHandlers<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut identities: Vec<_> = self.by_type.keys().collect();
        identities.sort_unstable();
        f.debug_struct("ApplyHandlers")
            .field("aggregate", &A::KIND)
            .field("identities", &identities)
            .finish()
    }
}

fn apply_variant<A, E>(aggregate: &mut A, event: &A::Event)
where
    A: Aggregate + Apply<E>,
    A::Event: EventVariant<E>,
{
    if let Some(event) = EventVariant::<E>::as_variant(event) {
        Apply::<E>::apply(aggregate, event);
    }
}

/// Resolved handler lists for one aggregate instance, keyed by concrete
/// event kind.
pub(crate) struct DispatchCache<A: Aggregate> {
    by_kind: HashMap<&'static str, Vec<ApplyFn<A>>>,
}

impl<A: Aggregate> DispatchCache<A> {
    pub(crate) fn new() -> Self {
        Self {
            by_kind: HashMap::new(),
        }
    }

    /// Handlers to run for `event`, resolving and caching on first sight of
    /// its kind.
    ///
    /// An empty resolution is an error when `strict` is set.
    pub(crate) fn resolve(
        &mut self,
        registry: &ApplyHandlers<A>,
        event: &A::Event,
        strict: bool,
    ) -> Result<&[ApplyFn<A>], AggregateError> {
        let kind = event.kind();
        let handlers = self.by_kind.entry(kind).or_insert_with(|| {
            let resolved = registry.resolve(event);
            tracing::trace!(
                aggregate = A::KIND,
                event = kind,
                handler_count = resolved.len(),
                "resolved apply handlers"
            );
            resolved
        });

        if handlers.is_empty() && strict {
            return Err(AggregateError::MissingApplyHandler {
                aggregate: A::KIND,
                event: kind,
            });
        }

        Ok(handlers.as_slice())
    }

    #[cfg(test)]
    pub(crate) fn cached_kinds(&self) -> usize {
        self.by_kind.len()
    }
}
