//! Policy switches shared by the kernel and the [`Context`](crate::context::Context).
//!
//! [`Conventions`] is a plain value: build one, hand it to the context, and
//! every aggregate the context creates or loads follows it.
//!
//! ```
//! use annals_core::config::{Conventions, StreamNaming};
//!
//! let conventions = Conventions::default()
//!     .aggregates_must_implement_apply_handlers(false)
//!     .stream_naming(StreamNaming::IdOnly);
//!
//! assert_eq!(conventions.stream_id("sales-order", &42), "42");
//! ```

use std::{fmt, sync::Arc};

/// Resolver mapping an event kind to the aggregate kind that handles it.
pub type AggregateTypeResolver = Arc<dyn Fn(&str) -> Option<&'static str> + Send + Sync>;

/// How stream ids are derived from an aggregate's kind and id.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StreamNaming {
    /// `"{kind}-{id}"`, e.g. `sales-order-42`.
    #[default]
    KindAndId,
    /// The aggregate id alone. Only safe when ids are unique across kinds.
    IdOnly,
}

#[derive(Clone)]
pub struct Conventions {
    must_implement_apply_handlers: bool,
    stream_naming: StreamNaming,
    aggregate_type_resolver: Option<AggregateTypeResolver>,
}

impl Conventions {
    /// Whether an event nothing in the aggregate handles is an error
    /// (`true`, the default) or silently ignored.
    #[must_use]
    pub fn aggregates_must_implement_apply_handlers(mut self, required: bool) -> Self {
        self.must_implement_apply_handlers = required;
        self
    }

    #[must_use]
    pub fn stream_naming(mut self, naming: StreamNaming) -> Self {
        self.stream_naming = naming;
        self
    }

    /// Install the event-kind to aggregate-kind lookup used by command and
    /// event routing outside the kernel.
    #[must_use]
    pub fn aggregate_type_resolver<F>(mut self, resolver: F) -> Self
    where
        F: Fn(&str) -> Option<&'static str> + Send + Sync + 'static,
    {
        self.aggregate_type_resolver = Some(Arc::new(resolver));
        self
    }

    #[must_use]
    pub const fn must_implement_apply_handlers(&self) -> bool {
        self.must_implement_apply_handlers
    }

    #[must_use]
    pub const fn naming(&self) -> StreamNaming {
        self.stream_naming
    }

    /// Derive the stream id for an aggregate instance.
    #[must_use]
    pub fn stream_id(&self, aggregate_kind: &str, id: &impl fmt::Display) -> String {
        match self.stream_naming {
            StreamNaming::KindAndId => format!("{aggregate_kind}-{id}"),
            StreamNaming::IdOnly => id.to_string(),
        }
    }

    /// Aggregate kind responsible for `event_kind`, if a resolver is
    /// installed and knows it.
    #[must_use]
    pub fn aggregate_type_for(&self, event_kind: &str) -> Option<&'static str> {
        self.aggregate_type_resolver
            .as_ref()
            .and_then(|resolve| resolve(event_kind))
    }
}

impl Default for Conventions {
    fn default() -> Self {
        Self {
            must_implement_apply_handlers: true,
            stream_naming: StreamNaming::default(),
            aggregate_type_resolver: None,
        }
    }
}

impl fmt::Debug for Conventions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Conventions")
            .field(
                "must_implement_apply_handlers",
                &self.must_implement_apply_handlers,
            )
            .field("stream_naming", &self.stream_naming)
            .field(
                "aggregate_type_resolver",
                &self.aggregate_type_resolver.as_ref().map(|_| ".."),
            )
            .finish()
    }
}
