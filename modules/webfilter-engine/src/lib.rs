//! Webhook-backed event filters.
//!
//! When the host raises a filterable event, the engine serializes its context,
//! posts it to every subscriber registered for the event (in registry order),
//! merges what the subscribers send back, applies the merged patch onto the
//! live objects and, if asked to, raises a single typed halt signal.
//!
//! The host supplies the seams: a `SubscriberRegistry` (who to call), a
//! `SubscriberTransport` (how to call) and an `EntityStore` (how to persist
//! patched objects).

pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod form;
pub mod halt;
pub mod merge;
pub mod patch;
pub mod payload;
pub mod persist;
pub mod registry;
pub mod testing;

pub use config::{DispatchSettings, FileConfig};
pub use dispatch::{Contributions, Dispatcher};
pub use engine::{Exchange, FilterEngine};
pub use error::{FilterError, FilterResult};
pub use form::QueryForm;
pub use halt::{reconstruct, HaltKind, HaltSignal, ReplacementResponse};
pub use merge::{merge, MergedHaltRequests, MergedPatch};
pub use patch::{apply, ApplyReport, CoerceError, Field, FieldKind, FieldValue, Patchable, Setter};
pub use payload::{EventContext, Inspect, PayloadSerializer, ScopeId, View};
pub use persist::{EntityStore, MemoryEntityStore, NoopEntityStore, SavedEntity};
pub use registry::{StaticRegistry, SubscriberConfig, SubscriberRegistry};
