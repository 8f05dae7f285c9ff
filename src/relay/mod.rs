//! In-process event delivery.
//!
//! [`StreamRegistry`] is the rendezvous point between producers and live
//! subscriber connections in the same process; [`EventPublisher`] is the
//! write facade execution logic uses. Cross-process delivery does not go
//! through here at all - subscribers poll the store for that.

pub mod publisher;
pub mod registry;

pub use publisher::{EventPublisher, PublishError};
pub use registry::{PublishOutcome, RegistryListener, StreamRegistry};
