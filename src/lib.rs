//! Multi-tenant, schema-flexible object store.
//!
//! Records, versions, relates, and broadcasts changes to arbitrary
//! business entities: JSON documents keyed by `(tenant, type, code)` with
//! a gap-free per-object version history, a transactional outbox feeding
//! the message bus, and a look-aside cache in front of the store.

pub mod core;
pub mod domain;
pub mod outbound;

pub use self::core::{Core, CorePorts};
