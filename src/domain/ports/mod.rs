//! Domain ports and supporting types for the hexagonal boundary.

mod macros;
pub(crate) use macros::define_port_error;

mod descriptor_repository;
mod dispatcher_metrics;
mod event_bus;
mod object_cache;
mod object_repository;
mod outbox_repository;
mod relationship_repository;
mod version_repository;

#[cfg(test)]
pub use descriptor_repository::MockDescriptorRepository;
pub use descriptor_repository::{
    DescriptorRepository, DescriptorRepositoryError, FixtureDescriptorRepository,
};
#[cfg(test)]
pub use dispatcher_metrics::MockDispatcherMetrics;
pub use dispatcher_metrics::{DispatcherMetrics, DispatcherMetricsError, NoOpDispatcherMetrics};
#[cfg(test)]
pub use event_bus::MockEventBus;
pub use event_bus::{EventBus, EventBusError, PublishReceipt};
#[cfg(test)]
pub use object_cache::MockObjectCache;
pub use object_cache::{FixtureObjectCache, ObjectCache, ObjectCacheError};
#[cfg(test)]
pub use object_repository::MockObjectRepository;
pub use object_repository::{
    AttributeValue, MutationCommit, ObjectRepository, ObjectRepositoryError, ObjectWrite,
};
#[cfg(test)]
pub use outbox_repository::MockOutboxRepository;
pub use outbox_repository::{OutboxRepository, OutboxRepositoryError};
#[cfg(test)]
pub use relationship_repository::MockRelationshipRepository;
pub use relationship_repository::{RelationshipRepository, RelationshipRepositoryError};
#[cfg(test)]
pub use version_repository::MockVersionRepository;
pub use version_repository::{VersionRepository, VersionRepositoryError};
