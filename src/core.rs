//! Explicit composition root for the object store.
//!
//! Adapters are constructed once at startup and wired into the services
//! here; there are no process-wide singletons apart from the logger. The
//! handler layer (out of scope) holds a `Core` and calls its services.

use std::sync::Arc;

use mockable::Clock;

use crate::domain::dispatcher::{DispatcherConfig, OutboxDispatcher};
use crate::domain::mutator::{Mutator, MutatorConfig};
use crate::domain::ports::{
    DescriptorRepository, DispatcherMetrics, EventBus, ObjectCache, ObjectRepository,
    OutboxRepository, RelationshipRepository, VersionRepository,
};
use crate::domain::reader::Reader;

/// Adapter bundle consumed by [`Core::new`].
pub struct CorePorts {
    pub objects: Arc<dyn ObjectRepository>,
    pub versions: Arc<dyn VersionRepository>,
    pub relationships: Arc<dyn RelationshipRepository>,
    pub outbox: Arc<dyn OutboxRepository>,
    pub descriptors: Arc<dyn DescriptorRepository>,
    pub cache: Arc<dyn ObjectCache>,
    pub bus: Arc<dyn EventBus>,
    pub metrics: Arc<dyn DispatcherMetrics>,
    pub clock: Arc<dyn Clock>,
}

/// The assembled object store: mutation pipeline, read path, and outbox
/// dispatcher sharing one set of adapters.
pub struct Core {
    pub mutator: Mutator,
    pub reader: Reader,
    pub dispatcher: Arc<OutboxDispatcher>,
}

impl Core {
    /// Wire services from the adapter bundle.
    pub fn new(
        ports: CorePorts,
        mutator_config: MutatorConfig,
        dispatcher_config: DispatcherConfig,
    ) -> Self {
        let mutator = Mutator::new(
            Arc::clone(&ports.objects),
            Arc::clone(&ports.relationships),
            Arc::clone(&ports.descriptors),
            Arc::clone(&ports.cache),
            Arc::clone(&ports.clock),
            mutator_config,
        );
        let reader = Reader::new(
            Arc::clone(&ports.objects),
            Arc::clone(&ports.versions),
            Arc::clone(&ports.relationships),
            Arc::clone(&ports.cache),
        );
        let dispatcher = Arc::new(OutboxDispatcher::new(
            Arc::clone(&ports.outbox),
            Arc::clone(&ports.bus),
            Arc::clone(&ports.metrics),
            Arc::clone(&ports.clock),
            dispatcher_config,
        ));

        Self {
            mutator,
            reader,
            dispatcher,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::context::TenantId;
    use crate::domain::dispatcher::DispatcherConfig;
    use crate::domain::mutator::MutatorConfig;
    use crate::domain::ports::{
        FixtureDescriptorRepository, FixtureObjectCache, MockEventBus, MockObjectRepository,
        MockOutboxRepository, MockRelationshipRepository, MockVersionRepository,
        NoOpDispatcherMetrics,
    };
    use mockable::DefaultClock;

    #[tokio::test]
    async fn wired_core_serves_reads_without_touching_unused_ports() {
        let core = Core::new(
            CorePorts {
                objects: Arc::new(MockObjectRepository::new()),
                versions: Arc::new(MockVersionRepository::new()),
                relationships: Arc::new(MockRelationshipRepository::new()),
                outbox: Arc::new(MockOutboxRepository::new()),
                descriptors: Arc::new(FixtureDescriptorRepository),
                cache: Arc::new(FixtureObjectCache),
                bus: Arc::new(MockEventBus::new()),
                metrics: Arc::new(NoOpDispatcherMetrics),
                clock: Arc::new(DefaultClock),
            },
            MutatorConfig::default(),
            DispatcherConfig::default(),
        );

        // bulk_get with no ids short-circuits before any port call, which
        // is exactly what the un-expecting mocks require.
        let found = core
            .reader
            .bulk_get(TenantId::random(), &[])
            .await
            .expect("empty bulk read");
        assert!(found.is_empty());
    }
}
