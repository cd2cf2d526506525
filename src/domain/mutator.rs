//! The mutation pipeline: validated, versioned, atomic object writes.
//!
//! Every operation follows the same shape: read and validate, assemble the
//! post-image together with its version snapshot, journal row, and outbox
//! entry, commit all of them in one repository transaction, then maintain
//! the advisory cache. The object row, the version row, and the outbox row
//! are committed together or not at all.

use std::sync::Arc;

use mockable::Clock;
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use super::context::{ActorContext, TenantId};
use super::error::Error;
use super::event::{
    self, EventEnvelope, EventJournalRecord, EventType, OBJECT_AGGREGATE, RELATIONSHIP_AGGREGATE,
};
use super::object::{ObjectStatus, StoredObject};
use super::outbox::OutboxEntry;
use super::ports::{
    DescriptorRepository, MutationCommit, ObjectCache, ObjectRepository, ObjectRepositoryError,
    ObjectWrite, RelationshipRepository, RelationshipRepositoryError,
};
use super::relationship::{Cardinality, ObjectRelationship};
use super::version::ChangeType;
use super::versioner::Versioner;

/// Bounds on the mutator's internal retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MutatorConfig {
    /// Re-read attempts when a concurrent writer wins the version race.
    pub version_retry_attempts: u32,
    /// Attempts per operation when the store reports a transport failure.
    /// Constraint violations are never retried.
    pub transport_retry_attempts: u32,
}

impl Default for MutatorConfig {
    fn default() -> Self {
        Self {
            version_retry_attempts: 3,
            transport_retry_attempts: 3,
        }
    }
}

/// Input for [`Mutator::create`].
#[derive(Debug, Clone, PartialEq)]
pub struct CreateObjectRequest {
    pub type_code: String,
    pub code: String,
    pub name: String,
    pub data: Value,
}

/// Input for [`Mutator::update`]. Omitted fields keep their current value.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateObjectRequest {
    pub id: Uuid,
    pub name: Option<String>,
    pub data: Option<Value>,
    pub reason: Option<String>,
}

/// Input for [`Mutator::link`].
#[derive(Debug, Clone, PartialEq)]
pub struct LinkRequest {
    pub source_id: Uuid,
    pub target_id: Uuid,
    pub rel_type: String,
    pub cardinality: Cardinality,
    pub bidirectional: bool,
    pub inverse_type: Option<String>,
    pub strength: Option<f64>,
    pub display_order: Option<i32>,
    pub metadata: Option<Value>,
}

/// The mutation pipeline service.
pub struct Mutator {
    objects: Arc<dyn ObjectRepository>,
    relationships: Arc<dyn RelationshipRepository>,
    descriptors: Arc<dyn DescriptorRepository>,
    cache: Arc<dyn ObjectCache>,
    versioner: Versioner,
    clock: Arc<dyn Clock>,
    config: MutatorConfig,
}

impl Mutator {
    /// Wire the pipeline from its ports.
    pub fn new(
        objects: Arc<dyn ObjectRepository>,
        relationships: Arc<dyn RelationshipRepository>,
        descriptors: Arc<dyn DescriptorRepository>,
        cache: Arc<dyn ObjectCache>,
        clock: Arc<dyn Clock>,
        config: MutatorConfig,
    ) -> Self {
        Self {
            objects,
            relationships,
            descriptors,
            cache,
            versioner: Versioner,
            clock,
            config,
        }
    }

    /// Create a new object at version 1.
    ///
    /// Fails with `Conflict` when a non-deleted row already holds the code;
    /// a soft-deleted row does not occupy the namespace.
    pub async fn create(
        &self,
        tenant: TenantId,
        actor: &ActorContext,
        request: CreateObjectRequest,
    ) -> Result<StoredObject, Error> {
        validate_identifier("type_code", &request.type_code)?;
        validate_identifier("code", &request.code)?;
        validate_identifier("name", &request.name)?;
        validate_data_document(&request.data)?;
        self.check_required_attributes(&request.type_code, &request.data)
            .await?;

        let mut transport_attempts = 0;
        let object = loop {
            if self
                .objects
                .code_in_use(tenant, &request.type_code, &request.code)
                .await
                .map_err(map_object_error)?
            {
                return Err(Error::conflict(format!(
                    "object with code '{}' already exists",
                    request.code
                ))
                .with_details(json!({"typeCode": request.type_code, "code": request.code})));
            }

            let now = self.clock.utc();
            let object = StoredObject::create(
                Uuid::new_v4(),
                tenant,
                request.type_code.clone(),
                request.code.clone(),
                request.name.clone(),
                request.data.clone(),
                actor,
                now,
            );
            let envelope = event::object_envelope(&object, EventType::ObjectCreated, now);
            let version =
                self.versioner
                    .snapshot(&object, ChangeType::Create, None, None, actor, now);
            let commit = MutationCommit {
                journal: EventJournalRecord::pending(&envelope, object.id, tenant, now),
                outbox: object_outbox(&object, &envelope, now),
                version,
                write: ObjectWrite::Insert(object.clone()),
                deactivate_edges_of: None,
            };

            match self.objects.commit_mutation(commit).await {
                Ok(()) => break object,
                Err(ObjectRepositoryError::Connection { message })
                    if transport_attempts + 1 < self.config.transport_retry_attempts =>
                {
                    transport_attempts += 1;
                    warn!(%message, attempt = transport_attempts, "retrying create after transport failure");
                }
                Err(err) => return Err(map_object_error(err)),
            }
        };

        info!(object_id = %object.id, type_code = %object.type_code, "object created");
        self.cache_put(&object).await;
        Ok(object)
    }

    /// Update an object's name and/or data, appending an UPDATE version.
    pub async fn update(
        &self,
        tenant: TenantId,
        actor: &ActorContext,
        request: UpdateObjectRequest,
    ) -> Result<StoredObject, Error> {
        if let Some(name) = &request.name {
            validate_identifier("name", name)?;
        }
        if let Some(data) = &request.data {
            validate_data_document(data)?;
        }

        let object = self
            .mutate_existing(tenant, request.id, false, actor, |object, now| {
                let previous = object.data.clone();
                if let Some(name) = &request.name {
                    object.name = name.clone();
                }
                if let Some(data) = &request.data {
                    object.data = data.clone();
                }
                object.touch(actor, now);
                Ok(StagedChange {
                    change_type: ChangeType::Update,
                    event_type: EventType::ObjectUpdated,
                    previous_data: Some(previous),
                    change_reason: request.reason.clone(),
                    deactivate_edges: false,
                })
            })
            .await?;

        info!(object_id = %object.id, version = object.version, "object updated");
        self.cache_refresh(&object).await;
        Ok(object)
    }

    /// Soft-delete an object: the row is retained and versioned, its edges
    /// are deactivated, and its code returns to the namespace.
    pub async fn soft_delete(
        &self,
        tenant: TenantId,
        actor: &ActorContext,
        id: Uuid,
        reason: Option<String>,
    ) -> Result<(), Error> {
        let object = self
            .mutate_existing(tenant, id, false, actor, |object, now| {
                let previous = object.data.clone();
                object.mark_deleted(actor, now);
                Ok(StagedChange {
                    change_type: ChangeType::Delete,
                    event_type: EventType::ObjectDeleted,
                    previous_data: Some(previous),
                    change_reason: reason.clone(),
                    deactivate_edges: true,
                })
            })
            .await?;

        info!(object_id = %object.id, "object soft-deleted");
        self.cache_invalidate(&object).await;
        Ok(())
    }

    /// Restore a soft-deleted object to ACTIVE.
    ///
    /// Fails with `InvalidState` on a live row, and with `Conflict` when the
    /// code was re-used by a newer object while this one was deleted.
    pub async fn restore(
        &self,
        tenant: TenantId,
        actor: &ActorContext,
        id: Uuid,
    ) -> Result<StoredObject, Error> {
        let object = self
            .mutate_existing(tenant, id, true, actor, |object, now| {
                if !object.deleted {
                    return Err(Error::invalid_state("object is not deleted"));
                }
                let snapshot = object.data.clone();
                object.mark_restored(actor, now);
                Ok(StagedChange {
                    change_type: ChangeType::Restore,
                    event_type: EventType::ObjectRestored,
                    previous_data: Some(snapshot),
                    change_reason: None,
                    deactivate_edges: false,
                })
            })
            .await?;

        info!(object_id = %object.id, "object restored");
        self.cache_refresh(&object).await;
        Ok(object)
    }

    /// Move an object along the status machine
    /// (`ACTIVE ⇄ INACTIVE`, `ACTIVE → ARCHIVED`).
    pub async fn change_status(
        &self,
        tenant: TenantId,
        actor: &ActorContext,
        id: Uuid,
        new_status: ObjectStatus,
        reason: Option<String>,
    ) -> Result<StoredObject, Error> {
        if new_status == ObjectStatus::Deleted {
            return Err(Error::invalid_argument(
                "DELETED is not reachable via change_status; use soft_delete",
            ));
        }

        let object = self
            .mutate_existing(tenant, id, false, actor, |object, now| {
                let old_status = object.status;
                if !old_status.can_transition_to(new_status) {
                    return Err(Error::invalid_state(format!(
                        "status transition {old_status} -> {new_status} is not allowed"
                    )));
                }
                object.status = new_status;
                object.touch(actor, now);
                let transition = match &reason {
                    Some(reason) => format!("{old_status} -> {new_status}: {reason}"),
                    None => format!("{old_status} -> {new_status}"),
                };
                Ok(StagedChange {
                    change_type: ChangeType::StatusChange,
                    event_type: EventType::ObjectUpdated,
                    previous_data: None,
                    change_reason: Some(transition),
                    deactivate_edges: false,
                })
            })
            .await?;

        info!(object_id = %object.id, status = %object.status, "object status changed");
        self.cache_refresh(&object).await;
        Ok(object)
    }

    /// Create a typed edge between two live objects of this tenant.
    pub async fn link(
        &self,
        tenant: TenantId,
        actor: &ActorContext,
        request: LinkRequest,
    ) -> Result<ObjectRelationship, Error> {
        validate_identifier("rel_type", &request.rel_type)?;
        if let Some(strength) = request.strength {
            if !(0.0..=1.0).contains(&strength) {
                return Err(Error::invalid_argument(
                    "relationship strength must lie in 0.0..=1.0",
                ));
            }
        }

        self.require_live_object(tenant, request.source_id).await?;
        self.require_live_object(tenant, request.target_id).await?;

        let now = self.clock.utc();
        let relationship = ObjectRelationship {
            id: Uuid::new_v4(),
            source_id: request.source_id,
            target_id: request.target_id,
            rel_type: request.rel_type,
            cardinality: request.cardinality,
            bidirectional: request.bidirectional,
            inverse_type: request.inverse_type,
            strength: request.strength,
            display_order: request.display_order,
            metadata: request.metadata,
            active: true,
            created_at: now,
            created_by: actor.user.clone(),
            modified_at: now,
            modified_by: actor.user.clone(),
        };
        let envelope =
            event::relationship_envelope(tenant, &relationship, EventType::RelationshipCreated, now);
        let journal =
            EventJournalRecord::pending(&envelope, relationship.source_id, tenant, now);
        let outbox = relationship_outbox(&relationship, &envelope, now);

        self.relationships
            .commit_link(relationship.clone(), journal, outbox)
            .await
            .map_err(map_relationship_error)?;

        info!(relationship_id = %relationship.id, rel_type = %relationship.rel_type, "relationship created");
        Ok(relationship)
    }

    /// Remove the edge identified by `(source, target, rel_type)`.
    pub async fn unlink(
        &self,
        tenant: TenantId,
        _actor: &ActorContext,
        source_id: Uuid,
        target_id: Uuid,
        rel_type: &str,
    ) -> Result<(), Error> {
        self.require_live_object(tenant, source_id).await?;

        let relationship = self
            .relationships
            .find_edge(source_id, target_id, rel_type)
            .await
            .map_err(map_relationship_error)?
            .ok_or_else(|| Error::not_found("relationship not found"))?;

        let now = self.clock.utc();
        let envelope =
            event::relationship_envelope(tenant, &relationship, EventType::RelationshipDeleted, now);
        let journal = EventJournalRecord::pending(&envelope, source_id, tenant, now);
        let outbox = relationship_outbox(&relationship, &envelope, now);

        let removed = self
            .relationships
            .commit_unlink(relationship.id, journal, outbox)
            .await
            .map_err(map_relationship_error)?;
        if !removed {
            return Err(Error::not_found("relationship not found"));
        }

        info!(relationship_id = %relationship.id, "relationship deleted");
        Ok(())
    }

    /// Shared read-modify-commit loop for mutations of existing rows.
    ///
    /// Retries the whole read-and-commit cycle when a concurrent writer wins
    /// the version race, and the commit alone on transient transport
    /// failures; both bounded by [`MutatorConfig`].
    async fn mutate_existing<F>(
        &self,
        tenant: TenantId,
        id: Uuid,
        include_deleted: bool,
        actor: &ActorContext,
        mut apply: F,
    ) -> Result<StoredObject, Error>
    where
        F: FnMut(&mut StoredObject, chrono::DateTime<chrono::Utc>) -> Result<StagedChange, Error>,
    {
        let mut version_attempts = 0;
        let mut transport_attempts = 0;

        loop {
            let mut object = self
                .objects
                .find_by_id(tenant, id, include_deleted)
                .await
                .map_err(map_object_error)?
                .ok_or_else(|| Error::not_found(format!("object not found: {id}")))?;

            let expected_version = object.version;
            let now = self.clock.utc();
            let staged = apply(&mut object, now)?;

            let envelope = event::object_envelope(&object, staged.event_type, now);
            let version = self.versioner.snapshot(
                &object,
                staged.change_type,
                staged.previous_data.clone(),
                staged.change_reason.clone(),
                actor,
                now,
            );
            let commit = MutationCommit {
                journal: EventJournalRecord::pending(&envelope, object.id, tenant, now),
                outbox: object_outbox(&object, &envelope, now),
                version,
                write: ObjectWrite::Update {
                    object: object.clone(),
                    expected_version,
                },
                deactivate_edges_of: staged.deactivate_edges.then_some(object.id),
            };

            match self.objects.commit_mutation(commit).await {
                Ok(()) => return Ok(object),
                Err(ObjectRepositoryError::VersionConflict { expected })
                    if version_attempts + 1 < self.config.version_retry_attempts =>
                {
                    version_attempts += 1;
                    warn!(
                        object_id = %id,
                        expected,
                        attempt = version_attempts,
                        "concurrent update detected, re-reading"
                    );
                }
                Err(ObjectRepositoryError::Connection { message })
                    if transport_attempts + 1 < self.config.transport_retry_attempts =>
                {
                    transport_attempts += 1;
                    warn!(%message, attempt = transport_attempts, "retrying mutation after transport failure");
                }
                Err(err) => return Err(map_object_error(err)),
            }
        }
    }

    /// Presence check against a valid cached descriptor, when one exists.
    /// Lookup failures are logged and skipped: the store is schema-flexible
    /// and descriptor enrichment is advisory.
    async fn check_required_attributes(&self, type_code: &str, data: &Value) -> Result<(), Error> {
        let descriptor = match self.descriptors.find_by_type(type_code).await {
            Ok(found) => found,
            Err(err) => {
                warn!(%type_code, error = %err, "descriptor lookup failed, skipping validation");
                return Ok(());
            }
        };

        let now = self.clock.utc();
        let Some(descriptor) = descriptor.filter(|d| d.is_valid_for_use(now)) else {
            return Ok(());
        };

        let missing: Vec<&str> = descriptor
            .required_attributes()
            .into_iter()
            .filter(|attribute| data.get(attribute).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(
                Error::invalid_argument("required attributes missing from data")
                    .with_details(json!({"missing": missing})),
            );
        }

        if let Err(err) = self.descriptors.record_usage(type_code, now).await {
            warn!(%type_code, error = %err, "failed to record descriptor usage");
        }
        Ok(())
    }

    async fn require_live_object(&self, tenant: TenantId, id: Uuid) -> Result<(), Error> {
        self.objects
            .find_by_id(tenant, id, false)
            .await
            .map_err(map_object_error)?
            .map(|_| ())
            .ok_or_else(|| Error::not_found(format!("object not found: {id}")))
    }

    async fn cache_put(&self, object: &StoredObject) {
        if let Err(err) = self.cache.put(object).await {
            warn!(object_id = %object.id, error = %err, "cache put failed");
        }
    }

    async fn cache_refresh(&self, object: &StoredObject) {
        if let Err(err) = self.cache.invalidate(object.id).await {
            warn!(object_id = %object.id, error = %err, "cache invalidate failed");
        }
        self.cache_put(object).await;
    }

    async fn cache_invalidate(&self, object: &StoredObject) {
        if let Err(err) = self.cache.invalidate(object.id).await {
            warn!(object_id = %object.id, error = %err, "cache invalidate failed");
        }
        if let Err(err) = self
            .cache
            .invalidate_by_code(object.tenant_id, &object.type_code, &object.code)
            .await
        {
            warn!(object_id = %object.id, error = %err, "cache code invalidate failed");
        }
    }
}

/// What one mutation closure decided to change.
struct StagedChange {
    change_type: ChangeType,
    event_type: EventType,
    previous_data: Option<Value>,
    change_reason: Option<String>,
    deactivate_edges: bool,
}

fn object_outbox(
    object: &StoredObject,
    envelope: &EventEnvelope,
    now: chrono::DateTime<chrono::Utc>,
) -> OutboxEntry {
    OutboxEntry::pending(
        object.id,
        OBJECT_AGGREGATE,
        envelope.event_type.as_str(),
        envelope.payload.clone(),
        now,
    )
}

fn relationship_outbox(
    relationship: &ObjectRelationship,
    envelope: &EventEnvelope,
    now: chrono::DateTime<chrono::Utc>,
) -> OutboxEntry {
    OutboxEntry::pending(
        relationship.id,
        RELATIONSHIP_AGGREGATE,
        envelope.event_type.as_str(),
        envelope.payload.clone(),
        now,
    )
}

fn validate_identifier(field: &str, value: &str) -> Result<(), Error> {
    if value.trim().is_empty() {
        return Err(Error::invalid_argument(format!("{field} must not be blank")));
    }
    Ok(())
}

fn validate_data_document(data: &Value) -> Result<(), Error> {
    if !data.is_object() {
        return Err(Error::invalid_argument("data must be a JSON object"));
    }
    Ok(())
}

fn map_object_error(error: ObjectRepositoryError) -> Error {
    match error {
        ObjectRepositoryError::Connection { message } => {
            Error::unavailable(format!("object store unavailable: {message}"))
        }
        ObjectRepositoryError::Query { message } => {
            Error::integrity(format!("object store error: {message}"))
        }
        ObjectRepositoryError::DuplicateCode { code } => {
            Error::conflict(format!("object code already in use: {code}"))
        }
        ObjectRepositoryError::VersionConflict { expected } => {
            Error::conflict("object changed concurrently")
                .with_details(json!({"expectedVersion": expected}))
        }
        ObjectRepositoryError::Integrity { message } => Error::integrity(message),
    }
}

fn map_relationship_error(error: RelationshipRepositoryError) -> Error {
    match error {
        RelationshipRepositoryError::Connection { message } => {
            Error::unavailable(format!("relationship store unavailable: {message}"))
        }
        RelationshipRepositoryError::Query { message } => {
            Error::integrity(format!("relationship store error: {message}"))
        }
        RelationshipRepositoryError::DuplicateEdge => {
            Error::conflict("relationship already exists")
        }
        RelationshipRepositoryError::MissingEndpoint { message } => {
            Error::not_found(format!("relationship endpoint missing: {message}"))
        }
    }
}
