//! Diesel table definitions for the PostgreSQL schema.
//!
//! These definitions must match the migrations under `migrations/` exactly;
//! they drive Diesel's compile-time query validation and type-safe SQL
//! generation.

diesel::table! {
    /// Live object rows, one per stored business entity.
    meta_kernel_objects (id) {
        id -> Uuid,
        tenant_id -> Uuid,
        type_code -> Varchar,
        code -> Varchar,
        name -> Varchar,
        data -> Jsonb,
        status -> Varchar,
        version -> Int4,
        deleted -> Bool,
        deleted_at -> Nullable<Timestamptz>,
        deleted_by -> Nullable<Varchar>,
        created_at -> Timestamptz,
        created_by -> Varchar,
        modified_at -> Timestamptz,
        modified_by -> Varchar,
        metadata -> Nullable<Jsonb>,
    }
}

diesel::table! {
    /// Append-only version snapshots.
    meta_object_versions (id) {
        id -> Uuid,
        object_id -> Uuid,
        tenant_id -> Uuid,
        type_code -> Varchar,
        code -> Varchar,
        name -> Varchar,
        status -> Varchar,
        version_number -> Int4,
        change_type -> Varchar,
        previous_data -> Nullable<Jsonb>,
        current_data -> Nullable<Jsonb>,
        diff -> Nullable<Jsonb>,
        changed_by -> Varchar,
        ip -> Nullable<Varchar>,
        user_agent -> Nullable<Varchar>,
        change_reason -> Nullable<Varchar>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    /// Directed typed edges between objects.
    meta_object_relationships (id) {
        id -> Uuid,
        source_id -> Uuid,
        target_id -> Uuid,
        rel_type -> Varchar,
        cardinality -> Varchar,
        bidirectional -> Bool,
        inverse_type -> Nullable<Varchar>,
        strength -> Nullable<Float8>,
        display_order -> Nullable<Int4>,
        metadata -> Nullable<Jsonb>,
        active -> Bool,
        created_at -> Timestamptz,
        created_by -> Varchar,
        modified_at -> Timestamptz,
        modified_by -> Varchar,
    }
}

diesel::table! {
    /// Transactional outbox rows drained by the dispatcher.
    meta_outbox_entries (id) {
        id -> Uuid,
        aggregate_id -> Uuid,
        aggregate_type -> Varchar,
        event_type -> Varchar,
        payload -> Jsonb,
        status -> Varchar,
        retry_count -> Int4,
        max_retries -> Int4,
        error -> Nullable<Varchar>,
        published_at -> Nullable<Timestamptz>,
        topic -> Nullable<Varchar>,
        partition -> Nullable<Int4>,
        #[sql_name = "offset"]
        bus_offset -> Nullable<Int8>,
        next_retry_at -> Nullable<Timestamptz>,
        idempotency_key -> Varchar,
        claimed_by -> Nullable<Varchar>,
        claimed_until -> Nullable<Timestamptz>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    /// Cached type descriptors from the metadata authority.
    meta_type_descriptors (id) {
        id -> Uuid,
        type_code -> Varchar,
        type_name -> Varchar,
        descriptor -> Jsonb,
        synced_at -> Timestamptz,
        stale -> Bool,
        ttl_minutes -> Int4,
        usage_count -> Int8,
        last_accessed_at -> Nullable<Timestamptz>,
        created_at -> Timestamptz,
        modified_at -> Timestamptz,
    }
}

diesel::table! {
    /// Durable per-object event journal.
    meta_object_events (id) {
        id -> Uuid,
        object_id -> Uuid,
        tenant_id -> Uuid,
        event_type -> Varchar,
        payload -> Jsonb,
        status -> Varchar,
        topic -> Nullable<Varchar>,
        partition -> Nullable<Int4>,
        #[sql_name = "offset"]
        bus_offset -> Nullable<Int8>,
        error -> Nullable<Varchar>,
        published_at -> Nullable<Timestamptz>,
        created_at -> Timestamptz,
    }
}

diesel::allow_tables_to_appear_in_same_query!(
    meta_kernel_objects,
    meta_object_versions,
    meta_object_relationships,
    meta_outbox_entries,
    meta_object_events,
);
