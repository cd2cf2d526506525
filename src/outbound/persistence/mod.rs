//! PostgreSQL persistence adapters (Diesel + diesel-async).

mod diesel_descriptor_repository;
mod diesel_object_repository;
mod diesel_outbox_repository;
mod diesel_relationship_repository;
mod diesel_version_repository;
mod error_mapping;
mod models;
mod pool;
pub mod schema;

pub use diesel_descriptor_repository::DieselDescriptorRepository;
pub use diesel_object_repository::DieselObjectRepository;
pub use diesel_outbox_repository::DieselOutboxRepository;
pub use diesel_relationship_repository::DieselRelationshipRepository;
pub use diesel_version_repository::DieselVersionRepository;
pub use pool::{DbPool, PoolConfig, PoolError};
