//! Infrastructure adapters for permission engine ports.

#![forbid(unsafe_code)]

mod in_memory_permission_store;
mod postgres_permission_store;
mod redis_invalidation_bus;

pub use in_memory_permission_store::InMemoryPermissionStore;
pub use postgres_permission_store::PostgresPermissionStore;
pub use redis_invalidation_bus::{RedisInvalidationBus, RedisInvalidationBusConfig};
