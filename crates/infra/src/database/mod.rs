//! Database implementations

pub mod batch_repository;
pub mod manager;
pub mod production_store;
mod repository;
pub mod sqlcipher_pool;
pub mod staging_store;

pub use batch_repository::SqlCipherBatchRepository;
pub use manager::DbManager;
pub use production_store::SqlCipherProductionStore;
pub use sqlcipher_pool::{create_sqlcipher_pool, SqlCipherPool, SqlCipherPoolConfig};
pub use staging_store::SqlCipherStagingStore;
