//! Tenant-scoped persistence for receipts and tasks.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod traits;

pub use error::{StorageError, StorageResult};
pub use memory::InMemoryStorage;
pub use postgres::PostgresStorage;
pub use traits::{AppendOutcome, ReceiptStorage, SearchQuery, TaskStorage};
