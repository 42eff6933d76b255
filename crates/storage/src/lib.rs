#![forbid(unsafe_code)]

pub mod persistent;
pub mod progress;
pub mod repository;
pub mod sqlite;

pub use persistent::PersistentStore;
pub use repository::{InMemoryKeyValueRepository, KeyValueRepository, Storage, StorageError};
