//! SQLite-backed and in-memory implementations of the storage traits
//! defined in `shuttle-core`: the indexed tool catalog (C7), the shared
//! memory store (C3), the SQL result store (C4), and the tool-metadata
//! loader (C11).

pub mod catalog;
pub mod memory;
pub mod metadata;
pub mod sql_result;

pub use catalog::SqliteCatalog;
pub use memory::LruSharedMemoryStore;
pub use metadata::YamlMetadataSource;
pub use sql_result::SqliteResultStore;
