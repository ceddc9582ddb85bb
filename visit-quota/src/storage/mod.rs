//! Host storage backends
//!
//! - [`memory`]: in-process maps, for tests and embedding
//! - [`sqlite`]: SQLite tables, used by the standalone service

pub mod memory;
pub mod sqlite;

pub use memory::MemoryHost;
pub use sqlite::SqliteHost;
