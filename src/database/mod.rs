pub mod db;
pub mod memory;

pub use db::SqliteStore;
pub use memory::InMemoryStore;
