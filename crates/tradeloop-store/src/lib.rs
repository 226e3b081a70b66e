pub mod error;
pub mod memory;
pub mod persistence;
pub mod quotes;
pub mod schema;
pub mod sqlite;
pub mod tiered;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use persistence::Persistence;
pub use quotes::{QuoteReader, QuoteTable};
pub use sqlite::SqliteStore;
pub use tiered::TieredStore;
