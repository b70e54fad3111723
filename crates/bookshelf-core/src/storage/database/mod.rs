mod connection;
mod migrations;
mod schema;

pub use connection::{ConnectionGuard, StorageHandle};
pub use migrations::{get_applied_versions, run_migrations, Migration};
pub use schema::SCHEMA_VERSION;

use std::path::Path;
use std::sync::Arc;

use crate::error::Result;

/// Open (creating and migrating if needed) the catalog database at `path`.
pub fn open_database(path: &Path) -> Result<Arc<StorageHandle>> {
    Ok(Arc::new(StorageHandle::open(path)?))
}

/// Open a throwaway catalog that lives in memory (for testing).
pub fn open_in_memory() -> Result<Arc<StorageHandle>> {
    Ok(Arc::new(StorageHandle::open_in_memory()?))
}
