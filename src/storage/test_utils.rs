//! Test utilities for storage initialization
//!
//! libSQL's `:memory:` databases are private to a connection, and the
//! storage opens a connection per operation, so tests use a uniquely named
//! temporary file instead.

use crate::error::Result;
use crate::storage::libsql::{ConnectionMode, LibsqlStorage};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static COUNTER: AtomicU64 = AtomicU64::new(0);

/// Path for a fresh test database, unique per process and call
pub fn temp_database_path() -> PathBuf {
    let counter = COUNTER.fetch_add(1, Ordering::SeqCst);
    let path = std::env::temp_dir().join(format!(
        "sprintlens_test_{}_{}.db",
        std::process::id(),
        counter
    ));
    let _ = std::fs::remove_file(&path);
    path
}

/// Create a migrated libSQL storage backed by a temporary file
pub async fn create_test_storage() -> Result<Arc<LibsqlStorage>> {
    let path = temp_database_path();
    let storage = LibsqlStorage::new_with_validation(
        ConnectionMode::Local(path.to_string_lossy().to_string()),
        true,
    )
    .await?;
    Ok(Arc::new(storage))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StorageBackend;
    use crate::types::{Project, User};

    #[test]
    fn test_temp_paths_are_unique() {
        assert_ne!(temp_database_path(), temp_database_path());
    }

    #[tokio::test]
    async fn test_storage_is_migrated() {
        let storage = create_test_storage().await.expect("Failed to create test storage");

        storage
            .insert_user(&User::new("u1", "Ana", "ana@example.com"))
            .await
            .unwrap();
        storage
            .insert_project(&Project::new("p1", "Website", "u1"))
            .await
            .unwrap();

        let project = storage.get_project("p1").await.unwrap();
        assert_eq!(project.name, "Website");
        assert!(storage.get_project("missing").await.unwrap_err().is_not_found());
    }
}
