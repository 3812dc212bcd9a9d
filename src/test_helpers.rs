//! Shared fixtures for unit tests.

use sqlx::SqlitePool;
use tempfile::TempDir;

/// A migrated database in a fresh temporary directory. Keep the directory
/// alive for as long as the pool is used.
pub async fn test_pool() -> (TempDir, SqlitePool) {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", dir.path().join("plog-test.db").display());
    let pool = crate::init_db(&url).await.unwrap();
    (dir, pool)
}
