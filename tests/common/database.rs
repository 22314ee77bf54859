//! Test database setup
#![allow(dead_code)]

use sea_orm::DbErr;
use treehole::db::Store;

/// A fresh in-memory SQLite database with the schema applied.
///
/// Every call gets its own database, so tests need no cleanup and can run
/// in parallel.
pub async fn setup_test_store() -> Result<Store, DbErr> {
    Store::connect("sqlite::memory:").await
}

/// A SQLite database in a temporary file, served by a real connection pool.
///
/// Keep the returned directory alive for as long as the store is used.
pub async fn setup_file_store() -> Result<(tempfile::TempDir, Store), DbErr> {
    let dir = tempfile::tempdir().map_err(|e| DbErr::Custom(e.to_string()))?;
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("treehole.db").display());
    let store = Store::connect(&url).await?;
    Ok((dir, store))
}
