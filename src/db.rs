//! SQLite connection for the chunk store.
//!
//! One database file (`db.path`) holds the `chunks` table written by the
//! loader and scanned by every chat turn. WAL mode lets `/chat` queries run
//! while a `/force-load` or `sportello load` is replacing a document.

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;

use crate::config::Config;

/// Pool size shared by the HTTP handlers and the start-up autoload.
const MAX_CONNECTIONS: u32 = 5;

/// Open the chunk database at `db.path`.
///
/// A fresh deployment has neither the file nor its `data/` directory, so both
/// are created here; the schema itself comes from [`crate::migrate`].
pub async fn connect(config: &Config) -> Result<SqlitePool> {
    let db_path = &config.db.path;

    if let Some(dir) = db_path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create database directory {}", dir.display()))?;
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .connect_with(options)
        .await
        .with_context(|| format!("Failed to open chunk database {}", db_path.display()))?;

    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;

    #[tokio::test]
    async fn test_connect_creates_missing_directory() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("data").join("nested").join("sportello.sqlite");
        let config = parse_config(&format!("[db]\npath = \"{}\"\n", path.display())).unwrap();

        let pool = connect(&config).await.unwrap();
        sqlx::query("SELECT 1").execute(&pool).await.unwrap();
        assert!(path.exists());
    }
}
