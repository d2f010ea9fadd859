//! SQLite connection and schema for the downloaders.

use std::path::Path;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

use crate::error::Result;

/// Open (creating if needed) a database and make sure the schema exists.
///
/// Downloaders run one transaction at a time, so one connection suffices.
pub async fn connect(path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .foreign_keys(true)
        .busy_timeout(std::time::Duration::from_secs(30));

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;

    create_schema(&pool).await?;
    log::debug!("Opened database {}", path.display());
    Ok(pool)
}

async fn create_schema(pool: &SqlitePool) -> Result<()> {
    // Gallery. Folder descriptions are blank rather than NULL.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tbl_deviation (
            id INTEGER PRIMARY KEY NOT NULL,
            title TEXT NOT NULL,
            url TEXT NOT NULL,
            username TEXT NOT NULL,
            timestamp INTEGER NOT NULL,
            description TEXT NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tbl_gallery_folder (
            id TEXT PRIMARY KEY NOT NULL,
            title TEXT NOT NULL,
            description TEXT NOT NULL,
            url TEXT NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tbl_deviation_folders (
            id INTEGER PRIMARY KEY NOT NULL,
            fk_deviation_id INTEGER NOT NULL REFERENCES tbl_deviation(id),
            fk_folder_id TEXT NOT NULL REFERENCES tbl_gallery_folder(id)
        );
        "#,
    )
    .execute(pool)
    .await?;

    // Notes. One note can sit in several folders (Inbox and Starred).
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tbl_note (
            id INTEGER PRIMARY KEY NOT NULL,
            title TEXT NOT NULL,
            sender TEXT NOT NULL,
            timestamp INTEGER NOT NULL,
            text TEXT NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tbl_note_folder (
            id TEXT PRIMARY KEY NOT NULL,
            title TEXT NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tbl_note_folders (
            id INTEGER PRIMARY KEY NOT NULL,
            fk_note_id INTEGER NOT NULL REFERENCES tbl_note(id),
            fk_folder_id TEXT NOT NULL REFERENCES tbl_note_folder(id)
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS idx_deviation_folders_pair
            ON tbl_deviation_folders(fk_deviation_id, fk_folder_id);
        CREATE UNIQUE INDEX IF NOT EXISTS idx_note_folders_pair
            ON tbl_note_folders(fk_note_id, fk_folder_id);
        CREATE INDEX IF NOT EXISTS idx_deviation_title ON tbl_deviation(title);
        CREATE INDEX IF NOT EXISTS idx_note_sender ON tbl_note(sender);
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
