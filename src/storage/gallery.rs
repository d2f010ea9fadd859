//! Gallery mirror: deviations, gallery folders and their junction rows.

use std::collections::{BTreeSet, HashSet};

use sqlx::sqlite::SqlitePool;
use sqlx::{Sqlite, Transaction};

use crate::error::{AppError, Result};
use crate::models::{Deviation, GalleryFolder, NO_FOLDER_ID};

/// What a reconciliation changed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct GallerySyncSummary {
    pub deviations_added: usize,
    pub deviations_removed: usize,
    pub links_added: usize,
    pub links_removed: usize,
    pub folders_removed: u64,
}

#[derive(Debug, Clone)]
pub struct GalleryRepository {
    pool: SqlitePool,
}

impl GalleryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Ids of every stored deviation.
    pub async fn deviation_ids(&self) -> Result<BTreeSet<i64>> {
        let ids: Vec<i64> = sqlx::query_scalar("SELECT id FROM tbl_deviation")
            .fetch_all(&self.pool)
            .await?;
        Ok(ids.into_iter().collect())
    }

    /// Every stored deviation with its folder ids, newest first.
    #[cfg(test)]
    pub async fn deviations(&self) -> Result<Vec<Deviation>> {
        let rows: Vec<(i64, String, String, String, i64, String)> = sqlx::query_as(
            "SELECT id, title, url, username, timestamp, description
             FROM tbl_deviation ORDER BY id DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut deviations = Vec::with_capacity(rows.len());
        for (id, title, url, username, timestamp, description) in rows {
            let folder_ids: Vec<String> = sqlx::query_scalar(
                "SELECT fk_folder_id FROM tbl_deviation_folders
                 WHERE fk_deviation_id = ? ORDER BY fk_folder_id",
            )
            .bind(id)
            .fetch_all(&self.pool)
            .await?;
            deviations.push(Deviation {
                id,
                title,
                url,
                username,
                timestamp,
                description: Some(description),
                folder_ids,
            });
        }
        Ok(deviations)
    }

    #[cfg(test)]
    pub async fn folders(&self) -> Result<Vec<GalleryFolder>> {
        let rows: Vec<(String, String, String, String)> = sqlx::query_as(
            "SELECT id, title, description, url FROM tbl_gallery_folder ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(id, title, description, url)| GalleryFolder {
                id,
                title,
                description,
                url,
            })
            .collect())
    }

    /// Make the store mirror the fetched gallery, in one transaction.
    ///
    /// `deviations` must be the complete gallery: anything stored but not
    /// listed is deleted. Descriptions are only written when present.
    pub async fn reconcile(
        &self,
        folders: &[GalleryFolder],
        deviations: &[Deviation],
    ) -> Result<GallerySyncSummary> {
        let mut summary = GallerySyncSummary::default();
        let mut tx = self.pool.begin().await?;

        let known_folders: HashSet<&str> = folders.iter().map(|f| f.id.as_str()).collect();
        for folder in folders {
            upsert_folder(&mut tx, folder).await?;
        }
        if deviations.iter().any(|d| d.folder_ids.is_empty())
            && !known_folders.contains(NO_FOLDER_ID)
        {
            upsert_folder(&mut tx, &GalleryFolder::unfiled()).await?;
        }

        let stored: Vec<i64> = sqlx::query_scalar("SELECT id FROM tbl_deviation")
            .fetch_all(&mut *tx)
            .await?;
        let stored: HashSet<i64> = stored.into_iter().collect();

        let mut fetched = HashSet::with_capacity(deviations.len());
        for deviation in deviations {
            if !fetched.insert(deviation.id) {
                continue;
            }
            if !stored.contains(&deviation.id) {
                summary.deviations_added += 1;
                log::info!("New deviation {} '{}'", deviation.id, deviation.title);
            }
            upsert_deviation(&mut tx, deviation).await?;
            let (added, removed) = sync_links(&mut tx, deviation).await?;
            summary.links_added += added;
            summary.links_removed += removed;
        }

        for id in stored.iter().filter(|id| !fetched.contains(*id)) {
            sqlx::query("DELETE FROM tbl_deviation_folders WHERE fk_deviation_id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            sqlx::query("DELETE FROM tbl_deviation WHERE id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            summary.deviations_removed += 1;
            log::info!("Deviation {} deleted", id);
        }

        summary.folders_removed = sqlx::query(
            "DELETE FROM tbl_gallery_folder
             WHERE id NOT IN (SELECT fk_folder_id FROM tbl_deviation_folders)",
        )
        .execute(&mut *tx)
        .await?
        .rows_affected();

        tx.commit().await?;
        log::debug!("Gallery reconciled: {:?}", summary);
        Ok(summary)
    }
}

async fn upsert_folder(tx: &mut Transaction<'_, Sqlite>, folder: &GalleryFolder) -> Result<()> {
    sqlx::query(
        "INSERT INTO tbl_gallery_folder (id, title, description, url) VALUES (?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
            title = excluded.title,
            description = excluded.description,
            url = excluded.url",
    )
    .bind(&folder.id)
    .bind(&folder.title)
    .bind(&folder.description)
    .bind(&folder.url)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn upsert_deviation(tx: &mut Transaction<'_, Sqlite>, deviation: &Deviation) -> Result<()> {
    sqlx::query(
        "INSERT INTO tbl_deviation (id, title, url, username, timestamp, description)
         VALUES (?, ?, ?, ?, ?, '')
         ON CONFLICT(id) DO UPDATE SET
            title = excluded.title,
            url = excluded.url,
            username = excluded.username,
            timestamp = excluded.timestamp",
    )
    .bind(deviation.id)
    .bind(&deviation.title)
    .bind(&deviation.url)
    .bind(&deviation.username)
    .bind(deviation.timestamp)
    .execute(&mut **tx)
    .await?;

    if let Some(description) = &deviation.description {
        sqlx::query("UPDATE tbl_deviation SET description = ? WHERE id = ?")
            .bind(description)
            .bind(deviation.id)
            .execute(&mut **tx)
            .await?;
    }
    Ok(())
}

/// Bring a deviation's junction rows in line with its folder set.
async fn sync_links(
    tx: &mut Transaction<'_, Sqlite>,
    deviation: &Deviation,
) -> Result<(usize, usize)> {
    let wanted = deviation.effective_folder_ids();
    let current: Vec<String> =
        sqlx::query_scalar("SELECT fk_folder_id FROM tbl_deviation_folders WHERE fk_deviation_id = ?")
            .bind(deviation.id)
            .fetch_all(&mut **tx)
            .await?;

    let mut removed = 0;
    for folder_id in current.iter().filter(|f| !wanted.contains(*f)) {
        sqlx::query(
            "DELETE FROM tbl_deviation_folders WHERE fk_deviation_id = ? AND fk_folder_id = ?",
        )
        .bind(deviation.id)
        .bind(folder_id)
        .execute(&mut **tx)
        .await?;
        removed += 1;
    }

    let mut added = 0;
    for folder_id in wanted.iter().filter(|f| !current.contains(*f)) {
        sqlx::query(
            "INSERT INTO tbl_deviation_folders (fk_deviation_id, fk_folder_id) VALUES (?, ?)",
        )
        .bind(deviation.id)
        .bind(folder_id)
        .execute(&mut **tx)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_foreign_key_violation() => {
                AppError::validation(format!(
                    "deviation {} references unknown folder {}",
                    deviation.id, folder_id
                ))
            }
            other => AppError::Database(other),
        })?;
        added += 1;
    }

    if added > 0 || removed > 0 {
        log::debug!(
            "Deviation {} folders now {:?} (+{}, -{})",
            deviation.id,
            wanted,
            added,
            removed
        );
    }
    Ok((added, removed))
}
