// src/pipeline/deviations.rs

//! Deviations downloader: mirrors the account's gallery into SQLite.

use std::collections::HashSet;

use crate::error::Result;
use crate::models::{Deviation, GalleryFolder};
use crate::services::{GALLERY_PAGE_SIZE, GalleryArchive, Session};
use crate::storage::{GalleryRepository, GallerySyncSummary};

/// The whole gallery as currently listed.
#[derive(Debug, Default)]
pub struct GalleryListing {
    pub folders: Vec<GalleryFolder>,
    pub deviations: Vec<Deviation>,
}

/// Page through the gallery until a short page.
pub async fn fetch_gallery<A>(archive: &mut A) -> Result<GalleryListing>
where
    A: GalleryArchive + ?Sized,
{
    let mut listing = GalleryListing::default();
    let mut seen_folders = HashSet::new();
    let mut seen_deviations = HashSet::new();
    let mut offset = 0;

    loop {
        let page = archive.gallery_page(offset).await?;
        let count = page.deviations.len();
        log::debug!("Gallery offset {}: {} deviations", offset, count);

        for folder in page.folders {
            if seen_folders.insert(folder.id.clone()) {
                listing.folders.push(folder);
            }
        }
        for deviation in page.deviations {
            if seen_deviations.insert(deviation.id) {
                listing.deviations.push(deviation);
            }
        }

        if count < GALLERY_PAGE_SIZE {
            break;
        }
        offset += GALLERY_PAGE_SIZE;
    }

    Ok(listing)
}

/// Fetch the gallery and reconcile the database with it.
///
/// Descriptions are only downloaded for deviations not stored yet.
pub async fn run_deviations<A>(
    client: &mut A,
    repository: &GalleryRepository,
) -> Result<GallerySyncSummary>
where
    A: Session + GalleryArchive,
{
    client.ensure_logged_in().await?;

    let mut listing = fetch_gallery(client).await?;
    log::info!(
        "Gallery lists {} deviations in {} folders",
        listing.deviations.len(),
        listing.folders.len()
    );

    let stored = repository.deviation_ids().await?;
    for deviation in listing
        .deviations
        .iter_mut()
        .filter(|d| !stored.contains(&d.id))
    {
        log::info!("New deviation {} '{}'", deviation.id, deviation.title);
        deviation.description = Some(client.deviation_description(&deviation.url).await?);
    }

    let summary = repository
        .reconcile(&listing.folders, &listing.deviations)
        .await?;
    log::info!(
        "Deviations: {} added, {} removed",
        summary.deviations_added,
        summary.deviations_removed
    );
    Ok(summary)
}
