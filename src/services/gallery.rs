// src/services/gallery.rs

//! The account's own gallery.

use async_trait::async_trait;
use scraper::Html;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{AppError, Result};
use crate::models::{Deviation, GalleryFolder, GalleryPage};
use crate::services::difi::{value_to_i64, value_to_string, value_to_text};
use crate::services::selectors::{self, parse_selector};
use crate::services::{DevArtClient, GALLERY_PAGE_SIZE, GalleryArchive};
use crate::utils::extract_text;
use crate::utils::http::fetch_text;

const CONTEXT: &str = "Gallections;get_deviations";

#[derive(Debug, Deserialize)]
struct RawPage {
    #[serde(default)]
    deviations: Vec<RawDeviation>,
}

#[derive(Debug, Deserialize)]
struct RawDeviation {
    deviationid: Value,
    #[serde(default)]
    title: Value,
    #[serde(default)]
    url: Value,
    #[serde(default)]
    username: Value,
    #[serde(default)]
    ts: Value,
    #[serde(default)]
    folders: Vec<RawFolder>,
}

#[derive(Debug, Deserialize)]
struct RawFolder {
    folderid: Value,
    #[serde(default)]
    title: Value,
    #[serde(default)]
    description: Value,
    #[serde(default)]
    url: Value,
}

impl RawFolder {
    fn into_folder(self) -> Result<GalleryFolder> {
        let id = value_to_string(&self.folderid)
            .ok_or_else(|| AppError::parse(CONTEXT, "folder without folderid"))?;
        Ok(GalleryFolder {
            id,
            title: extract_text(&value_to_text(&self.title), true),
            description: extract_text(&value_to_text(&self.description), false),
            url: value_to_text(&self.url),
        })
    }
}

/// Parse one `Gallections;get_deviations` page.
///
/// Folders are collected once each, in order of first appearance.
pub fn parse_gallery_page(content: &Value) -> Result<GalleryPage> {
    let raw: RawPage =
        serde_json::from_value(content.clone()).map_err(|e| AppError::parse(CONTEXT, e))?;

    let mut page = GalleryPage::default();
    for raw_deviation in raw.deviations {
        let id = value_to_i64(&raw_deviation.deviationid)
            .ok_or_else(|| AppError::parse(CONTEXT, "deviation without a numeric id"))?;
        let timestamp = value_to_i64(&raw_deviation.ts)
            .ok_or_else(|| AppError::parse(CONTEXT, format!("deviation {id} has no ts")))?;

        let mut folder_ids = Vec::with_capacity(raw_deviation.folders.len());
        for raw_folder in raw_deviation.folders {
            let folder = raw_folder.into_folder()?;
            folder_ids.push(folder.id.clone());
            if !page.folders.iter().any(|f| f.id == folder.id) {
                page.folders.push(folder);
            }
        }

        page.deviations.push(Deviation {
            id,
            title: extract_text(&value_to_text(&raw_deviation.title), true),
            url: value_to_text(&raw_deviation.url),
            username: extract_text(&value_to_text(&raw_deviation.username), true),
            timestamp,
            description: None,
            folder_ids,
        });
    }
    Ok(page)
}

/// Description text from a deviation page; blank when there is none.
pub fn parse_deviation_description(html: &str) -> Result<String> {
    let document = Html::parse_document(html);
    let selector = parse_selector(selectors::DEVIATION_DESCRIPTION)?;
    Ok(document
        .select(&selector)
        .next()
        .map(|e| extract_text(&e.inner_html(), false))
        .unwrap_or_default())
}

#[async_trait]
impl GalleryArchive for DevArtClient {
    async fn gallery_page(&mut self, offset: usize) -> Result<GalleryPage> {
        let call = format!(
            "{CONTEXT};{},{offset},{GALLERY_PAGE_SIZE}",
            self.username()
        );
        let content = self.difi_one(call).await?;
        parse_gallery_page(&content)
    }

    async fn deviation_description(&mut self, url: &str) -> Result<String> {
        let page = fetch_text(self.http(), &self.url(url)).await?;
        parse_deviation_description(&page)
    }
}
