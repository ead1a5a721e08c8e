// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Static chapter catalog loading and lookup.

use crate::models::Chapter;
use std::fs;
use std::path::Path;

/// Read-only catalog of curriculum chapters.
#[derive(Debug, Default, Clone)]
pub struct ChapterCatalog {
    chapters: Vec<Chapter>,
}

impl ChapterCatalog {
    /// Build a catalog from already-loaded chapters.
    pub fn from_chapters(chapters: Vec<Chapter>) -> Self {
        Self { chapters }
    }

    /// Load chapters from a JSON file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, CatalogError> {
        let json_data =
            fs::read_to_string(path.as_ref()).map_err(|e| CatalogError::IoError(e.to_string()))?;
        Self::load_from_json(&json_data)
    }

    /// Load chapters from a JSON array string.
    pub fn load_from_json(json_data: &str) -> Result<Self, CatalogError> {
        let chapters: Vec<Chapter> = serde_json::from_str(json_data)
            .map_err(|e| CatalogError::ParseError(e.to_string()))?;

        tracing::info!(count = chapters.len(), "Loaded chapter catalog");
        Ok(Self { chapters })
    }

    /// Get the list of chapters.
    pub fn chapters(&self) -> &[Chapter] {
        &self.chapters
    }

    /// ID of the first chapter (`order == 1`) for a class level.
    pub fn first_chapter_id(&self, class_level: i32) -> Option<&str> {
        self.chapters
            .iter()
            .find(|c| c.class_level == class_level && c.order == 1)
            .map(|c| c.id.as_str())
    }
}

/// Errors from catalog loading.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Failed to read file: {0}")]
    IoError(String),

    #[error("Failed to parse chapter catalog: {0}")]
    ParseError(String),
}
