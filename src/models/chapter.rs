//! Chapter catalog entry.

use serde::{Deserialize, Serialize};

/// Chapter unlocked for a new profile when the catalog has no first chapter.
pub const FALLBACK_CHAPTER_ID: &str = "class1_ch1";

/// One chapter of the static curriculum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chapter {
    /// Stable chapter ID (e.g. "class9_ch1")
    pub id: String,
    /// Class level the chapter belongs to
    pub class_level: i32,
    /// Position within the class, starting at 1
    pub order: i32,
    #[serde(default)]
    pub title: String,
}
