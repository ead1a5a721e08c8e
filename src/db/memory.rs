//! In-process profile table for offline runs and tests.

use crate::db::{ProfileLookup, ProfileStore};
use crate::error::{Result, SessionError};
use crate::models::{ProfilePatch, ProfileRow};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Profiles kept in memory, keyed by identity ID.
#[derive(Clone, Default)]
pub struct MemoryProfileStore {
    rows: Arc<Mutex<HashMap<String, ProfileRow>>>,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with `rows`.
    pub fn with_rows(rows: impl IntoIterator<Item = ProfileRow>) -> Self {
        let rows = rows.into_iter().map(|r| (r.id.clone(), r)).collect();
        Self {
            rows: Arc::new(Mutex::new(rows)),
        }
    }

    /// Current stored row for `id`.
    pub async fn row(&self, id: &str) -> Option<ProfileRow> {
        self.rows.lock().await.get(id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.rows.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.lock().await.is_empty()
    }
}

#[async_trait]
impl ProfileStore for MemoryProfileStore {
    async fn fetch(&self, id: &str) -> Result<ProfileLookup> {
        Ok(match self.rows.lock().await.get(id) {
            Some(row) => ProfileLookup::Found(row.clone()),
            None => ProfileLookup::NotFound,
        })
    }

    async fn insert(&self, row: &ProfileRow) -> Result<()> {
        let mut rows = self.rows.lock().await;
        if rows.contains_key(&row.id) {
            return Err(SessionError::Database(format!(
                "duplicate key value violates unique constraint (id={})",
                row.id
            )));
        }
        rows.insert(row.id.clone(), row.clone());
        Ok(())
    }

    async fn update(&self, id: &str, patch: &ProfilePatch) -> Result<()> {
        // Updating a missing row matches nothing, like a filtered UPDATE
        if let Some(row) = self.rows.lock().await.get_mut(id) {
            row.apply(patch);
        }
        Ok(())
    }
}
