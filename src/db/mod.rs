//! Profile storage layer.

pub mod memory;
pub mod postgrest;

pub use memory::MemoryProfileStore;
pub use postgrest::PostgrestProfileStore;

use crate::error::Result;
use crate::models::{ProfilePatch, ProfileRow};
use async_trait::async_trait;

/// Table names as constants.
pub mod tables {
    pub const PROFILES: &str = "profiles";
}

/// Outcome of a lookup by identity ID.
#[derive(Debug, Clone, PartialEq)]
pub enum ProfileLookup {
    Found(ProfileRow),
    NotFound,
}

/// Profile table operations, keyed by identity ID.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Select the row for `id`; a missing row is `Ok(NotFound)`, not an error.
    async fn fetch(&self, id: &str) -> Result<ProfileLookup>;

    async fn insert(&self, row: &ProfileRow) -> Result<()>;

    /// Update only the columns set in `patch`.
    async fn update(&self, id: &str, patch: &ProfilePatch) -> Result<()>;
}
