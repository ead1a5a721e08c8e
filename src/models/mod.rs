// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the application.

pub mod chapter;
pub mod identity;
pub mod profile;

pub use chapter::{Chapter, FALLBACK_CHAPTER_ID};
pub use identity::{AuthChangeEvent, AuthEvent, Identity, Session, UserMetadata};
pub use profile::{Profile, ProfilePatch, ProfileRow, ProfileUpdate, StatsDelta, StatsTotals};
