// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - external collaborators of the session manager.

pub mod auth;
pub mod catalog;

pub use auth::{AuthService, AuthSubscription, GoTrueClient, SessionCache};
pub use catalog::{CatalogError, ChapterCatalog};
