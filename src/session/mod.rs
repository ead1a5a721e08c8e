// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Session and profile state exposed to UI layers.

pub mod manager;

pub use manager::SessionManager;

use crate::config::Config;
use crate::models::{Identity, Profile};
use serde::{Deserialize, Serialize};
use std::time::Duration;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;
use validator::Validate;

/// Tunables for the session manager.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Delay before a stats write is reconciled against the stored row
    pub reconcile_delay: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            reconcile_delay: Duration::from_millis(500),
        }
    }
}

impl From<&Config> for SessionOptions {
    fn from(config: &Config) -> Self {
        Self {
            reconcile_delay: config.reconcile_delay,
        }
    }
}

/// Point-in-time view of the session state.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct SessionSnapshot {
    pub identity: Option<Identity>,
    pub profile: Option<Profile>,
    /// True until the initial session lookup has finished
    pub loading: bool,
}

/// Sign-up form input.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SignUpRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 6, message = "password must be at least 6 characters"))]
    pub password: String,
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(range(min = 1, max = 12))]
    pub class_level: i32,
}
