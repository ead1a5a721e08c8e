// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! study-session: learner session and profile state for a hosted backend
//!
//! This crate tracks the signed-in identity of a learning-app client,
//! materializes its profile row on demand, and applies the small set of
//! profile mutations the app needs (answer stats, coins, profile edits).

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod session;

pub use error::{Result, SessionError};
pub use session::{SessionManager, SessionOptions, SessionSnapshot, SignUpRequest};
