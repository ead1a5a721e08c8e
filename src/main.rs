// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! study-session smoke runner
//!
//! Connects to the configured project, resolves the current session and,
//! when `SESSION_EMAIL`/`SESSION_PASSWORD` are set, signs in and prints the
//! resolved profile.

use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use study_session::{
    config::Config,
    db::PostgrestProfileStore,
    services::{ChapterCatalog, GoTrueClient},
    SessionManager, SessionOptions,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// How long to wait for the profile after signing in.
const PROFILE_WAIT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging()?;

    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::info!(url = %config.supabase_url, "Starting study-session");

    tracing::info!(path = %config.chapter_catalog_path, "Loading chapter catalog");
    let catalog = ChapterCatalog::load_from_file(&config.chapter_catalog_path)
        .context("Failed to load chapter catalog")?;

    let auth = Arc::new(GoTrueClient::new(&config));
    let store = Arc::new(PostgrestProfileStore::new(&config, auth.session_cache()));

    let manager =
        SessionManager::start(auth, store, catalog, SessionOptions::from(&config)).await;

    if let (Ok(email), Ok(password)) = (
        std::env::var("SESSION_EMAIL"),
        std::env::var("SESSION_PASSWORD"),
    ) {
        manager.sign_in(&email, &password).await?;

        let mut state = manager.subscribe();
        tokio::time::timeout(PROFILE_WAIT, state.wait_for(|s| s.profile.is_some()))
            .await
            .context("Timed out waiting for profile")??;
    }

    let snapshot = manager.snapshot();
    println!("{}", serde_json::to_string_pretty(&snapshot)?);

    if let Some(profile) = snapshot.profile {
        tracing::info!(
            name = profile.display_name(),
            coins = profile.total_coins,
            chapters = profile.effective_chapters().len(),
            "Profile loaded"
        );
    }

    manager.shutdown();
    Ok(())
}

/// Initialize structured JSON logging.
fn init_logging() -> anyhow::Result<()> {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true)
        .with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("study_session=debug".parse()?)
                .add_directive("info".parse()?),
        )
        .with(format)
        .init();
    Ok(())
}
