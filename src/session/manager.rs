// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Session/profile manager.
//!
//! Tracks the signed-in identity and its profile row:
//! - Seeds state from the auth service's current session at startup
//! - Follows identity change notifications until shutdown
//! - Creates a missing profile row on first fetch, backfills a null balance
//! - Applies stats and profile writes, then re-reads the stored row
//!
//! Profile resolutions are numbered. A result is applied only if no newer
//! resolution (or local write) has started since, and only while its identity
//! is still the current one.

use super::{SessionOptions, SessionSnapshot, SignUpRequest};
use crate::db::{ProfileLookup, ProfileStore};
use crate::error::{Result, SessionError};
use crate::models::profile::DEFAULT_CLASS_LEVEL;
use crate::models::{
    AuthEvent, Identity, Profile, ProfilePatch, ProfileRow, ProfileUpdate, StatsDelta,
    StatsTotals, UserMetadata,
};
use crate::services::auth::{AuthService, AuthSubscription};
use crate::services::ChapterCatalog;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use validator::Validate;

/// Slot holding a background task that can be replaced or aborted.
type TaskSlot = Mutex<Option<JoinHandle<()>>>;

/// Owns session state and the operations that mutate it.
pub struct SessionManager {
    auth: Arc<dyn AuthService>,
    store: Arc<dyn ProfileStore>,
    catalog: ChapterCatalog,
    options: SessionOptions,
    state: watch::Sender<SessionSnapshot>,
    /// Bumped by every profile resolution and local profile write.
    generation: AtomicU64,
    /// Tells the listener to release its subscription and exit.
    stop_listener: Arc<Notify>,
    reconcile: TaskSlot,
}

impl SessionManager {
    /// Create the manager, subscribe to identity changes and resolve the
    /// current session.
    ///
    /// Returns once the initial lookup has finished (`loading == false`).
    pub async fn start(
        auth: Arc<dyn AuthService>,
        store: Arc<dyn ProfileStore>,
        catalog: ChapterCatalog,
        options: SessionOptions,
    ) -> Arc<Self> {
        let (state, _) = watch::channel(SessionSnapshot {
            loading: true,
            ..Default::default()
        });

        let manager = Arc::new(Self {
            auth,
            store,
            catalog,
            options,
            state,
            generation: AtomicU64::new(0),
            stop_listener: Arc::new(Notify::new()),
            reconcile: Mutex::new(None),
        });

        // Subscribe first so a change during initialization is not missed
        let subscription = manager.auth.subscribe();
        manager.spawn_listener(subscription);
        manager.initialize().await;
        manager
    }

    async fn initialize(&self) {
        match self.auth.get_session().await {
            Ok(session) => {
                let identity = session.map(|s| s.user);
                tracing::info!(
                    user_id = identity.as_ref().map(|i| i.id.as_str()).unwrap_or("-"),
                    "Initial session resolved"
                );
                self.set_identity(identity.clone());
                if let Some(identity) = identity {
                    self.resolve_profile(&identity.id).await;
                }
            }
            Err(e) if e.is_refresh_token_error() => {
                tracing::warn!(error = %e, "Stored session is no longer valid, signing out");
                self.sign_out().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to get initial session");
            }
        }

        self.state.send_modify(|s| s.loading = false);
    }

    fn spawn_listener(self: &Arc<Self>, mut subscription: AuthSubscription) {
        let manager: Weak<Self> = Arc::downgrade(self);
        let stop = self.stop_listener.clone();
        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    biased;
                    _ = stop.notified() => break,
                    event = subscription.recv() => event,
                };
                let (Some(event), Some(manager)) = (event, manager.upgrade()) else {
                    break;
                };
                manager.handle_auth_event(event).await;
            }
            subscription.unsubscribe();
        });
    }

    async fn handle_auth_event(&self, event: AuthEvent) {
        let identity = event.identity().cloned();
        tracing::debug!(
            kind = ?event.kind,
            user_id = identity.as_ref().map(|i| i.id.as_str()).unwrap_or("-"),
            "Auth state changed"
        );

        self.set_identity(identity.clone());
        match identity {
            Some(identity) => self.resolve_profile(&identity.id).await,
            None => {
                abort_task(&self.reconcile);
                self.clear_local();
            }
        }
    }

    // ─── State Access ────────────────────────────────────────────

    /// Watch session state changes.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.borrow().clone()
    }

    pub fn user(&self) -> Option<Identity> {
        self.state.borrow().identity.clone()
    }

    pub fn profile(&self) -> Option<Profile> {
        self.state.borrow().profile.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.state.borrow().loading
    }

    /// Replace the cached identity. A different identity drops the old profile.
    fn set_identity(&self, identity: Option<Identity>) {
        let mut switched = false;
        self.state.send_modify(|s| {
            let old_id = s.identity.as_ref().map(|i| i.id.as_str());
            let new_id = identity.as_ref().map(|i| i.id.as_str());
            if old_id != new_id {
                s.profile = None;
                switched = true;
            }
            s.identity = identity;
        });

        if switched {
            abort_task(&self.reconcile);
        }
    }

    /// Clear identity and profile; in-flight resolutions are discarded.
    fn clear_local(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.state.send_modify(|s| {
            s.identity = None;
            s.profile = None;
        });
    }

    /// Store `profile` if `generation` is still the latest and `identity_id`
    /// is still current. Returns whether it was applied.
    fn apply_profile(&self, identity_id: &str, generation: u64, profile: Profile) -> bool {
        self.state.send_if_modified(|s| {
            if self.generation.load(Ordering::SeqCst) != generation {
                tracing::debug!(user_id = %identity_id, generation, "Discarding superseded profile");
                return false;
            }
            if s.identity.as_ref().map(|i| i.id.as_str()) != Some(identity_id) {
                tracing::debug!(user_id = %identity_id, "Discarding profile for previous identity");
                return false;
            }
            s.profile = Some(profile);
            true
        })
    }

    // ─── Profile Resolution ──────────────────────────────────────

    /// Fetch (creating if missing) the profile for `identity_id` and cache it.
    ///
    /// Failures are logged and leave the cached profile unchanged.
    pub async fn resolve_profile(&self, identity_id: &str) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        match self.load_profile(identity_id).await {
            Ok(profile) => {
                if self.apply_profile(identity_id, generation, profile) {
                    tracing::debug!(user_id = %identity_id, "Profile cached");
                }
            }
            Err(e) => {
                tracing::error!(user_id = %identity_id, error = %e, "Failed to resolve profile");
            }
        }
    }

    /// Re-resolve the profile of the current identity, if any.
    pub async fn refresh_profile(&self) {
        if let Some(identity) = self.user() {
            self.resolve_profile(&identity.id).await;
        }
    }

    async fn load_profile(&self, identity_id: &str) -> Result<Profile> {
        let row = match self.store.fetch(identity_id).await? {
            ProfileLookup::Found(row) => row,
            ProfileLookup::NotFound => {
                self.create_missing_profile(identity_id).await?;
                // Read back so the cache holds what was persisted
                match self.store.fetch(identity_id).await? {
                    ProfileLookup::Found(row) => row,
                    ProfileLookup::NotFound => {
                        return Err(SessionError::Database(format!(
                            "Profile {} missing after insert",
                            identity_id
                        )));
                    }
                }
            }
        };

        if row.needs_coin_backfill() {
            let coins = row.coin_balance();
            match self
                .store
                .update(identity_id, &ProfilePatch::coin_backfill(coins))
                .await
            {
                Ok(()) => tracing::info!(user_id = %identity_id, coins, "Backfilled coin balance"),
                Err(e) => {
                    tracing::warn!(user_id = %identity_id, error = %e, "Coin balance backfill failed")
                }
            }
        }

        Ok(Profile::from(row))
    }

    /// Insert a default profile row for an identity that has none.
    async fn create_missing_profile(&self, identity_id: &str) -> Result<()> {
        tracing::info!(user_id = %identity_id, "Profile missing, creating default row");

        let identity = match self.auth.get_user().await {
            Ok(Some(user)) if user.id == identity_id => user,
            Ok(_) => self.fallback_identity(identity_id),
            Err(e) => {
                tracing::warn!(user_id = %identity_id, error = %e, "Could not load user metadata");
                self.fallback_identity(identity_id)
            }
        };

        let first_chapter = self.catalog.first_chapter_id(DEFAULT_CLASS_LEVEL);
        let row = ProfileRow::self_healed(&identity, first_chapter);
        self.store.insert(&row).await
    }

    /// Cached identity if it matches, else a bare identity with no metadata.
    fn fallback_identity(&self, identity_id: &str) -> Identity {
        self.user()
            .filter(|i| i.id == identity_id)
            .unwrap_or_else(|| Identity {
                id: identity_id.to_string(),
                email: None,
                user_metadata: UserMetadata::default(),
            })
    }

    // ─── Operations ──────────────────────────────────────────────

    /// Create credentials and the profile row for a new learner.
    pub async fn sign_up(&self, request: SignUpRequest) -> Result<Identity> {
        request.validate()?;

        let metadata = UserMetadata {
            name: Some(request.name.clone()),
            class_level: Some(request.class_level),
            ..Default::default()
        };
        let identity = self
            .auth
            .sign_up(&request.email, &request.password, &metadata)
            .await?;

        let first_chapter = self.catalog.first_chapter_id(request.class_level);
        if first_chapter.is_none() {
            tracing::warn!(
                class_level = request.class_level,
                "No first chapter in catalog, starting with none unlocked"
            );
        }

        let row = ProfileRow::signed_up(
            &identity.id,
            &request.email,
            &request.name,
            request.class_level,
            first_chapter,
        );
        self.insert_sign_up_row(&row).await?;
        tracing::info!(user_id = %identity.id, class_level = request.class_level, "Profile created");

        // Adopt the new identity now if sign-up also signed us in
        if let Ok(Some(session)) = self.auth.get_session().await {
            if session.user.id == identity.id {
                self.set_identity(Some(session.user));
            }
        }

        self.resolve_profile(&identity.id).await;
        Ok(identity)
    }

    /// Insert the sign-up row. If the sign-in notification already created a
    /// default row for this identity, overwrite it with the sign-up values.
    async fn insert_sign_up_row(&self, row: &ProfileRow) -> Result<()> {
        let err = match self.store.insert(row).await {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };

        match self.store.fetch(&row.id).await {
            Ok(ProfileLookup::Found(_)) => {
                tracing::info!(user_id = %row.id, "Default profile already created, applying sign-up values");
                self.store.update(&row.id, &ProfilePatch::from(row)).await
            }
            _ => Err(err),
        }
    }

    /// Verify credentials. The profile follows from the sign-in notification.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<()> {
        let session = self.auth.sign_in_with_password(email, password).await?;
        tracing::info!(user_id = %session.user.id, "Sign in accepted");
        Ok(())
    }

    /// Invalidate the remote session if there is one and clear local state.
    ///
    /// Never fails; remote errors are logged.
    pub async fn sign_out(&self) {
        match self.auth.get_session().await {
            Ok(Some(_)) => {
                if let Err(e) = self.auth.sign_out().await {
                    tracing::warn!(error = %e, "Remote sign out failed, clearing local session");
                }
            }
            Ok(None) => tracing::debug!("No active session to invalidate"),
            Err(e) => tracing::warn!(error = %e, "Could not check session before sign out"),
        }

        abort_task(&self.reconcile);
        self.clear_local();
        tracing::info!("Signed out");
    }

    /// Add to the answer counters and coin balance.
    ///
    /// Writes the new totals, updates the cache optimistically and schedules a
    /// re-read of the stored row. Returns `None` when nobody is signed in.
    /// A NaN or infinite `coins_delta` is rejected before anything is written.
    pub async fn update_user_stats(
        self: &Arc<Self>,
        correct_delta: i64,
        wrong_delta: i64,
        coins_delta: f64,
    ) -> Result<Option<StatsTotals>> {
        if !coins_delta.is_finite() {
            return Err(SessionError::Validation(format!(
                "coin change must be a finite number, got {}",
                coins_delta
            )));
        }

        let Some(identity) = self.user() else {
            return Ok(None);
        };

        let totals = StatsTotals::accumulate(
            self.profile().as_ref(),
            StatsDelta {
                correct: correct_delta,
                wrong: wrong_delta,
                coins: coins_delta,
            },
        );

        self.store
            .update(&identity.id, &ProfilePatch::stats(&totals))
            .await?;

        tracing::debug!(
            user_id = %identity.id,
            total_correct = totals.total_correct,
            total_wrong = totals.total_wrong,
            total_coins = totals.total_coins,
            "Stats written"
        );

        // Older in-flight reads must not overwrite the new totals
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.state.send_if_modified(|s| {
            let current = s.identity.as_ref().map(|i| i.id.as_str()) == Some(identity.id.as_str());
            match s.profile.as_mut() {
                Some(profile) if current => {
                    *profile = profile.with_totals(&totals);
                    true
                }
                _ => false,
            }
        });

        self.schedule_reconcile(identity.id);
        Ok(Some(totals))
    }

    /// Re-read the stored row after the reconcile delay. Replaces (and aborts)
    /// any reconcile still pending from an earlier write.
    fn schedule_reconcile(self: &Arc<Self>, identity_id: String) {
        let delay = self.options.reconcile_delay;
        let manager = Arc::downgrade(self);
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(manager) = manager.upgrade() {
                tracing::debug!(user_id = %identity_id, "Reconciling profile after stats write");
                manager.resolve_profile(&identity_id).await;
            }
        });

        replace_task(&self.reconcile, task);
    }

    /// Write a partial profile update, then re-read the stored row.
    pub async fn update_user_profile(&self, update: ProfileUpdate) -> Result<()> {
        let Some(identity) = self.user() else {
            return Ok(());
        };

        self.store
            .update(&identity.id, &ProfilePatch::from(update))
            .await?;
        tracing::info!(user_id = %identity.id, "Profile updated");

        self.resolve_profile(&identity.id).await;
        Ok(())
    }

    /// Stop following identity changes and cancel pending reconciles.
    ///
    /// The listener releases its subscription before the next notification
    /// is handled.
    pub fn shutdown(&self) {
        self.stop_listener.notify_one();
        abort_task(&self.reconcile);
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn replace_task(slot: &TaskSlot, task: JoinHandle<()>) {
    let previous = slot
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .replace(task);
    if let Some(previous) = previous {
        previous.abort();
    }
}

fn abort_task(slot: &TaskSlot) {
    let task = slot.lock().unwrap_or_else(PoisonError::into_inner).take();
    if let Some(task) = task {
        task.abort();
    }
}
