// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use study_session::db::{MemoryProfileStore, ProfileLookup, ProfileStore};
use study_session::models::{
    AuthChangeEvent, AuthEvent, Chapter, Identity, ProfilePatch, ProfileRow, Session,
    UserMetadata,
};
use study_session::services::{AuthService, AuthSubscription, ChapterCatalog};
use study_session::{SessionError, SessionManager, SessionOptions, SessionSnapshot};
use tokio::sync::broadcast;

/// Upper bound for waiting on background state changes.
#[allow(dead_code)]
pub const STATE_TIMEOUT: Duration = Duration::from_secs(2);

/// Reconcile delay used by tests (short, but long enough to observe).
#[allow(dead_code)]
pub const TEST_RECONCILE_DELAY: Duration = Duration::from_millis(100);

#[allow(dead_code)]
pub fn identity(id: &str, name: Option<&str>) -> Identity {
    Identity {
        id: id.to_string(),
        email: Some(format!("{}@example.com", id)),
        user_metadata: UserMetadata {
            name: name.map(str::to_string),
            ..Default::default()
        },
    }
}

#[allow(dead_code)]
pub fn session_for(identity: Identity) -> Session {
    Session {
        access_token: format!("access-{}", identity.id),
        refresh_token: format!("refresh-{}", identity.id),
        expires_at: Some(chrono::Utc::now().timestamp() + 3600),
        expires_in: Some(3600),
        token_type: "bearer".to_string(),
        user: identity,
    }
}

/// Catalog with first chapters for classes 1 and 9.
#[allow(dead_code)]
pub fn test_catalog() -> ChapterCatalog {
    ChapterCatalog::from_chapters(vec![
        Chapter {
            id: "class1_ch1".into(),
            class_level: 1,
            order: 1,
            title: "Numbers up to 100".into(),
        },
        Chapter {
            id: "class9_ch2".into(),
            class_level: 9,
            order: 2,
            title: "Polynomials".into(),
        },
        Chapter {
            id: "class9_ch1".into(),
            class_level: 9,
            order: 1,
            title: "Number Systems".into(),
        },
    ])
}

#[allow(dead_code)]
pub fn test_options() -> SessionOptions {
    SessionOptions {
        reconcile_delay: TEST_RECONCILE_DELAY,
    }
}

/// Start a manager over the given fakes with the test catalog.
#[allow(dead_code)]
pub async fn start_manager(auth: &Arc<FakeAuth>, store: &Arc<RecordingStore>) -> Arc<SessionManager> {
    SessionManager::start(auth.clone(), store.clone(), test_catalog(), test_options()).await
}

/// Wait until the session state satisfies `pred`.
#[allow(dead_code)]
pub async fn wait_for_state<F>(manager: &SessionManager, pred: F) -> SessionSnapshot
where
    F: FnMut(&SessionSnapshot) -> bool,
{
    let mut rx = manager.subscribe();
    let snapshot = tokio::time::timeout(STATE_TIMEOUT, rx.wait_for(pred))
        .await
        .expect("timed out waiting for session state")
        .expect("session state channel closed")
        .clone();
    snapshot
}

// ─── Fake Auth Service ───────────────────────────────────────

/// In-process auth service with switchable failures.
pub struct FakeAuth {
    events: broadcast::Sender<AuthEvent>,
    session: Mutex<Option<Session>>,
    accounts: Mutex<HashMap<String, (String, Identity)>>,
    next_id: AtomicUsize,
    /// Sign-up also signs in (no email confirmation)
    pub auto_confirm: AtomicBool,
    /// `get_session` reports a rejected refresh token
    pub refresh_invalid: AtomicBool,
    /// `get_session` fails with a non-credential error
    pub session_unavailable: AtomicBool,
    /// Remote sign out fails (local session left untouched)
    pub fail_sign_out: AtomicBool,
    pub fail_sign_up: AtomicBool,
    pub sign_out_calls: AtomicUsize,
    pub get_user_calls: AtomicUsize,
}

#[allow(dead_code)]
impl FakeAuth {
    pub fn new() -> Arc<Self> {
        let (events, _) = broadcast::channel(32);
        Arc::new(Self {
            events,
            session: Mutex::new(None),
            accounts: Mutex::new(HashMap::new()),
            next_id: AtomicUsize::new(1),
            auto_confirm: AtomicBool::new(true),
            refresh_invalid: AtomicBool::new(false),
            session_unavailable: AtomicBool::new(false),
            fail_sign_out: AtomicBool::new(false),
            fail_sign_up: AtomicBool::new(false),
            sign_out_calls: AtomicUsize::new(0),
            get_user_calls: AtomicUsize::new(0),
        })
    }

    /// Auth service that already holds a session for `identity`.
    pub fn signed_in(identity: Identity) -> Arc<Self> {
        let auth = Self::new();
        *auth.session.lock().unwrap() = Some(session_for(identity));
        auth
    }

    pub fn register(&self, email: &str, password: &str, identity: Identity) {
        self.accounts
            .lock()
            .unwrap()
            .insert(email.to_string(), (password.to_string(), identity));
    }

    /// Simulate a notification originating outside the manager.
    pub fn emit(&self, kind: AuthChangeEvent, session: Option<Session>) {
        *self.session.lock().unwrap() = session.clone();
        let _ = self.events.send(AuthEvent::new(kind, session));
    }

    pub fn current_session(&self) -> Option<Session> {
        self.session.lock().unwrap().clone()
    }

    /// Live subscriptions to identity change notifications.
    pub fn subscriber_count(&self) -> usize {
        self.events.receiver_count()
    }
}

#[async_trait]
impl AuthService for FakeAuth {
    async fn get_session(&self) -> study_session::Result<Option<Session>> {
        if self.refresh_invalid.load(Ordering::SeqCst) {
            return Err(SessionError::InvalidRefreshToken);
        }
        if self.session_unavailable.load(Ordering::SeqCst) {
            return Err(SessionError::Auth("HTTP 503: unavailable".into()));
        }
        Ok(self.current_session())
    }

    fn subscribe(&self) -> AuthSubscription {
        AuthSubscription::new(self.events.subscribe())
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: &UserMetadata,
    ) -> study_session::Result<Identity> {
        if self.fail_sign_up.load(Ordering::SeqCst) {
            return Err(SessionError::Auth("HTTP 422: User already registered".into()));
        }

        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        let identity = Identity {
            id: format!("user-{}", n),
            email: Some(email.to_string()),
            user_metadata: metadata.clone(),
        };
        self.register(email, password, identity.clone());

        if self.auto_confirm.load(Ordering::SeqCst) {
            self.emit(AuthChangeEvent::SignedIn, Some(session_for(identity.clone())));
        }
        Ok(identity)
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> study_session::Result<Session> {
        let identity = match self.accounts.lock().unwrap().get(email) {
            Some((expected, identity)) if expected == password => identity.clone(),
            _ => return Err(SessionError::InvalidCredentials),
        };

        let session = session_for(identity);
        self.emit(AuthChangeEvent::SignedIn, Some(session.clone()));
        Ok(session)
    }

    async fn sign_out(&self) -> study_session::Result<()> {
        self.sign_out_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_sign_out.load(Ordering::SeqCst) {
            return Err(SessionError::Auth("network unreachable".into()));
        }
        self.emit(AuthChangeEvent::SignedOut, None);
        Ok(())
    }

    async fn get_user(&self) -> study_session::Result<Option<Identity>> {
        self.get_user_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.current_session().map(|s| s.user))
    }
}

// ─── Recording Profile Store ─────────────────────────────────

/// Store call, recorded in order.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreCall {
    Fetch(String),
    Insert(ProfileRow),
    Update(String, ProfilePatch),
}

/// In-memory profile store that records calls and can fail on demand.
pub struct RecordingStore {
    pub inner: MemoryProfileStore,
    calls: Mutex<Vec<StoreCall>>,
    /// Per-fetch delays applied after the row is read (oldest first)
    fetch_delays: Mutex<VecDeque<Duration>>,
    pub fail_fetches: AtomicBool,
    pub fail_updates: AtomicBool,
    pub fail_inserts: AtomicBool,
}

#[allow(dead_code)]
impl RecordingStore {
    pub fn new() -> Arc<Self> {
        Self::with_rows(Vec::new())
    }

    pub fn with_rows(rows: Vec<ProfileRow>) -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryProfileStore::with_rows(rows),
            calls: Mutex::new(Vec::new()),
            fetch_delays: Mutex::new(VecDeque::new()),
            fail_fetches: AtomicBool::new(false),
            fail_updates: AtomicBool::new(false),
            fail_inserts: AtomicBool::new(false),
        })
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn inserts(&self) -> Vec<ProfileRow> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                StoreCall::Insert(row) => Some(row),
                _ => None,
            })
            .collect()
    }

    pub fn updates(&self) -> Vec<(String, ProfilePatch)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                StoreCall::Update(id, patch) => Some((id, patch)),
                _ => None,
            })
            .collect()
    }

    pub fn fetch_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, StoreCall::Fetch(_)))
            .count()
    }

    pub fn delay_next_fetch(&self, delay: Duration) {
        self.fetch_delays.lock().unwrap().push_back(delay);
    }

    fn record(&self, call: StoreCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl ProfileStore for RecordingStore {
    async fn fetch(&self, id: &str) -> study_session::Result<ProfileLookup> {
        self.record(StoreCall::Fetch(id.to_string()));
        if self.fail_fetches.load(Ordering::SeqCst) {
            return Err(SessionError::Database("HTTP 500: connection reset".into()));
        }

        let lookup = self.inner.fetch(id).await?;
        let delay = self.fetch_delays.lock().unwrap().pop_front();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(lookup)
    }

    async fn insert(&self, row: &ProfileRow) -> study_session::Result<()> {
        self.record(StoreCall::Insert(row.clone()));
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(SessionError::Database("HTTP 409: conflict".into()));
        }
        self.inner.insert(row).await
    }

    async fn update(&self, id: &str, patch: &ProfilePatch) -> study_session::Result<()> {
        self.record(StoreCall::Update(id.to_string(), patch.clone()));
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(SessionError::Database("HTTP 500: write failed".into()));
        }
        self.inner.update(id, patch).await
    }
}

/// Stored row with the given stats, as an existing learner would have.
#[allow(dead_code)]
pub fn existing_row(id: &str, correct: i64, wrong: i64, coins: i64) -> ProfileRow {
    ProfileRow {
        id: id.to_string(),
        email: Some(format!("{}@example.com", id)),
        name: Some("Asha".to_string()),
        class_level: Some(9),
        total_coins: Some(coins),
        money: Some(coins),
        total_correct: Some(correct),
        total_correct_answers: Some(correct),
        total_wrong: Some(wrong),
        avatar: Some(2),
        unlocked_chapters: Some(vec!["class9_ch1".to_string()]),
        diagnostic_completed: Some(true),
        ..Default::default()
    }
}
