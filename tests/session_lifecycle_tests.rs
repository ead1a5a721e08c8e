// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Session startup, identity change notifications and sign in/out.

use std::sync::atomic::Ordering;
use study_session::models::AuthChangeEvent;
use study_session::SessionError;

mod common;
use common::{
    existing_row, identity, session_for, start_manager, wait_for_state, FakeAuth, RecordingStore,
};

#[tokio::test]
async fn test_startup_without_session() {
    let auth = FakeAuth::new();
    let store = RecordingStore::new();

    let manager = start_manager(&auth, &store).await;

    let snapshot = manager.snapshot();
    assert!(!snapshot.loading);
    assert!(snapshot.identity.is_none());
    assert!(snapshot.profile.is_none());
    assert!(store.calls().is_empty(), "No profile lookup without identity");
}

#[tokio::test]
async fn test_startup_with_session_loads_profile() {
    let auth = FakeAuth::signed_in(identity("u1", Some("Asha")));
    let store = RecordingStore::with_rows(vec![existing_row("u1", 5, 3, 50)]);

    let manager = start_manager(&auth, &store).await;

    assert!(!manager.is_loading());
    assert_eq!(manager.user().unwrap().id, "u1");
    let profile = manager.profile().expect("profile should be cached");
    assert_eq!(profile.total_coins, 50);
    assert_eq!(profile.total_correct, 5);
    assert_eq!(profile.display_name(), "Asha");
    assert!(store.inserts().is_empty());
}

#[tokio::test]
async fn test_startup_finishes_when_profile_fetch_fails() {
    let auth = FakeAuth::signed_in(identity("u1", None));
    let store = RecordingStore::new();
    store.fail_fetches.store(true, Ordering::SeqCst);

    let manager = start_manager(&auth, &store).await;

    assert!(!manager.is_loading());
    assert!(manager.user().is_some());
    assert!(manager.profile().is_none());
}

#[tokio::test]
async fn test_startup_with_invalid_refresh_token_signs_out() {
    let auth = FakeAuth::signed_in(identity("u1", None));
    auth.refresh_invalid.store(true, Ordering::SeqCst);
    let store = RecordingStore::new();

    let manager = start_manager(&auth, &store).await;

    let snapshot = manager.snapshot();
    assert!(!snapshot.loading);
    assert!(snapshot.identity.is_none());
    assert!(snapshot.profile.is_none());
    assert!(store.calls().is_empty());
}

#[tokio::test]
async fn test_startup_with_other_session_error_still_finishes() {
    let auth = FakeAuth::new();
    auth.session_unavailable.store(true, Ordering::SeqCst);
    let store = RecordingStore::new();

    let manager = start_manager(&auth, &store).await;

    assert!(!manager.is_loading());
    assert!(manager.user().is_none());
}

#[tokio::test]
async fn test_sign_in_resolves_profile_through_notification() {
    let auth = FakeAuth::new();
    auth.register("u1@example.com", "hunter22", identity("u1", Some("Asha")));
    let store = RecordingStore::with_rows(vec![existing_row("u1", 1, 2, 30)]);
    let manager = start_manager(&auth, &store).await;

    manager.sign_in("u1@example.com", "hunter22").await.unwrap();

    let snapshot = wait_for_state(&manager, |s| s.profile.is_some()).await;
    assert_eq!(snapshot.identity.unwrap().id, "u1");
    assert_eq!(snapshot.profile.unwrap().total_coins, 30);
}

#[tokio::test]
async fn test_sign_in_with_wrong_password_fails() {
    let auth = FakeAuth::new();
    auth.register("u1@example.com", "hunter22", identity("u1", None));
    let store = RecordingStore::new();
    let manager = start_manager(&auth, &store).await;

    let err = manager
        .sign_in("u1@example.com", "wrong")
        .await
        .unwrap_err();

    assert!(matches!(err, SessionError::InvalidCredentials));
    assert!(manager.user().is_none());
}

#[tokio::test]
async fn test_sign_out_clears_state() {
    let auth = FakeAuth::signed_in(identity("u1", None));
    let store = RecordingStore::with_rows(vec![existing_row("u1", 0, 0, 10)]);
    let manager = start_manager(&auth, &store).await;
    assert!(manager.profile().is_some());

    manager.sign_out().await;

    assert!(manager.user().is_none());
    assert!(manager.profile().is_none());
    assert_eq!(auth.sign_out_calls.load(Ordering::SeqCst), 1);
    assert!(auth.current_session().is_none());
}

#[tokio::test]
async fn test_sign_out_clears_state_when_remote_fails() {
    let auth = FakeAuth::signed_in(identity("u1", None));
    auth.fail_sign_out.store(true, Ordering::SeqCst);
    let store = RecordingStore::with_rows(vec![existing_row("u1", 0, 0, 10)]);
    let manager = start_manager(&auth, &store).await;

    manager.sign_out().await;

    assert_eq!(auth.sign_out_calls.load(Ordering::SeqCst), 1);
    assert!(auth.current_session().is_some(), "Remote session untouched");
    assert!(manager.user().is_none());
    assert!(manager.profile().is_none());
}

#[tokio::test]
async fn test_sign_out_without_session_skips_remote_call() {
    let auth = FakeAuth::new();
    let store = RecordingStore::new();
    let manager = start_manager(&auth, &store).await;

    manager.sign_out().await;

    assert_eq!(auth.sign_out_calls.load(Ordering::SeqCst), 0);
    assert!(manager.user().is_none());
}

#[tokio::test]
async fn test_external_sign_out_notification_clears_state() {
    let auth = FakeAuth::signed_in(identity("u1", None));
    let store = RecordingStore::with_rows(vec![existing_row("u1", 0, 0, 10)]);
    let manager = start_manager(&auth, &store).await;

    auth.emit(AuthChangeEvent::SignedOut, None);

    let snapshot = wait_for_state(&manager, |s| s.identity.is_none()).await;
    assert!(snapshot.profile.is_none());
}

#[tokio::test]
async fn test_identity_switch_replaces_profile() {
    let auth = FakeAuth::signed_in(identity("u1", None));
    let store = RecordingStore::with_rows(vec![
        existing_row("u1", 0, 0, 10),
        existing_row("u2", 0, 0, 20),
    ]);
    let manager = start_manager(&auth, &store).await;
    assert_eq!(manager.profile().unwrap().id, "u1");

    auth.emit(
        AuthChangeEvent::SignedIn,
        Some(session_for(identity("u2", None))),
    );

    let snapshot =
        wait_for_state(&manager, |s| s.profile.as_ref().map(|p| p.id.as_str()) == Some("u2"))
            .await;
    assert_eq!(snapshot.identity.unwrap().id, "u2");
    assert_eq!(snapshot.profile.unwrap().total_coins, 20);
}

#[tokio::test]
async fn test_shutdown_stops_following_notifications() {
    let auth = FakeAuth::new();
    let store = RecordingStore::with_rows(vec![existing_row("u1", 0, 0, 10)]);
    let manager = start_manager(&auth, &store).await;

    manager.shutdown();
    auth.emit(
        AuthChangeEvent::SignedIn,
        Some(session_for(identity("u1", None))),
    );
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    assert!(manager.user().is_none());
    assert!(store.calls().is_empty());
}

#[tokio::test]
async fn test_shutdown_releases_subscription() {
    let auth = FakeAuth::new();
    let store = RecordingStore::new();
    let manager = start_manager(&auth, &store).await;
    assert_eq!(auth.subscriber_count(), 1);

    manager.shutdown();

    tokio::time::timeout(common::STATE_TIMEOUT, async {
        while auth.subscriber_count() > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("subscription should be released");
}
