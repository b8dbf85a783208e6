mod common;

use aurora_authgate::{
    clock::Clock, db::account::AccountStatus, GateError, UnauthorizedReason,
};
use chrono::Duration;
use common::{settle, sign, Harness, AUDIENCE, SECRET};
use std::sync::Arc;

fn reason(err: GateError) -> UnauthorizedReason {
    err.unauthorized_reason()
        .unwrap_or_else(|| panic!("expected an unauthorized rejection, got {:?}", err))
}

#[tokio::test]
async fn test_second_request_is_served_from_combined_tier() {
    let h = Harness::new();
    let token = h.token("pub-1", Some("s1"));

    let principal = h.auth.authenticate(&token).await.unwrap();
    assert_eq!(principal.public_id, "pub-1");
    assert_eq!(principal.session_id, "s1");
    assert_eq!(principal.account_id, "a1");
    settle().await;

    assert_eq!(
        h.cache.live_keys(),
        vec![
            "account:snapshot:pub-1".to_string(),
            "session:combined:s1".to_string(),
            "session:valid:s1".to_string(),
        ]
    );

    h.clock.advance(Duration::seconds(20));
    let again = h.auth.authenticate(&token).await.unwrap();
    assert_eq!(again, principal);
    assert_eq!(h.store.session_lookups(), 1);
}

#[tokio::test]
async fn test_invalidated_session_rejects_immediately() {
    let h = Harness::new();
    let token = h.token("pub-1", Some("s1"));
    h.auth.authenticate(&token).await.unwrap();
    settle().await;

    h.auth.invalidate_session("s1").await.unwrap();

    let err = h.auth.authenticate(&token).await.unwrap_err();
    assert_eq!(reason(err), UnauthorizedReason::SessionInvalid);
}

#[tokio::test]
async fn test_logout_wins_over_pending_write_back() {
    let h = Harness::new();
    let token = h.token("pub-1", Some("s1"));
    h.auth.authenticate(&token).await.unwrap();

    // The first request's cache writes are still queued here
    h.store.revoke_session("s1");
    h.auth.invalidate_session("s1").await.unwrap();
    settle().await;

    let err = h.auth.authenticate(&token).await.unwrap_err();
    assert_eq!(reason(err), UnauthorizedReason::SessionInvalid);
    assert!(!h
        .cache
        .live_keys()
        .contains(&"session:combined:s1".to_string()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_logouts_never_leave_sessions_valid() {
    let h = Arc::new(Harness::new());

    let mut tasks = Vec::new();
    for i in 0..16 {
        let session_id = format!("race-{}", i);
        h.add_session(&session_id, "a1");
        let h = Arc::clone(&h);
        tasks.push(tokio::spawn(async move {
            let token = h.token("pub-1", Some(&session_id));
            h.auth.authenticate(&token).await.unwrap();
            h.store.revoke_session(&session_id);
            h.auth.invalidate_session(&session_id).await.unwrap();
            (session_id, token)
        }));
    }

    for task in tasks {
        let (session_id, token) = task.await.unwrap();
        let err = h.auth.authenticate(&token).await.unwrap_err();
        assert_eq!(
            reason(err),
            UnauthorizedReason::SessionInvalid,
            "session {}",
            session_id
        );
    }
}

#[tokio::test]
async fn test_invalidate_session_without_warm_cache() {
    let h = Harness::new();
    let token = h.token("pub-1", Some("s1"));

    h.auth.invalidate_session("s1").await.unwrap();

    assert!(h.auth.authenticate(&token).await.is_err());
    assert_eq!(h.store.session_lookups(), 0);
}

#[tokio::test]
async fn test_cached_validity_goes_stale_after_sixty_seconds() {
    let h = Harness::new();
    let token = h.token("pub-1", Some("s1"));
    h.auth.authenticate(&token).await.unwrap();
    settle().await;

    // Revoked behind the cache's back
    h.store.revoke_session("s1");

    h.clock.advance(Duration::seconds(59));
    assert!(h.auth.authenticate(&token).await.is_ok());

    h.clock.advance(Duration::seconds(1));
    let err = h.auth.authenticate(&token).await.unwrap_err();
    assert_eq!(reason(err), UnauthorizedReason::SessionRevoked);
    assert_eq!(h.store.session_lookups(), 2);
}

#[tokio::test]
async fn test_revocation_is_cached_as_negative() {
    let h = Harness::new();
    h.store.revoke_session("s1");
    let token = h.token("pub-1", Some("s1"));

    let err = h.auth.authenticate(&token).await.unwrap_err();
    assert_eq!(reason(err), UnauthorizedReason::SessionRevoked);
    settle().await;

    let err = h.auth.authenticate(&token).await.unwrap_err();
    assert_eq!(reason(err), UnauthorizedReason::SessionInvalid);
    assert_eq!(h.store.session_lookups(), 1);
}

#[tokio::test]
async fn test_force_logout_rejects_tokens_issued_before_marker() {
    let h = Harness::new();
    let token = h.token("pub-1", Some("s1"));

    let marker = h.clock.now() + Duration::minutes(1);
    h.store
        .update_account("a1", |a| a.security.force_logout_at = Some(marker));

    let err = h.auth.authenticate(&token).await.unwrap_err();
    assert_eq!(reason(err), UnauthorizedReason::InvalidatedBySecurityAction);

    // A token issued after the marker on the same session is fine
    let fresh = h.token_issued_at("pub-1", Some("s1"), marker + Duration::seconds(1));
    assert!(h.auth.authenticate(&fresh).await.is_ok());
}

#[tokio::test]
async fn test_force_logout_reaches_cached_sessions_after_invalidate_all() {
    let h = Harness::new();
    h.add_session("s2", "a1");
    let token = h.token("pub-1", Some("s2"));
    h.auth.authenticate(&token).await.unwrap();
    settle().await;

    let marker = h.clock.now() + Duration::minutes(1);
    h.store
        .update_account("a1", |a| a.security.force_logout_at = Some(marker));
    h.auth
        .invalidate_all("pub-1", &["s1".to_string(), "s2".to_string()])
        .await
        .unwrap();

    assert!(h.auth.authenticate(&token).await.is_err());
}

#[tokio::test]
async fn test_subject_mismatch_writes_nothing_to_cache() {
    let h = Harness::new();
    h.add_account("a2", "pub-2");
    let token = h.token("pub-2", Some("s1"));

    let err = h.auth.authenticate(&token).await.unwrap_err();
    assert_eq!(reason(err), UnauthorizedReason::SubjectMismatch);
    settle().await;

    assert_eq!(h.cache.writes(), 0);
    assert!(h.cache.live_keys().is_empty());
    assert_eq!(h.store.activity_updates(), 0);
}

#[tokio::test]
async fn test_suspended_account_passes_session_layer_but_not_gate() {
    let h = Harness::new();
    h.store
        .update_account("a1", |a| a.status = AccountStatus::Suspended);
    let token = h.token("pub-1", Some("s1"));

    let (_, snapshot) = h.auth.resolve_session(&token).await.unwrap();
    assert_eq!(snapshot.status, AccountStatus::Suspended);

    let checked = h.auth.gate().check(&snapshot, h.clock.now());
    assert!(matches!(checked, Err(GateError::Forbidden(ref msg)) if msg == "account suspended"));

    let err = h.auth.authenticate(&token).await.unwrap_err();
    assert!(matches!(err, GateError::Forbidden(_)));
    assert!(!err.is_authentication_failure());
}

#[tokio::test]
async fn test_token_without_session_binding() {
    let h = Harness::new();
    let token = h.token("pub-1", None);

    let err = h.auth.authenticate(&token).await.unwrap_err();
    assert_eq!(reason(err), UnauthorizedReason::NoSessionBinding);
    assert_eq!(h.store.session_lookups(), 0);
}

#[tokio::test]
async fn test_unknown_and_expired_sessions() {
    let h = Harness::new();

    let err = h
        .auth
        .authenticate(&h.token("pub-1", Some("missing")))
        .await
        .unwrap_err();
    assert_eq!(reason(err), UnauthorizedReason::SessionNotFound);

    h.clock.advance(Duration::days(8));
    let err = h
        .auth
        .authenticate(&h.token("pub-1", Some("s1")))
        .await
        .unwrap_err();
    assert_eq!(reason(err), UnauthorizedReason::SessionExpired);
}

#[tokio::test]
async fn test_bad_credentials_are_invalid_tokens() {
    let h = Harness::new();

    let err = h.auth.authenticate("not-a-jwt").await.unwrap_err();
    assert!(matches!(err, GateError::InvalidToken(_)));

    let mut claims = aurora_authgate::token::WireClaims {
        sub: "pub-1".into(),
        email: "a1@example.com".into(),
        role: "user".into(),
        sid: Some("s1".into()),
        iat: h.clock.now().timestamp(),
        exp: (chrono::Utc::now() + Duration::hours(1)).timestamp(),
        iss: "https://someone-else.example.com".into(),
        aud: AUDIENCE.into(),
    };
    let err = h.auth.authenticate(&sign(&claims, SECRET)).await.unwrap_err();
    assert!(matches!(err, GateError::InvalidToken(_)));

    claims.iss = common::ISSUER.into();
    let forged = sign(&claims, "a-different-secret-of-sufficient-length");
    let err = h.auth.authenticate(&forged).await.unwrap_err();
    assert!(matches!(err, GateError::InvalidToken(_)));

    assert_eq!(h.store.session_lookups(), 0);
}

#[tokio::test]
async fn test_optional_authentication_never_fails() {
    let h = Harness::new();

    assert!(h.auth.authenticate_optional(None).await.is_none());
    assert!(h.auth.authenticate_optional(Some("")).await.is_none());
    assert!(h.auth.authenticate_optional(Some("garbage")).await.is_none());

    h.add_account("a2", "pub-2");
    let mismatched = h.token("pub-2", Some("s1"));
    assert!(h.auth.authenticate_optional(Some(&mismatched)).await.is_none());

    let token = h.token("pub-1", Some("s1"));
    let principal = h.auth.authenticate_optional(Some(&token)).await.unwrap();
    assert_eq!(principal.public_id, "pub-1");
}

#[tokio::test]
async fn test_unreachable_cache_falls_back_to_store() {
    let h = Harness::new();
    h.cache.set_failing(true);
    let token = h.token("pub-1", Some("s1"));

    assert!(h.auth.authenticate(&token).await.is_ok());
    settle().await;
    assert!(h.auth.authenticate(&token).await.is_ok());
    assert_eq!(h.store.session_lookups(), 2);

    assert!(matches!(
        h.auth.invalidate_session("s1").await,
        Err(GateError::Cache(_))
    ));
}

#[tokio::test]
async fn test_store_failure_rejects_instead_of_allowing() {
    let h = Harness::new();
    h.store.set_failing(true);
    let token = h.token("pub-1", Some("s1"));

    let err = h.auth.authenticate(&token).await.unwrap_err();
    assert_eq!(reason(err), UnauthorizedReason::ValidationError);
    assert_eq!(err_message(&h, &token).await, "Unauthorized: validation error");
}

async fn err_message(h: &Harness, token: &str) -> String {
    h.auth.authenticate(token).await.unwrap_err().to_string()
}

#[tokio::test]
async fn test_store_only_mode_matches_cached_decisions() {
    let h = Harness::store_only();
    assert!(!h.auth.has_cache());
    let token = h.token("pub-1", Some("s1"));

    assert!(h.auth.authenticate(&token).await.is_ok());
    assert!(h.auth.authenticate(&token).await.is_ok());
    assert_eq!(h.store.session_lookups(), 2);
    assert_eq!(h.cache.writes(), 0);

    h.auth.invalidate_session("s1").await.unwrap();
    h.store.revoke_session("s1");
    let err = h.auth.authenticate(&token).await.unwrap_err();
    assert_eq!(reason(err), UnauthorizedReason::SessionRevoked);
}

#[tokio::test]
async fn test_activity_is_recorded_once_per_debounce_window() {
    let h = Harness::new();
    let token = h.token("pub-1", Some("s1"));

    h.auth.authenticate(&token).await.unwrap();
    h.clock.advance(Duration::seconds(30));
    h.auth.authenticate(&token).await.unwrap();
    settle().await;
    assert_eq!(h.store.activity_updates(), 1);

    h.clock.advance(Duration::seconds(31));
    h.auth.authenticate(&token).await.unwrap();
    settle().await;
    assert_eq!(h.store.activity_updates(), 2);
    assert_eq!(h.store.session("s1").unwrap().last_active_at, h.clock.now());
}

#[tokio::test]
async fn test_invalidate_account_drops_only_the_snapshot() {
    let h = Harness::new();
    let token = h.token("pub-1", Some("s1"));
    h.auth.authenticate(&token).await.unwrap();
    settle().await;

    h.auth.invalidate_account("pub-1").await.unwrap();
    assert_eq!(
        h.cache.live_keys(),
        vec![
            "session:combined:s1".to_string(),
            "session:valid:s1".to_string(),
        ]
    );

    // Combined tier still answers for the session
    assert!(h.auth.authenticate(&token).await.is_ok());
    assert_eq!(h.store.session_lookups(), 1);
}
