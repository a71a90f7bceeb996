use mockall::predicate::eq;
use serde_json::json;
use std::time::Duration;

use super::memory::MemoryProvider;
use super::{AdminBootstrapper, BootstrapError, BootstrapOutcome, EnsureOptions, RetryPolicy};
use crate::provider::{
    Claims, IdentityProvider, MockIdentityProvider, ProviderError, UserRecord, ADMIN_CLAIM,
};

const EMAIL: &str = "admin@example.com";
const PASSWORD: &str = "correct-horse";

fn fast_options() -> EnsureOptions {
    EnsureOptions {
        retry: RetryPolicy {
            attempts: 3,
            base_delay: Duration::from_millis(1),
        },
        ..Default::default()
    }
}

fn claims(value: serde_json::Value) -> Claims {
    match value {
        serde_json::Value::Object(map) => map,
        other => panic!("expected an object, got {other}"),
    }
}

#[tokio::test]
async fn create_admin_user_on_fresh_store_sets_claim() {
    let provider = MemoryProvider::new();
    let bootstrapper = AdminBootstrapper::new(provider.clone());

    let user = bootstrapper.create_admin_user(EMAIL, PASSWORD).await.unwrap();

    assert!(user.is_admin());
    assert_eq!(user.email.as_deref(), Some(EMAIL));
    assert_eq!(provider.user_count(), 1);
}

#[tokio::test]
async fn create_admin_user_duplicate_makes_no_claim_call() {
    let mut provider = MockIdentityProvider::new();
    provider
        .expect_create_user()
        .with(eq(EMAIL), eq(PASSWORD))
        .times(1)
        .returning(|email, _| Err(ProviderError::DuplicateUser(email.to_string())));
    provider.expect_set_custom_claims().never();

    let err = AdminBootstrapper::new(provider)
        .create_admin_user(EMAIL, PASSWORD)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        BootstrapError::Provider(ProviderError::DuplicateUser(_))
    ));
}

#[tokio::test]
async fn verify_unknown_uid_is_not_found() {
    let bootstrapper = AdminBootstrapper::new(MemoryProvider::new());

    let err = bootstrapper.verify_admin_claim("no-such-uid").await.unwrap_err();

    assert!(matches!(
        err,
        BootstrapError::Provider(ProviderError::UserNotFound(uid)) if uid == "no-such-uid"
    ));
}

#[tokio::test]
async fn claim_is_readable_right_after_creation() {
    let bootstrapper = AdminBootstrapper::new(MemoryProvider::new());

    let user = bootstrapper.create_admin_user(EMAIL, PASSWORD).await.unwrap();
    let snapshot = bootstrapper.verify_admin_claim(&user.uid).await.unwrap();

    assert_eq!(snapshot.is_admin(), Some(true));
}

#[tokio::test]
async fn malformed_email_never_reaches_provider() {
    let provider = MemoryProvider::new();
    let bootstrapper = AdminBootstrapper::new(provider.clone());

    let err = bootstrapper
        .create_admin_user("not-an-email", PASSWORD)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        BootstrapError::Provider(ProviderError::InvalidCredential(_))
    ));
    assert_eq!(provider.create_calls(), 0);
}

#[tokio::test]
async fn short_password_is_invalid_credential() {
    let provider = MemoryProvider::new();
    let err = AdminBootstrapper::new(provider.clone())
        .create_admin_user(EMAIL, "12345")
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        BootstrapError::Provider(ProviderError::InvalidCredential(_))
    ));
    assert_eq!(provider.create_calls(), 0);
}

#[tokio::test]
async fn claim_fault_leaves_non_admin_user_behind() {
    let provider = MemoryProvider::new();
    provider.fail_claims(1);
    let bootstrapper = AdminBootstrapper::new(provider.clone());

    let err = bootstrapper
        .create_admin_user(EMAIL, PASSWORD)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        BootstrapError::Provider(ProviderError::ProviderUnavailable(_))
    ));
    assert_eq!(provider.claim_calls(), 1);

    let orphan = provider.get_user_by_email(EMAIL).await.unwrap();
    let snapshot = bootstrapper.verify_admin_claim(&orphan.uid).await.unwrap();
    assert_eq!(snapshot.is_admin(), None);
}

#[tokio::test]
async fn ensure_creates_and_verifies() {
    let provider = MemoryProvider::new();
    let bootstrapper = AdminBootstrapper::new(provider.clone());

    let (user, outcome) = bootstrapper
        .ensure_admin_user(EMAIL, PASSWORD, &fast_options())
        .await
        .unwrap();

    assert_eq!(outcome, BootstrapOutcome::Created);
    assert!(user.is_admin());
    assert_eq!(provider.user_count(), 1);
}

#[tokio::test]
async fn ensure_promotes_existing_user_and_keeps_other_claims() {
    let provider = MemoryProvider::new();
    let uid = provider.insert(EMAIL, claims(json!({ "tier": "gold" })));
    let bootstrapper = AdminBootstrapper::new(provider.clone());

    let (user, outcome) = bootstrapper
        .ensure_admin_user(EMAIL, PASSWORD, &fast_options())
        .await
        .unwrap();

    assert_eq!(outcome, BootstrapOutcome::Promoted);
    assert_eq!(user.uid, uid);
    let snapshot = bootstrapper.verify_admin_claim(&uid).await.unwrap();
    assert_eq!(snapshot.is_admin(), Some(true));
    assert_eq!(snapshot.claims()["tier"], "gold");
}

#[tokio::test]
async fn ensure_leaves_existing_admin_untouched() {
    let provider = MemoryProvider::new();
    provider.insert(EMAIL, claims(json!({ "isAdmin": true })));
    let bootstrapper = AdminBootstrapper::new(provider.clone());

    let (_, outcome) = bootstrapper
        .ensure_admin_user(EMAIL, PASSWORD, &fast_options())
        .await
        .unwrap();

    assert_eq!(outcome, BootstrapOutcome::AlreadyAdmin);
    assert_eq!(provider.claim_calls(), 0);
}

#[tokio::test]
async fn ensure_retries_transient_claim_failures() {
    let provider = MemoryProvider::new();
    provider.fail_claims(2);
    let bootstrapper = AdminBootstrapper::new(provider.clone());

    let (user, outcome) = bootstrapper
        .ensure_admin_user(EMAIL, PASSWORD, &fast_options())
        .await
        .unwrap();

    assert_eq!(outcome, BootstrapOutcome::Created);
    assert!(user.is_admin());
    assert_eq!(provider.claim_calls(), 3);
}

#[tokio::test]
async fn ensure_deletes_created_user_when_retries_run_out() {
    let provider = MemoryProvider::new();
    provider.fail_claims(3);
    let bootstrapper = AdminBootstrapper::new(provider.clone());

    let err = bootstrapper
        .ensure_admin_user(EMAIL, PASSWORD, &fast_options())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        BootstrapError::Provider(ProviderError::ProviderUnavailable(_))
    ));
    assert_eq!(provider.claim_calls(), 3);
    assert_eq!(provider.user_count(), 0);
}

#[tokio::test]
async fn ensure_without_rollback_keeps_created_user() {
    let provider = MemoryProvider::new();
    provider.fail_claims(1);
    let options = EnsureOptions {
        retry: RetryPolicy {
            attempts: 1,
            base_delay: Duration::from_millis(1),
        },
        rollback: false,
        verify: true,
    };

    AdminBootstrapper::new(provider.clone())
        .ensure_admin_user(EMAIL, PASSWORD, &options)
        .await
        .unwrap_err();

    assert_eq!(provider.user_count(), 1);
}

#[tokio::test]
async fn ensure_never_deletes_a_pre_existing_user() {
    let mut provider = MockIdentityProvider::new();
    provider
        .expect_create_user()
        .returning(|email, _| Err(ProviderError::DuplicateUser(email.to_string())));
    provider.expect_get_user_by_email().returning(|email| {
        Ok(UserRecord {
            uid: "uid-old".to_string(),
            email: Some(email.to_string()),
            custom_claims: Claims::new(),
        })
    });
    provider
        .expect_set_custom_claims()
        .times(1)
        .returning(|_, _| Err(ProviderError::InvalidClaims("CLAIMS_TOO_LARGE".to_string())));
    provider.expect_delete_user().never();

    let err = AdminBootstrapper::new(provider)
        .ensure_admin_user(EMAIL, PASSWORD, &fast_options())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        BootstrapError::Provider(ProviderError::InvalidClaims(_))
    ));
}

#[tokio::test]
async fn ensure_reports_claim_failure_even_when_cleanup_fails() {
    let mut provider = MockIdentityProvider::new();
    provider.expect_create_user().times(1).returning(|email, _| {
        Ok(UserRecord {
            uid: "uid-1".to_string(),
            email: Some(email.to_string()),
            custom_claims: Claims::new(),
        })
    });
    provider
        .expect_set_custom_claims()
        .times(1)
        .returning(|_, _| Err(ProviderError::InvalidClaims("CLAIMS_TOO_LARGE".to_string())));
    provider
        .expect_delete_user()
        .with(eq("uid-1"))
        .times(1)
        .returning(|_| Err(ProviderError::ProviderUnavailable("503".to_string())));

    let err = AdminBootstrapper::new(provider)
        .ensure_admin_user(EMAIL, PASSWORD, &fast_options())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        BootstrapError::Provider(ProviderError::InvalidClaims(_))
    ));
}

#[tokio::test]
async fn ensure_reports_claim_missing_on_read_back() {
    let mut provider = MockIdentityProvider::new();
    provider.expect_create_user().returning(|email, _| {
        Ok(UserRecord {
            uid: "uid-1".to_string(),
            email: Some(email.to_string()),
            custom_claims: Claims::new(),
        })
    });
    provider
        .expect_set_custom_claims()
        .withf(|uid, claims| uid == "uid-1" && claims.get(ADMIN_CLAIM) == Some(&json!(true)))
        .returning(|_, _| Ok(()));
    provider.expect_get_user().with(eq("uid-1")).returning(|uid| {
        Ok(UserRecord {
            uid: uid.to_string(),
            email: Some(EMAIL.to_string()),
            custom_claims: Claims::new(),
        })
    });

    let err = AdminBootstrapper::new(provider)
        .ensure_admin_user(EMAIL, PASSWORD, &fast_options())
        .await
        .unwrap_err();

    assert!(matches!(err, BootstrapError::ClaimNotApplied { uid } if uid == "uid-1"));
}
