use super::*;
use crate::provider::UserMetadata;

fn demo_user() -> User {
    User { id: "demo-123".into(), email: "demo@example.com".into(), display_name: Some("Demo User".into()), avatar_url: None }
}

// =============================================================================
// User serialization
// =============================================================================

#[test]
fn user_serializes_camel_case_and_omits_absent_fields() {
    let json = serde_json::to_value(demo_user()).unwrap();
    assert_eq!(json, serde_json::json!({ "id": "demo-123", "email": "demo@example.com", "fullName": "Demo User" }));
}

#[test]
fn user_reads_record_written_by_browser_client() {
    let raw = r#"{"id":"demo-1700000000000","email":"a@b.c","fullName":"A","avatarUrl":"https://x/y.png"}"#;
    let user: User = serde_json::from_str(raw).unwrap();
    assert_eq!(user.display_name.as_deref(), Some("A"));
    assert_eq!(user.avatar_url.as_deref(), Some("https://x/y.png"));
}

#[test]
fn user_from_provider_user_maps_metadata() {
    let provider = ProviderUser {
        id: "u1".into(),
        email: Some("ada@example.com".into()),
        user_metadata: Some(UserMetadata { full_name: Some("Ada".into()), avatar_url: Some("https://a/b".into()) }),
    };
    let user = User::from(&provider);
    assert_eq!(user.id, "u1");
    assert_eq!(user.email, "ada@example.com");
    assert_eq!(user.display_name.as_deref(), Some("Ada"));
    assert_eq!(user.avatar_url.as_deref(), Some("https://a/b"));
}

#[test]
fn user_from_provider_user_without_email_or_metadata() {
    let provider = ProviderUser { id: "u2".into(), email: None, user_metadata: None };
    let user = User::from(&provider);
    assert_eq!(user.email, "");
    assert!(user.display_name.is_none());
}

// =============================================================================
// SessionState
// =============================================================================

#[test]
fn session_state_starts_loading_and_signed_out() {
    let state = SessionState::default();
    assert!(state.loading);
    assert!(state.user.is_none());
    assert!(!state.is_authenticated());
}

#[test]
fn is_authenticated_tracks_user_presence() {
    let mut state = SessionState { user: Some(demo_user()), loading: false };
    assert!(state.is_authenticated());
    state.loading = true;
    assert!(state.is_authenticated());
    state.user = None;
    assert!(!state.is_authenticated());
}

// =============================================================================
// AuthError / AuthFailure
// =============================================================================

#[test]
fn provider_rejection_becomes_invalid_credentials() {
    let err = AuthError::from(ProviderError::Rejected { status: 400, message: "Invalid login credentials".into() });
    assert!(matches!(err, AuthError::InvalidCredentials(ref m) if m == "Invalid login credentials"));
    assert_eq!(err.error_code(), "E_INVALID_CREDENTIALS");
}

#[test]
fn provider_transport_error_stays_provider_error() {
    let err = AuthError::from(ProviderError::Request("connection refused".into()));
    assert!(matches!(err, AuthError::Provider(_)));
    assert!(err.retryable());
}

#[test]
fn normalize_keeps_credential_message() {
    let failure = AuthFailure::normalize(AuthOperation::Login, AuthError::InvalidCredentials("nope".into()));
    assert_eq!(failure.kind, AuthFailureKind::InvalidCredentials);
    assert_eq!(failure.message, "nope");
    assert_eq!(failure.to_string(), "nope");
}

#[test]
fn normalize_provider_unavailable() {
    let failure = AuthFailure::normalize(AuthOperation::Signup, AuthError::ProviderUnavailable);
    assert_eq!(failure.kind, AuthFailureKind::ProviderUnavailable);
    assert_eq!(failure.message, "identity provider not available");
}

#[test]
fn normalize_unexpected_errors_to_generic_messages() {
    let login = AuthFailure::normalize(AuthOperation::Login, AuthError::Provider(ProviderError::Parse("eof".into())));
    assert_eq!(login.kind, AuthFailureKind::Unknown);
    assert_eq!(login.message, "Login failed");

    let signup = AuthFailure::normalize(AuthOperation::Signup, AuthError::Storage(StorageError::Poisoned));
    assert_eq!(signup.kind, AuthFailureKind::Unknown);
    assert_eq!(signup.message, "Signup failed");
}

#[test]
fn normalize_keeps_provider_api_message() {
    let err = AuthError::from(ProviderError::Api { status: 429, message: "email rate limit exceeded".into() });
    let failure = AuthFailure::normalize(AuthOperation::Signup, err);
    assert_eq!(failure.kind, AuthFailureKind::Unknown);
    assert_eq!(failure.message, "email rate limit exceeded");

    let err = AuthError::from(ProviderError::Api { status: 503, message: "database unavailable".into() });
    assert_eq!(AuthFailure::normalize(AuthOperation::Login, err).message, "database unavailable");
}

#[test]
fn normalize_transport_errors_to_generic_message() {
    let err = AuthError::from(ProviderError::Request("connection refused".into()));
    let failure = AuthFailure::normalize(AuthOperation::Login, err);
    assert_eq!(failure, AuthFailure { kind: AuthFailureKind::Unknown, message: "Login failed".into() });
}
