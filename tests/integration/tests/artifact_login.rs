//! Artifact binding login flows against the mock IdP.

use std::time::Duration;

use reqwest::{header, StatusCode};
use sp_integration_tests::{issued_session, IdpMode, TestEnv, USER_EMAIL};
use sp_protocol_saml::session::{SessionStore, AUTHENTICATED, GOTO_URL, SUBJECT};
use sp_protocol_saml::types::authn_context;
use sp_protocol_saml::ArtifactError;

const GOTO: &str = "https://app.example.com/dashboard";

/// Tests the full login: goto stored, artifact resolved, session authenticated.
#[tokio::test]
async fn test_valid_artifact_logs_in_and_redirects() -> anyhow::Result<()> {
    let env = TestEnv::new(IdpMode::Valid).await?;

    let session = env.start_login(GOTO).await?;
    assert_eq!(
        env.sessions.get(&session, GOTO_URL).await?.as_deref(),
        Some(GOTO)
    );

    let artifact = TestEnv::artifact();
    let response = env.deliver_artifact(&session, &artifact).await?;

    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(response.headers()[header::LOCATION], GOTO);
    let authenticated = issued_session(&response)
        .ok_or_else(|| anyhow::anyhow!("login did not issue a new session"))?;
    assert_ne!(authenticated, session);
    assert_eq!(
        env.sessions.get(&authenticated, AUTHENTICATED).await?.as_deref(),
        Some("true")
    );
    assert_eq!(
        env.sessions.get(&authenticated, SUBJECT).await?.as_deref(),
        Some(USER_EMAIL)
    );
    assert_eq!(env.sessions.get(&session, AUTHENTICATED).await?, None);
    assert_eq!(env.resolved_artifacts(), vec![artifact]);
    Ok(())
}

/// Tests that an off-site goto is never stored.
#[tokio::test]
async fn test_foreign_goto_is_not_remembered() -> anyhow::Result<()> {
    let env = TestEnv::new(IdpMode::Valid).await?;

    let session = env.start_login("https://evil.example.net/phish").await?;
    assert_eq!(env.sessions.get(&session, GOTO_URL).await?, None);
    Ok(())
}

/// Tests that the claims released by the IdP reach the caller.
#[tokio::test]
async fn test_claims_carry_email_and_authn_context() -> anyhow::Result<()> {
    let env = TestEnv::new(IdpMode::Valid).await?;
    env.sessions.set("direct", GOTO_URL, GOTO).await?;

    let outcome = env
        .consumer
        .consume(Some(&TestEnv::artifact()), "direct")
        .await?;

    assert_eq!(outcome.redirect_url, GOTO);
    assert_eq!(
        outcome.claims.attribute("email"),
        Some(&[USER_EMAIL.to_string()][..])
    );
    assert_eq!(
        outcome.claims.authn_context_class_ref.as_deref(),
        Some(authn_context::PASSWORD_PROTECTED_TRANSPORT)
    );
    assert_eq!(outcome.claims.session_index.as_deref(), Some("_session1"));
    Ok(())
}

/// Tests that a slow IdP times out without touching the session.
#[tokio::test]
async fn test_soap_timeout_leaves_session_untouched() -> anyhow::Result<()> {
    let env = TestEnv::with_soap_timeout(
        IdpMode::Slow(Duration::from_secs(3)),
        Duration::from_millis(300),
    )
    .await?;
    let session = env.start_login(GOTO).await?;

    let response = env.deliver_artifact(&session, &TestEnv::artifact()).await?;

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert!(response.headers().get(header::LOCATION).is_none());
    assert_eq!(env.sessions.get(&session, AUTHENTICATED).await?, None);

    let err = env
        .consumer
        .consume(Some(&TestEnv::artifact()), &session)
        .await
        .unwrap_err();
    assert!(matches!(err, ArtifactError::Transport(_)), "{err}");
    Ok(())
}

/// Tests that a response without an encrypted assertion is refused.
#[tokio::test]
async fn test_response_without_assertion_is_refused() -> anyhow::Result<()> {
    let env = TestEnv::new(IdpMode::NoAssertion).await?;
    let session = env.start_login(GOTO).await?;

    let response = env.deliver_artifact(&session, &TestEnv::artifact()).await?;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(env.sessions.get(&session, AUTHENTICATED).await?, None);

    let err = env
        .consumer
        .consume(Some(&TestEnv::artifact()), &session)
        .await
        .unwrap_err();
    assert!(matches!(err, ArtifactError::MissingAssertion(_)), "{err}");
    Ok(())
}

/// Tests that an artifact from another issuer never reaches the IdP.
#[tokio::test]
async fn test_foreign_artifact_is_rejected_before_resolution() -> anyhow::Result<()> {
    let env = TestEnv::new(IdpMode::Valid).await?;
    let session = env.start_login(GOTO).await?;
    let foreign =
        sp_protocol_saml::types::Type4Artifact::new(0, "https://other-idp.example.com", [1; 20])
            .encode();

    let response = env.deliver_artifact(&session, &foreign).await?;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(env.resolved_artifacts().is_empty());
    assert_eq!(env.sessions.get(&session, AUTHENTICATED).await?, None);
    Ok(())
}

/// Tests that the error page does not disclose why the login failed.
#[tokio::test]
async fn test_error_page_is_generic() -> anyhow::Result<()> {
    let env = TestEnv::new(IdpMode::NoAssertion).await?;
    let session = env.start_login(GOTO).await?;

    let body = env
        .deliver_artifact(&session, &TestEnv::artifact())
        .await?
        .text()
        .await?;

    assert!(body.contains("Login failed"));
    assert!(!body.contains("EncryptedAssertion"));
    assert!(!body.contains("127.0.0.1"));
    Ok(())
}
