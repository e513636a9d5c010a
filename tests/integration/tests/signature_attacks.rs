//! Assertions that must be refused after decryption.

use reqwest::StatusCode;
use sp_integration_tests::{IdpMode, TestEnv};
use sp_protocol_saml::session::{SessionStore, AUTHENTICATED, SUBJECT};
use sp_protocol_saml::ArtifactError;

const GOTO: &str = "https://app.example.com/dashboard";

async fn refused(mode: IdpMode) -> anyhow::Result<ArtifactError> {
    let env = TestEnv::new(mode).await?;
    let session = env.start_login(GOTO).await?;

    let response = env.deliver_artifact(&session, &TestEnv::artifact()).await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(env.sessions.get(&session, AUTHENTICATED).await?, None);
    assert_eq!(env.sessions.get(&session, SUBJECT).await?, None);

    Ok(env
        .consumer
        .consume(Some(&TestEnv::artifact()), &session)
        .await
        .unwrap_err())
}

/// Tests that content modified after signing fails verification.
#[tokio::test]
async fn test_tampered_assertion_is_invalid_signature() -> anyhow::Result<()> {
    let err = refused(IdpMode::Tampered).await?;
    assert!(matches!(err, ArtifactError::InvalidSignature(_)), "{err}");
    Ok(())
}

/// Tests that a signature by an untrusted key fails verification.
#[tokio::test]
async fn test_untrusted_signer_is_invalid_signature() -> anyhow::Result<()> {
    let err = refused(IdpMode::UntrustedSigner).await?;
    assert!(matches!(err, ArtifactError::InvalidSignature(_)), "{err}");
    Ok(())
}

/// Tests that a duplicated signed ID is caught before any cryptography.
#[tokio::test]
async fn test_wrapped_assertion_is_profile_violation() -> anyhow::Result<()> {
    let err = refused(IdpMode::Wrapped).await?;
    assert!(matches!(err, ArtifactError::SignatureProfile(_)), "{err}");
    Ok(())
}
