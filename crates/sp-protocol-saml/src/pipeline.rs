//! The artifact consumer pipeline.
//!
//! One call to [`ArtifactConsumer::consume`] runs the whole exchange for a
//! browser request:
//!
//! 1. validate the artifact
//! 2. build the `ArtifactResolve` request
//! 3. sign it with the SP key
//! 4. exchange it over SOAP with the IdP
//! 5. unwrap the first `EncryptedAssertion` from the `ArtifactResponse`
//! 6. decrypt it
//! 7. verify its signature against the IdP key, then its conditions
//! 8. extract claims, move the session to a fresh id and mark it
//!    authenticated
//!
//! The first failing stage ends the exchange. The session is only written
//! in the last stage, once everything else succeeded.

use std::sync::Arc;

use axum::http::HeaderValue;
use chrono::{DateTime, Duration, Utc};
use reqwest::Url;
use serde::Serialize;
use sp_crypto::generate_session_id;
use tracing::{debug, error, info, info_span, warn, Instrument, Span};

use crate::credentials::CredentialProvider;
use crate::encryption::AssertionDecrypter;
use crate::error::{ArtifactError, ArtifactResult};
use crate::session::{SessionStore, AUTHENTICATED, GOTO_URL, SUBJECT};
use crate::signature::{
    SignatureAlgorithm, SignatureProfileValidator, SignatureVerifier, VerifiedAssertion, XmlSigner,
};
use crate::soap::{SoapClient, SoapClientConfig, SoapTransport};
use crate::types::{Artifact, ArtifactResolve, ArtifactResponse};

/// Settings for [`ArtifactConsumer`].
#[derive(Debug, Clone)]
pub struct ArtifactConsumerConfig {
    /// This SP's entity ID, used as `Issuer` and expected audience.
    pub sp_entity_id: String,
    /// The IdP's entity ID.
    pub idp_entity_id: String,
    /// The IdP's artifact resolution service URL.
    pub artifact_resolution_url: String,
    /// Algorithm used to sign `ArtifactResolve`.
    pub signature_algorithm: SignatureAlgorithm,
    /// Accept SHA-1 signatures and digests from the IdP.
    pub allow_sha1: bool,
    /// Check `Conditions` after the signature.
    pub validate_conditions: bool,
    /// Tolerance applied to `NotBefore` and `NotOnOrAfter`.
    pub clock_skew: Duration,
    /// Where to send the browser when the session holds no usable
    /// `goto_url`. Trusted as configured.
    pub default_redirect_url: Option<String>,
    /// Origins (`scheme://host[:port]`) an absolute `goto_url` may point
    /// at. Path-absolute targets such as `/home` are always allowed.
    pub allowed_redirect_origins: Vec<String>,
    /// Reject type 0x0004 artifacts whose source ID is not the IdP's.
    pub check_artifact_source: bool,
    /// SOAP client settings.
    pub soap: SoapClientConfig,
}

impl ArtifactConsumerConfig {
    /// Creates a configuration with defaults for everything but the
    /// endpoints.
    #[must_use]
    pub fn new(
        sp_entity_id: impl Into<String>,
        idp_entity_id: impl Into<String>,
        artifact_resolution_url: impl Into<String>,
    ) -> Self {
        Self {
            sp_entity_id: sp_entity_id.into(),
            idp_entity_id: idp_entity_id.into(),
            artifact_resolution_url: artifact_resolution_url.into(),
            signature_algorithm: SignatureAlgorithm::RsaSha256,
            allow_sha1: false,
            validate_conditions: true,
            clock_skew: Duration::seconds(60),
            default_redirect_url: None,
            allowed_redirect_origins: Vec::new(),
            check_artifact_source: false,
            soap: SoapClientConfig::default(),
        }
    }

    /// Sets the request signature algorithm.
    #[must_use]
    pub fn with_signature_algorithm(mut self, algorithm: SignatureAlgorithm) -> Self {
        self.signature_algorithm = algorithm;
        self
    }

    /// Accepts SHA-1 in IdP signatures.
    #[must_use]
    pub fn with_allow_sha1(mut self, allow: bool) -> Self {
        self.allow_sha1 = allow;
        self
    }

    /// Enables or disables the `Conditions` check.
    #[must_use]
    pub fn with_validate_conditions(mut self, validate: bool) -> Self {
        self.validate_conditions = validate;
        self
    }

    /// Sets the clock skew tolerance.
    #[must_use]
    pub fn with_clock_skew(mut self, skew: Duration) -> Self {
        self.clock_skew = skew;
        self
    }

    /// Sets the fallback redirect.
    #[must_use]
    pub fn with_default_redirect_url(mut self, url: impl Into<String>) -> Self {
        self.default_redirect_url = Some(url.into());
        self
    }

    /// Sets the origins absolute goto URLs may point at.
    #[must_use]
    pub fn with_allowed_redirect_origins<I, S>(mut self, origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_redirect_origins = origins.into_iter().map(Into::into).collect();
        self
    }

    /// Returns true if the browser may be sent to `target` after login.
    ///
    /// Accepts path-absolute URLs on this host and `http`/`https` URLs on an
    /// allowed origin without user info. Scheme-relative (`//host`) and
    /// backslash tricks resolve to a foreign origin and are refused.
    #[must_use]
    pub fn is_allowed_redirect(&self, target: &str) -> bool {
        if target.starts_with('/') {
            let Ok(base) = Url::parse("https://sp.invalid/") else {
                return false;
            };
            return base
                .join(target)
                .is_ok_and(|resolved| resolved.origin() == base.origin());
        }

        let Ok(url) = Url::parse(target) else {
            return false;
        };
        if !matches!(url.scheme(), "http" | "https")
            || !url.username().is_empty()
            || url.password().is_some()
        {
            return false;
        }
        let origin = url.origin().ascii_serialization();
        self.allowed_redirect_origins.iter().any(|allowed| {
            Url::parse(allowed).is_ok_and(|a| a.origin().ascii_serialization() == origin)
        })
    }

    /// Enables the artifact source check.
    #[must_use]
    pub fn with_check_artifact_source(mut self, check: bool) -> Self {
        self.check_artifact_source = check;
        self
    }

    /// Sets the SOAP client settings.
    #[must_use]
    pub fn with_soap(mut self, soap: SoapClientConfig) -> Self {
        self.soap = soap;
        self
    }
}

/// Session-relevant content of a verified assertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Claims {
    /// Subject NameID.
    pub subject: Option<String>,
    /// Assertion issuer.
    pub issuer: String,
    /// Instant of the first `AuthnStatement`.
    pub authn_instant: Option<DateTime<Utc>>,
    /// Class of the first `AuthnStatement`.
    pub authn_context_class_ref: Option<String>,
    /// IdP session index of the first `AuthnStatement`.
    pub session_index: Option<String>,
    /// Attributes of the first `AttributeStatement`, by name.
    pub attributes: Vec<(String, Vec<String>)>,
}

impl Claims {
    /// Returns the values of the attribute `name`.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&[String]> {
        self.attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, values)| values.as_slice())
    }
}

/// Reads claims from the first authentication and attribute statements.
///
/// Each attribute is logged as `name=value`.
#[must_use]
pub fn extract_claims(verified: &VerifiedAssertion) -> Claims {
    let assertion = verified.assertion();
    let authn = assertion.authn_statements.first();

    let attributes: Vec<(String, Vec<String>)> = assertion
        .attribute_statements
        .first()
        .map(|statement| {
            statement
                .attributes
                .iter()
                .map(|a| (a.name.clone(), a.values.clone()))
                .collect()
        })
        .unwrap_or_default();

    for (name, values) in &attributes {
        for value in values {
            info!(attribute = %name, "{name}={value}");
        }
    }

    Claims {
        subject: assertion.name_id().map(str::to_string),
        issuer: assertion.issuer.clone(),
        authn_instant: authn.map(|a| a.authn_instant),
        authn_context_class_ref: authn.and_then(|a| a.authn_context_class_ref.clone()),
        session_index: authn.and_then(|a| a.session_index.clone()),
        attributes,
    }
}

/// Result of a successful login.
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    /// The session id now holding the login. The id the request arrived
    /// with no longer exists.
    pub session_id: String,
    /// Where to redirect the browser.
    pub redirect_url: String,
    /// The accepted claims.
    pub claims: Claims,
}

/// Runs the artifact pipeline against one IdP.
#[derive(Clone)]
pub struct ArtifactConsumer {
    config: Arc<ArtifactConsumerConfig>,
    credentials: Arc<dyn CredentialProvider>,
    sessions: Arc<dyn SessionStore>,
    transport: Arc<dyn SoapTransport>,
}

impl ArtifactConsumer {
    /// Creates a consumer with an HTTP SOAP client built from
    /// `config.soap`.
    ///
    /// # Errors
    ///
    /// Returns [`ArtifactError::Configuration`] if the client cannot be
    /// built.
    pub fn new(
        config: ArtifactConsumerConfig,
        credentials: Arc<dyn CredentialProvider>,
        sessions: Arc<dyn SessionStore>,
    ) -> ArtifactResult<Self> {
        let transport = Arc::new(SoapClient::new(config.soap.clone())?);
        Ok(Self::with_transport(config, credentials, sessions, transport))
    }

    /// Creates a consumer with a given SOAP transport.
    #[must_use]
    pub fn with_transport(
        config: ArtifactConsumerConfig,
        credentials: Arc<dyn CredentialProvider>,
        sessions: Arc<dyn SessionStore>,
        transport: Arc<dyn SoapTransport>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            credentials,
            sessions,
            transport,
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &ArtifactConsumerConfig {
        &self.config
    }

    /// Returns the session store.
    #[must_use]
    pub fn sessions(&self) -> &Arc<dyn SessionStore> {
        &self.sessions
    }

    /// Resolves `raw_artifact` and logs the session `session_id` in.
    ///
    /// `raw_artifact` is the `SAMLart` query value, `None` when absent.
    ///
    /// # Errors
    ///
    /// Returns the error of the first failing stage. Security-relevant
    /// failures are logged at `warn` with `security = true`, the others at
    /// `error`.
    pub async fn consume(
        &self,
        raw_artifact: Option<&str>,
        session_id: &str,
    ) -> ArtifactResult<LoginOutcome> {
        let span = info_span!(
            "artifact_consume",
            artifact_resolve_id = tracing::field::Empty
        );
        async {
            let result = self.run(raw_artifact, session_id).await;
            if let Err(err) = &result {
                log_failure(err);
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn run(&self, raw_artifact: Option<&str>, session_id: &str) -> ArtifactResult<LoginOutcome> {
        let artifact = Artifact::parse(raw_artifact.unwrap_or_default())?;
        self.check_source(&artifact)?;

        let response = self.resolve_artifact(&artifact).await?;
        let encrypted = response.first_encrypted_assertion()?;

        let decryption_key = self
            .credentials
            .decryption_credential()
            .await
            .map_err(|e| ArtifactError::Configuration(e.to_string()))?;
        let decrypted = AssertionDecrypter::new(decryption_key).decrypt(encrypted)?;

        let verified = self.verify(&decrypted).await?;
        if self.config.validate_conditions {
            if let Some(conditions) = &verified.assertion().conditions {
                conditions.validate(Utc::now(), self.config.clock_skew, &self.config.sp_entity_id)?;
            }
        }

        let claims = extract_claims(&verified);
        let outcome = self.establish_session(session_id, claims).await?;
        info!(
            subject = outcome.claims.subject.as_deref().unwrap_or("-"),
            redirect = %outcome.redirect_url,
            "session authenticated"
        );
        Ok(outcome)
    }

    /// Sends a signed `ArtifactResolve` for `artifact` and returns the
    /// validated `ArtifactResponse`.
    ///
    /// # Errors
    ///
    /// Returns [`ArtifactError::Signing`], [`ArtifactError::Transport`] or
    /// [`ArtifactError::Protocol`].
    pub async fn resolve_artifact(&self, artifact: &Artifact) -> ArtifactResult<ArtifactResponse> {
        let request = ArtifactResolve::build(
            artifact.as_str(),
            &self.config.sp_entity_id,
            &self.config.artifact_resolution_url,
        )?;
        Span::current().record("artifact_resolve_id", request.id.as_str());

        let credential = self
            .credentials
            .signing_credential()
            .await
            .map_err(|e| ArtifactError::Signing(e.to_string()))?;
        let signed = XmlSigner::new(credential)
            .with_algorithm(self.config.signature_algorithm)
            .sign(&request.to_xml(), &request.id)?;

        debug!(destination = %request.destination, "sending ArtifactResolve");
        let payload = self
            .transport
            .exchange(&self.config.artifact_resolution_url, &signed)
            .await?;

        let response = ArtifactResponse::from_element(&payload)?;
        response.validate(&request.id)?;
        Ok(response)
    }

    async fn verify(
        &self,
        decrypted: &crate::encryption::DecryptedAssertion,
    ) -> ArtifactResult<VerifiedAssertion> {
        let idp_key = self
            .credentials
            .idp_verification_key()
            .await
            .map_err(|e| ArtifactError::Configuration(e.to_string()))?;
        SignatureVerifier::new(idp_key)
            .with_profile(SignatureProfileValidator::new().allow_sha1(self.config.allow_sha1))
            .verify(decrypted)
    }

    fn check_source(&self, artifact: &Artifact) -> ArtifactResult<()> {
        if !self.config.check_artifact_source {
            return Ok(());
        }
        match artifact.decode_type4() {
            Some(decoded) if decoded.is_from(&self.config.idp_entity_id) => Ok(()),
            Some(_) => Err(ArtifactError::MalformedRequest(
                "artifact was not issued by the configured IdP".into(),
            )),
            None => Err(ArtifactError::MalformedRequest(
                "artifact is not a type 0x0004 artifact".into(),
            )),
        }
    }

    /// Moves `session_id` to a fresh id, marks it authenticated and returns
    /// the outcome.
    ///
    /// The redirect target is the session's `goto_url` when
    /// [`ArtifactConsumerConfig::is_allowed_redirect`] accepts it, otherwise
    /// the configured default. It is resolved and checked to be a valid
    /// `Location` header before anything is written.
    ///
    /// # Errors
    ///
    /// Returns [`ArtifactError::Session`] if there is no usable target or
    /// the store fails.
    pub async fn establish_session(
        &self,
        session_id: &str,
        claims: Claims,
    ) -> ArtifactResult<LoginOutcome> {
        let stored = self
            .sessions
            .get(session_id, GOTO_URL)
            .await?
            .filter(|url| !url.is_empty());
        let redirect_url = match stored {
            Some(url) if self.config.is_allowed_redirect(&url) => url,
            other => {
                if let Some(url) = other {
                    warn!(goto = %url, security = true, "ignoring goto URL outside the allowed origins");
                }
                self.config.default_redirect_url.clone().ok_or_else(|| {
                    ArtifactError::Session("no goto URL in session and no default redirect".into())
                })?
            }
        };
        if HeaderValue::from_str(&redirect_url).is_err() {
            return Err(ArtifactError::Session(
                "redirect target is not a valid Location header".into(),
            ));
        }

        let new_id = generate_session_id();
        self.sessions.rotate(session_id, &new_id).await?;
        if let Some(subject) = &claims.subject {
            self.sessions.set(&new_id, SUBJECT, subject).await?;
        }
        self.sessions.set(&new_id, AUTHENTICATED, "true").await?;
        Ok(LoginOutcome {
            session_id: new_id,
            redirect_url,
            claims,
        })
    }
}

impl std::fmt::Debug for ArtifactConsumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactConsumer")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn log_failure(err: &ArtifactError) {
    if err.is_security_relevant() {
        warn!(error_kind = err.kind(), security = true, error = %err, "artifact login rejected");
    } else {
        error!(error_kind = err.kind(), error = %err, "artifact login failed");
    }
}
