//! Test environment for end-to-end SP tests.
//!
//! [`TestEnv`] starts two in-process servers on ephemeral ports: a mock IdP
//! answering `ArtifactResolve` over SOAP, and the SP itself built with
//! [`sp_server::create_router`]. Tests drive the SP with a plain
//! [`reqwest::Client`] that does not follow redirects.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    extract::State,
    http::{header::CONTENT_TYPE, StatusCode},
    response::IntoResponse,
    routing::post,
    Router,
};
use chrono::Utc;
use reqwest::{header, Client};
use sp_crypto::{DecryptionKey, EncryptionKey, SigningKey, VerificationKey};
use sp_protocol_saml::credentials::StaticCredentials;
use sp_protocol_saml::encryption::AssertionEncrypter;
use sp_protocol_saml::endpoints::{SpState, DEFAULT_ACS_PATH, SESSION_COOKIE_NAME};
use sp_protocol_saml::pipeline::{ArtifactConsumer, ArtifactConsumerConfig};
use sp_protocol_saml::session::InMemorySessionStore;
use sp_protocol_saml::signature::{SignatureVerifier, SigningCredential, XmlSigner};
use sp_protocol_saml::soap::{build_envelope, parse_envelope, SoapClientConfig};
use sp_protocol_saml::types::{
    authn_context, Assertion, ArtifactResolve, ArtifactResponseBuilder, Attribute,
    AttributeStatement, AuthnStatement, Conditions, NameId, Type4Artifact,
};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// SP entity ID used by the tests.
pub const SP_ENTITY_ID: &str = "https://sp.example.com";
/// IdP entity ID used by the tests.
pub const IDP_ENTITY_ID: &str = "https://idp.example.com";
/// IdP SSO URL the login endpoint redirects to.
pub const IDP_SSO_URL: &str = "https://idp.example.com/sso";
/// Path of the mock IdP's artifact resolution service.
pub const ARS_PATH: &str = "/saml/ars";
/// Email released by the mock IdP.
pub const USER_EMAIL: &str = "user@example.com";
/// Origin the SP may redirect to after login.
pub const APP_ORIGIN: &str = "https://app.example.com";

/// How the mock IdP answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdpMode {
    /// One encrypted assertion, correctly signed.
    Valid,
    /// Sleeps before answering.
    Slow(Duration),
    /// A successful response with no assertion.
    NoAssertion,
    /// The assertion is modified after signing.
    Tampered,
    /// The assertion is signed by a key the SP does not trust.
    UntrustedSigner,
    /// A second element carrying the signed ID is injected.
    Wrapped,
}

struct MockIdp {
    mode: IdpMode,
    signing: SigningCredential,
    sp_verification_key: VerificationKey,
    sp_encryption_key: EncryptionKey,
    resolved: Mutex<Vec<String>>,
}

impl MockIdp {
    fn assertion(&self) -> Assertion {
        let now = Utc::now();
        Assertion::new(IDP_ENTITY_ID)
            .with_subject(NameId::email(USER_EMAIL))
            .with_conditions(Conditions::for_audience(
                SP_ENTITY_ID,
                now,
                chrono::Duration::minutes(5),
            ))
            .with_authn_statement(AuthnStatement {
                authn_instant: now,
                session_index: Some("_session1".into()),
                authn_context_class_ref: Some(authn_context::PASSWORD_PROTECTED_TRANSPORT.into()),
            })
            .with_attribute_statement(AttributeStatement {
                attributes: vec![Attribute::single("email", USER_EMAIL)],
            })
    }

    fn signed_assertion(&self) -> anyhow::Result<String> {
        let assertion = self.assertion();
        let xml = assertion.to_xml();
        let signed = match self.mode {
            IdpMode::UntrustedSigner => {
                let rogue = SigningCredential::new(SigningKey::generate()?, None);
                XmlSigner::new(rogue).sign(&xml, &assertion.id)?
            }
            _ => XmlSigner::new(self.signing.clone()).sign(&xml, &assertion.id)?,
        };

        Ok(match self.mode {
            IdpMode::Tampered => signed.replace(USER_EMAIL, "admin@example.com"),
            IdpMode::Wrapped => signed.replacen(
                "</saml:Assertion>",
                &format!(
                    r#"<saml:Advice><saml:Assertion ID="{}" Version="2.0"/></saml:Advice></saml:Assertion>"#,
                    assertion.id
                ),
                1,
            ),
            _ => signed,
        })
    }

    fn respond(&self, request_xml: &str) -> anyhow::Result<String> {
        let request = parse_envelope(request_xml)?;
        SignatureVerifier::new(self.sp_verification_key.clone())
            .verify_element(request_xml, &request)?;
        let resolve = ArtifactResolve::from_element(&request)?;
        self.resolved
            .lock()
            .map_err(|_| anyhow::anyhow!("poisoned"))?
            .push(resolve.artifact.as_str().to_string());

        let mut builder = ArtifactResponseBuilder::new(IDP_ENTITY_ID, resolve.id);
        if self.mode != IdpMode::NoAssertion {
            let encrypted = AssertionEncrypter::new(self.sp_encryption_key.clone())
                .encrypt(&self.signed_assertion()?)?;
            builder = builder.encrypted_assertion(encrypted);
        }
        Ok(build_envelope(&builder.build_xml()))
    }
}

async fn artifact_resolution(State(idp): State<Arc<MockIdp>>, body: String) -> impl IntoResponse {
    if let IdpMode::Slow(delay) = idp.mode {
        tokio::time::sleep(delay).await;
    }
    match idp.respond(&body) {
        Ok(xml) => (StatusCode::OK, [(CONTENT_TYPE, "text/xml; charset=utf-8")], xml),
        Err(err) => (
            StatusCode::BAD_REQUEST,
            [(CONTENT_TYPE, "text/plain")],
            err.to_string(),
        ),
    }
}

async fn spawn(app: Router) -> anyhow::Result<(String, JoinHandle<()>)> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let base_url = format!("http://{}", listener.local_addr()?);
    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("Server error: {}", e);
        }
    });
    Ok((base_url, handle))
}

/// A running SP wired to a running mock IdP.
pub struct TestEnv {
    /// Base URL of the SP.
    pub sp_url: String,
    /// HTTP client for testing; redirects are not followed.
    pub client: Client,
    /// The SP's session store.
    pub sessions: Arc<InMemorySessionStore>,
    /// The pipeline behind the SP endpoints.
    pub consumer: ArtifactConsumer,
    idp: Arc<MockIdp>,
    _servers: [JoinHandle<()>; 2],
}

impl TestEnv {
    /// Starts an environment with the default 10 second SOAP timeout.
    pub async fn new(mode: IdpMode) -> anyhow::Result<Self> {
        Self::with_soap_timeout(mode, SoapClientConfig::default().timeout).await
    }

    /// Starts an environment with a custom SOAP timeout.
    pub async fn with_soap_timeout(mode: IdpMode, timeout: Duration) -> anyhow::Result<Self> {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("sp_protocol_saml=debug")
            .try_init();

        let sp_signing = SigningKey::generate()?;
        let sp_decryption = DecryptionKey::generate()?;
        let idp_signing = SigningKey::generate()?;
        let idp_verification_key = idp_signing.verification_key()?;

        let idp = Arc::new(MockIdp {
            mode,
            signing: SigningCredential::new(idp_signing, None),
            sp_verification_key: sp_signing.verification_key()?,
            sp_encryption_key: sp_decryption.encryption_key(),
            resolved: Mutex::new(Vec::new()),
        });
        let idp_app = Router::new()
            .route(ARS_PATH, post(artifact_resolution))
            .with_state(idp.clone());
        let (idp_url, idp_server) = spawn(idp_app).await?;

        let credentials = Arc::new(StaticCredentials::new(
            SigningCredential::new(sp_signing, None),
            sp_decryption,
            idp_verification_key,
        ));
        let sessions = Arc::new(InMemorySessionStore::new());
        let soap = SoapClientConfig {
            timeout,
            ..SoapClientConfig::default()
        };
        let consumer = ArtifactConsumer::new(
            ArtifactConsumerConfig::new(SP_ENTITY_ID, IDP_ENTITY_ID, format!("{idp_url}{ARS_PATH}"))
                .with_check_artifact_source(true)
                .with_allowed_redirect_origins([APP_ORIGIN])
                .with_soap(soap),
            credentials,
            sessions.clone(),
        )?;

        let state = SpState::new(consumer.clone(), IDP_SSO_URL).with_secure_cookies(false);
        let (sp_url, sp_server) = spawn(sp_server::create_router(state, DEFAULT_ACS_PATH)).await?;

        let client = Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self {
            sp_url,
            client,
            sessions,
            consumer,
            idp,
            _servers: [idp_server, sp_server],
        })
    }

    /// An artifact issued by the mock IdP.
    #[must_use]
    pub fn artifact() -> String {
        Type4Artifact::new(0, IDP_ENTITY_ID, [0x5a; 20]).encode()
    }

    /// Artifacts the mock IdP has been asked to resolve.
    #[must_use]
    pub fn resolved_artifacts(&self) -> Vec<String> {
        self.idp
            .resolved
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    /// Visits the login endpoint and returns the new session ID.
    pub async fn start_login(&self, goto: &str) -> anyhow::Result<String> {
        let response = self
            .client
            .get(format!("{}/saml/login", self.sp_url))
            .query(&[("goto", goto)])
            .send()
            .await?;
        anyhow::ensure!(
            response.status() == reqwest::StatusCode::FOUND,
            "login returned {}",
            response.status()
        );
        issued_session(&response)
            .ok_or_else(|| anyhow::anyhow!("login did not set a session cookie"))
    }

    /// Sends the browser back to the ACS with `artifact`.
    pub async fn deliver_artifact(
        &self,
        session_id: &str,
        artifact: &str,
    ) -> anyhow::Result<reqwest::Response> {
        Ok(self
            .client
            .get(format!("{}{DEFAULT_ACS_PATH}", self.sp_url))
            .query(&[("SAMLart", artifact)])
            .header(header::COOKIE, format!("{SESSION_COOKIE_NAME}={session_id}"))
            .send()
            .await?)
    }
}

/// Returns the session id a response sets in its cookie, if any.
#[must_use]
pub fn issued_session(response: &reqwest::Response) -> Option<String> {
    response
        .headers()
        .get(header::SET_COOKIE)?
        .to_str()
        .ok()?
        .split(';')
        .next()?
        .strip_prefix(SESSION_COOKIE_NAME)?
        .strip_prefix('=')
        .map(str::to_string)
}
