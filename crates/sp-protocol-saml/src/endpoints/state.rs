//! SP endpoint state.

use std::sync::Arc;

use crate::pipeline::ArtifactConsumer;

/// State shared by the SP endpoints.
#[derive(Clone, Debug)]
pub struct SpState {
    /// The artifact pipeline.
    pub consumer: Arc<ArtifactConsumer>,
    /// IdP single sign-on URL the login endpoint redirects to.
    pub idp_sso_url: String,
    /// Whether session cookies carry the `Secure` flag.
    pub secure_cookies: bool,
}

impl SpState {
    /// Creates the endpoint state.
    pub fn new(consumer: ArtifactConsumer, idp_sso_url: impl Into<String>) -> Self {
        Self {
            consumer: Arc::new(consumer),
            idp_sso_url: idp_sso_url.into(),
            secure_cookies: true,
        }
    }

    /// Sets the `Secure` cookie flag; disable only for plain-HTTP development.
    #[must_use]
    pub fn with_secure_cookies(mut self, secure: bool) -> Self {
        self.secure_cookies = secure;
        self
    }
}
