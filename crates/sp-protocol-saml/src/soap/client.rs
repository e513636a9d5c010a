//! SOAP client for the IdP's artifact resolution service.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use reqwest::StatusCode;
use tracing::debug;

use super::{build_envelope, fault_in, parse_envelope};
use crate::error::{ArtifactError, ArtifactResult};
use crate::types::SOAP_ACTION;
use crate::xml::Element;

/// Synchronous request/response exchange with a SOAP endpoint.
#[async_trait]
pub trait SoapTransport: Send + Sync {
    /// Posts `body_xml` in a SOAP envelope and returns the response payload.
    async fn exchange(&self, endpoint: &str, body_xml: &str) -> ArtifactResult<Element>;
}

/// SOAP client settings.
#[derive(Debug, Clone)]
pub struct SoapClientConfig {
    /// Total time allowed for the request, including reading the body.
    pub timeout: Duration,
    /// Time allowed to establish the connection.
    pub connect_timeout: Duration,
    /// `User-Agent` header value.
    pub user_agent: String,
}

impl Default for SoapClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(5),
            user_agent: format!("sp-protocol-saml/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// HTTP SOAP 1.1 client. Requests are never retried.
#[derive(Debug, Clone)]
pub struct SoapClient {
    client: reqwest::Client,
    config: SoapClientConfig,
}

impl SoapClient {
    /// Creates a client.
    ///
    /// # Errors
    ///
    /// Returns [`ArtifactError::Configuration`] if the HTTP client cannot be
    /// built.
    pub fn new(config: SoapClientConfig) -> ArtifactResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| ArtifactError::Configuration(format!("HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    /// Returns the client settings.
    #[must_use]
    pub fn config(&self) -> &SoapClientConfig {
        &self.config
    }

    fn transport_error(&self, err: &reqwest::Error) -> ArtifactError {
        if err.is_timeout() {
            ArtifactError::Transport(format!(
                "no response within {}s",
                self.config.timeout.as_secs()
            ))
        } else if err.is_connect() {
            ArtifactError::Transport(format!("connection failed: {err}"))
        } else {
            ArtifactError::Transport(err.to_string())
        }
    }
}

#[async_trait]
impl SoapTransport for SoapClient {
    async fn exchange(&self, endpoint: &str, body_xml: &str) -> ArtifactResult<Element> {
        let response = self
            .client
            .post(endpoint)
            .header(CONTENT_TYPE, "text/xml; charset=utf-8")
            .header("SOAPAction", SOAP_ACTION)
            .header(USER_AGENT, &self.config.user_agent)
            .body(build_envelope(body_xml))
            .send()
            .await
            .map_err(|e| self.transport_error(&e))?;

        let status = response.status();
        let text = response.text().await.map_err(|e| self.transport_error(&e))?;
        debug!(%endpoint, status = status.as_u16(), bytes = text.len(), "SOAP response received");

        if status.is_success() {
            return parse_envelope(&text);
        }

        // SOAP 1.1 reports faults with HTTP 500
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            if let Some(fault) = fault_in(&text) {
                return Err(ArtifactError::Protocol(format!("SOAP fault: {fault}")));
            }
        }
        Err(ArtifactError::Transport(format!("IdP returned HTTP {status}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{SAMLP_NS, SOAP11_NS};
    use axum::http::HeaderMap;
    use axum::routing::post;
    use axum::Router;

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}/soap")
    }

    fn envelope(payload: &str) -> String {
        format!(r#"<soap:Envelope xmlns:soap="{SOAP11_NS}"><soap:Body>{payload}</soap:Body></soap:Envelope>"#)
    }

    #[tokio::test]
    async fn sends_soap_headers_and_returns_payload() {
        let router = Router::new().route(
            "/soap",
            post(|headers: HeaderMap, body: String| async move {
                assert_eq!(headers["content-type"], "text/xml; charset=utf-8");
                assert_eq!(headers["soapaction"], SOAP_ACTION);
                assert!(body.contains("ArtifactResolve"));
                envelope(&format!(r#"<samlp:ArtifactResponse xmlns:samlp="{SAMLP_NS}" ID="_r"/>"#))
            }),
        );
        let url = serve(router).await;

        let client = SoapClient::new(SoapClientConfig::default()).unwrap();
        let payload = client
            .exchange(&url, &format!(r#"<samlp:ArtifactResolve xmlns:samlp="{SAMLP_NS}"/>"#))
            .await
            .unwrap();
        assert!(payload.is(SAMLP_NS, "ArtifactResponse"));
    }

    #[tokio::test]
    async fn http_error_is_transport_error() {
        let router = Router::new().route(
            "/soap",
            post(|| async { (axum::http::StatusCode::SERVICE_UNAVAILABLE, "down") }),
        );
        let url = serve(router).await;

        let client = SoapClient::new(SoapClientConfig::default()).unwrap();
        let err = client.exchange(&url, "<x/>").await.unwrap_err();
        assert!(matches!(err, ArtifactError::Transport(msg) if msg.contains("503")));
    }

    #[tokio::test]
    async fn fault_with_500_is_protocol_error() {
        let router = Router::new().route(
            "/soap",
            post(|| async {
                (
                    axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                    envelope("<soap:Fault><faultcode>soap:Server</faultcode><faultstring>unknown artifact</faultstring></soap:Fault>"),
                )
            }),
        );
        let url = serve(router).await;

        let client = SoapClient::new(SoapClientConfig::default()).unwrap();
        let err = client.exchange(&url, "<x/>").await.unwrap_err();
        assert!(matches!(err, ArtifactError::Protocol(msg) if msg.contains("unknown artifact")));
    }

    #[tokio::test]
    async fn slow_idp_times_out() {
        let router = Router::new().route(
            "/soap",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                "late"
            }),
        );
        let url = serve(router).await;

        let client = SoapClient::new(SoapClientConfig {
            timeout: Duration::from_millis(200),
            ..SoapClientConfig::default()
        })
        .unwrap();
        let err = client.exchange(&url, "<x/>").await.unwrap_err();
        assert!(matches!(err, ArtifactError::Transport(_)));
    }

    #[tokio::test]
    async fn unreachable_idp_is_transport_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = SoapClient::new(SoapClientConfig::default()).unwrap();
        let err = client
            .exchange(&format!("http://{addr}/soap"), "<x/>")
            .await
            .unwrap_err();
        assert!(matches!(err, ArtifactError::Transport(_)));
    }
}
