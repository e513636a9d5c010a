//! Server configuration.
//!
//! Configuration is loaded from `SP_*` environment variables (and a `.env`
//! file if present). Everything has a default except the key and
//! certificate paths.

use std::path::PathBuf;
use std::time::Duration;

use chrono::TimeDelta;
use sp_protocol_saml::endpoints::DEFAULT_ACS_PATH;
use sp_protocol_saml::pipeline::ArtifactConsumerConfig;
use sp_protocol_saml::soap::SoapClientConfig;

/// Errors raised while loading the configuration or the keys it points to.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required variable is not set.
    #[error("{0} environment variable is required")]
    Missing(&'static str),

    /// A variable is set but cannot be parsed.
    #[error("invalid value for {name}: {value:?}")]
    Invalid {
        /// Variable name.
        name: &'static str,
        /// Offending value.
        value: String,
    },

    /// A key or certificate file cannot be read.
    #[error("cannot read {path}: {source}")]
    Io {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A key or certificate file does not hold usable key material.
    #[error("bad key material in {path}: {reason}")]
    KeyMaterial {
        /// File path.
        path: PathBuf,
        /// What is wrong with it.
        reason: String,
    },
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct SpConfig {
    /// Host to bind to.
    pub host: String,

    /// Port to bind to.
    pub port: u16,

    /// This SP's entity ID.
    pub entity_id: String,

    /// Path of the Assertion Consumer Service.
    pub acs_path: String,

    /// The IdP's entity ID.
    pub idp_entity_id: String,

    /// The IdP's artifact resolution service (SOAP endpoint).
    pub idp_artifact_resolution_url: String,

    /// The IdP's single sign-on URL.
    pub idp_sso_url: String,

    /// PKCS#8 PEM key signing ArtifactResolve requests.
    pub signing_key_path: PathBuf,

    /// Certificate matching the signing key, embedded in `KeyInfo`.
    pub signing_cert_path: Option<PathBuf>,

    /// PKCS#8 PEM key unwrapping assertion content keys.
    pub decryption_key_path: PathBuf,

    /// The IdP's signing certificate.
    pub idp_cert_path: PathBuf,

    /// SOAP request timeout.
    pub soap_timeout: Duration,

    /// Redirect used when the session holds no goto URL.
    pub default_redirect_url: Option<String>,

    /// Origins, besides this host, that a post-login `goto` may point at.
    pub allowed_redirect_origins: Vec<String>,

    /// Clock skew tolerance for assertion conditions.
    pub clock_skew: TimeDelta,

    /// Check assertion conditions.
    pub validate_conditions: bool,

    /// Accept SHA-1 signatures from the IdP.
    pub allow_sha1: bool,

    /// Set the `Secure` flag on session cookies.
    pub secure_cookies: bool,
}

impl SpConfig {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if it exists
        let _ = dotenvy::dotenv();

        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Loads configuration through `lookup`, which maps a variable name to
    /// its value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let host = var("SP_HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port = parse(&var, "SP_PORT")?.unwrap_or(8080);

        let entity_id =
            var("SP_ENTITY_ID").unwrap_or_else(|| format!("http://localhost:{port}/saml"));
        let acs_path = var("SP_ACS_PATH").unwrap_or_else(|| DEFAULT_ACS_PATH.to_string());
        if !acs_path.starts_with('/') {
            return Err(ConfigError::Invalid {
                name: "SP_ACS_PATH",
                value: acs_path,
            });
        }

        let idp_entity_id =
            var("SP_IDP_ENTITY_ID").unwrap_or_else(|| "http://localhost:8180/idp".to_string());
        let idp_artifact_resolution_url = var("SP_IDP_ARTIFACT_RESOLUTION_URL")
            .unwrap_or_else(|| format!("{idp_entity_id}/artifact"));
        let idp_sso_url = var("SP_IDP_SSO_URL").unwrap_or_else(|| format!("{idp_entity_id}/sso"));

        let signing_key_path = var("SP_SIGNING_KEY_PATH")
            .map(PathBuf::from)
            .ok_or(ConfigError::Missing("SP_SIGNING_KEY_PATH"))?;
        let signing_cert_path = var("SP_SIGNING_CERT_PATH").map(PathBuf::from);
        let decryption_key_path = var("SP_DECRYPTION_KEY_PATH")
            .map(PathBuf::from)
            .ok_or(ConfigError::Missing("SP_DECRYPTION_KEY_PATH"))?;
        let idp_cert_path = var("SP_IDP_CERT_PATH")
            .map(PathBuf::from)
            .ok_or(ConfigError::Missing("SP_IDP_CERT_PATH"))?;

        let soap_timeout =
            Duration::from_secs(parse(&var, "SP_SOAP_TIMEOUT_SECS")?.unwrap_or(10));
        let default_redirect_url = var("SP_DEFAULT_REDIRECT_URL");
        let allowed_redirect_origins = var("SP_ALLOWED_REDIRECT_ORIGINS")
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|o| !o.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        let clock_skew = clock_skew(&var)?;
        let validate_conditions = flag(&var, "SP_VALIDATE_CONDITIONS", true);
        let allow_sha1 = flag(&var, "SP_ALLOW_SHA1", false);
        let secure_cookies = flag(&var, "SP_SECURE_COOKIES", true);

        Ok(Self {
            host,
            port,
            entity_id,
            acs_path,
            idp_entity_id,
            idp_artifact_resolution_url,
            idp_sso_url,
            signing_key_path,
            signing_cert_path,
            decryption_key_path,
            idp_cert_path,
            soap_timeout,
            default_redirect_url,
            allowed_redirect_origins,
            clock_skew,
            validate_conditions,
            allow_sha1,
            secure_cookies,
        })
    }

    /// Returns the pipeline configuration.
    #[must_use]
    pub fn consumer_config(&self) -> ArtifactConsumerConfig {
        let soap = SoapClientConfig {
            timeout: self.soap_timeout,
            ..SoapClientConfig::default()
        };
        let mut config = ArtifactConsumerConfig::new(
            &self.entity_id,
            &self.idp_entity_id,
            &self.idp_artifact_resolution_url,
        )
        .with_allow_sha1(self.allow_sha1)
        .with_validate_conditions(self.validate_conditions)
        .with_clock_skew(self.clock_skew)
        .with_allowed_redirect_origins(self.allowed_redirect_origins.iter().cloned())
        .with_soap(soap);
        if let Some(url) = &self.default_redirect_url {
            config = config.with_default_redirect_url(url);
        }
        config
    }
}

fn parse<T, F>(var: &F, name: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    var(name)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid { name, value })
        })
        .transpose()
}

/// `SP_CLOCK_SKEW_SECS` must be a non-negative number of seconds that
/// chrono can represent.
fn clock_skew<F>(var: &F) -> Result<TimeDelta, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let secs: i64 = parse(var, "SP_CLOCK_SKEW_SECS")?.unwrap_or(60);
    if secs < 0 {
        return Err(ConfigError::Invalid {
            name: "SP_CLOCK_SKEW_SECS",
            value: secs.to_string(),
        });
    }
    TimeDelta::try_seconds(secs).ok_or_else(|| ConfigError::Invalid {
        name: "SP_CLOCK_SKEW_SECS",
        value: secs.to_string(),
    })
}

fn flag<F>(var: &F, name: &str, default: bool) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    var(name)
        .map(|v| !matches!(v.trim().to_lowercase().as_str(), "false" | "0" | "no" | "off"))
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    const KEYS: [(&str, &str); 3] = [
        ("SP_SIGNING_KEY_PATH", "/keys/sp-signing.pem"),
        ("SP_DECRYPTION_KEY_PATH", "/keys/sp-encryption.pem"),
        ("SP_IDP_CERT_PATH", "/keys/idp.crt"),
    ];

    #[test]
    fn defaults_apply_when_only_keys_are_set() {
        let config = SpConfig::from_lookup(lookup(&KEYS)).unwrap();

        assert_eq!(config.port, 8080);
        assert_eq!(config.acs_path, "/saml/acs");
        assert_eq!(config.soap_timeout, Duration::from_secs(10));
        assert_eq!(config.clock_skew, TimeDelta::seconds(60));
        assert!(config.validate_conditions);
        assert!(!config.allow_sha1);
        assert!(config.secure_cookies);
        assert!(config.signing_cert_path.is_none());
        assert!(config.allowed_redirect_origins.is_empty());
        assert_eq!(
            config.idp_artifact_resolution_url,
            "http://localhost:8180/idp/artifact"
        );
    }

    #[test]
    fn key_paths_are_required() {
        let err = SpConfig::from_lookup(lookup(&KEYS[..2])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("SP_IDP_CERT_PATH")));
    }

    #[test]
    fn overrides_are_parsed() {
        let mut pairs = KEYS.to_vec();
        pairs.extend([
            ("SP_PORT", "9443"),
            ("SP_ENTITY_ID", "https://sp.example.com"),
            ("SP_IDP_ARTIFACT_RESOLUTION_URL", "https://idp.example.com/ars"),
            ("SP_SOAP_TIMEOUT_SECS", "3"),
            ("SP_ALLOW_SHA1", "true"),
            ("SP_VALIDATE_CONDITIONS", "off"),
            ("SP_DEFAULT_REDIRECT_URL", "/home"),
            (
                "SP_ALLOWED_REDIRECT_ORIGINS",
                "https://app.example.com, https://admin.example.com",
            ),
        ]);
        let config = SpConfig::from_lookup(lookup(&pairs)).unwrap();

        assert_eq!(config.port, 9443);
        assert!(config.allow_sha1);
        assert!(!config.validate_conditions);

        let consumer = config.consumer_config();
        assert_eq!(consumer.sp_entity_id, "https://sp.example.com");
        assert_eq!(consumer.artifact_resolution_url, "https://idp.example.com/ars");
        assert_eq!(consumer.soap.timeout, Duration::from_secs(3));
        assert_eq!(consumer.default_redirect_url.as_deref(), Some("/home"));
        assert!(consumer.allow_sha1);
        assert!(consumer.is_allowed_redirect("https://admin.example.com/users"));
        assert!(!consumer.is_allowed_redirect("https://evil.example.net/phish"));
    }

    #[test]
    fn unparsable_port_is_rejected() {
        let mut pairs = KEYS.to_vec();
        pairs.push(("SP_PORT", "http"));
        let err = SpConfig::from_lookup(lookup(&pairs)).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "SP_PORT", .. }));
    }

    #[test]
    fn clock_skew_must_be_representable_and_non_negative() {
        for value in ["-5", "9223372036854775807"] {
            let mut pairs = KEYS.to_vec();
            pairs.push(("SP_CLOCK_SKEW_SECS", value));
            let err = SpConfig::from_lookup(lookup(&pairs)).unwrap_err();
            assert!(matches!(
                err,
                ConfigError::Invalid { name: "SP_CLOCK_SKEW_SECS", .. }
            ));
        }

        let mut pairs = KEYS.to_vec();
        pairs.push(("SP_CLOCK_SKEW_SECS", "0"));
        let config = SpConfig::from_lookup(lookup(&pairs)).unwrap();
        assert_eq!(config.consumer_config().clock_skew, TimeDelta::zero());
    }

    #[test]
    fn relative_acs_path_is_rejected() {
        let mut pairs = KEYS.to_vec();
        pairs.push(("SP_ACS_PATH", "saml/acs"));
        assert!(SpConfig::from_lookup(lookup(&pairs)).is_err());
    }
}
