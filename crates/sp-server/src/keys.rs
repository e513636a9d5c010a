//! Loading of PEM key material into a credential provider.

use std::path::Path;

use sp_crypto::{DecryptionKey, SigningKey, VerificationKey};
use sp_protocol_saml::credentials::StaticCredentials;
use sp_protocol_saml::signature::SigningCredential;
use x509_parser::pem::Pem;

use crate::config::{ConfigError, SpConfig};

/// Decodes the first PEM block in `text`.
///
/// Text before the `BEGIN` line is skipped. Encrypted keys carry RFC 1421
/// headers and fail to decode.
pub fn parse_pem(text: &str) -> Result<Pem, String> {
    Pem::iter_from_buffer(text.as_bytes())
        .next()
        .ok_or_else(|| "no PEM block".to_string())?
        .map_err(|e| format!("malformed PEM: {e}"))
}

fn read_pem(path: &Path) -> Result<Pem, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_pem(&text).map_err(|reason| key_error(path, reason))
}

fn key_error(path: &Path, reason: impl ToString) -> ConfigError {
    ConfigError::KeyMaterial {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

/// Loads the SP signing key. Accepts PKCS#8 and PKCS#1 RSA keys.
pub fn load_signing_key(path: &Path) -> Result<SigningKey, ConfigError> {
    let pem = read_pem(path)?;
    match pem.label.as_str() {
        "PRIVATE KEY" => SigningKey::from_pkcs8(&pem.contents),
        "RSA PRIVATE KEY" => SigningKey::from_der(&pem.contents),
        other => return Err(key_error(path, format!("unexpected PEM label {other:?}"))),
    }
    .map_err(|e| key_error(path, e))
}

/// Loads the SP decryption key (PKCS#8 only).
pub fn load_decryption_key(path: &Path) -> Result<DecryptionKey, ConfigError> {
    let pem = read_pem(path)?;
    if pem.label != "PRIVATE KEY" {
        return Err(key_error(
            path,
            format!("expected a PKCS#8 PRIVATE KEY, found {:?}", pem.label),
        ));
    }
    DecryptionKey::from_pkcs8(&pem.contents).map_err(|e| key_error(path, e))
}

/// Loads a DER certificate from a PEM file.
pub fn load_certificate(path: &Path) -> Result<Vec<u8>, ConfigError> {
    let pem = read_pem(path)?;
    if pem.label != "CERTIFICATE" {
        return Err(key_error(
            path,
            format!("expected a CERTIFICATE, found {:?}", pem.label),
        ));
    }
    Ok(pem.contents)
}

/// Loads every key named by `config`.
pub fn load_credentials(config: &SpConfig) -> Result<StaticCredentials, ConfigError> {
    let signing_key = load_signing_key(&config.signing_key_path)?;
    let signing_cert = config
        .signing_cert_path
        .as_deref()
        .map(load_certificate)
        .transpose()?;
    let decryption_key = load_decryption_key(&config.decryption_key_path)?;

    let idp_cert = load_certificate(&config.idp_cert_path)?;
    let idp_key = VerificationKey::from_certificate_der(&idp_cert)
        .map_err(|e| key_error(&config.idp_cert_path, e))?;

    tracing::info!(
        signing_key = %config.signing_key_path.display(),
        decryption_key = %config.decryption_key_path.display(),
        idp_cert = %config.idp_cert_path.display(),
        "Loaded SP credentials"
    );

    Ok(StaticCredentials::new(
        SigningCredential::new(signing_key, signing_cert),
        decryption_key,
        idp_key,
    ))
}
