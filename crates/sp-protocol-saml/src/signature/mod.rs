//! XML Signature support for SAML.
//!
//! This module provides XML Digital Signature (XML-DSig) support for
//! signing outgoing requests and validating signed assertions.
//!
//! # Accepted signature shape
//!
//! Only enveloped signatures over a single same-document reference are
//! accepted. Both `SignedInfo` and the reference use Exclusive C14N. See
//! [`SignatureProfileValidator`] for the full list of checks.
//!
//! # Signing Algorithms
//!
//! - RSA-SHA256 (default), RSA-SHA384, RSA-SHA512
//! - ECDSA-SHA256 / ECDSA-SHA384 (verification only)
//! - RSA-SHA1 (verification only, when explicitly allowed)

mod profile;
mod signer;
mod validator;

pub use profile::*;
pub use signer::*;
pub use validator::*;

pub use sp_crypto::SignatureAlgorithm;
use sp_crypto::DigestAlgorithm;

use crate::types::digest_algorithms;

/// Returns the XML-DSig URI for a digest algorithm.
#[must_use]
pub const fn digest_uri(algorithm: DigestAlgorithm) -> &'static str {
    match algorithm {
        DigestAlgorithm::Sha1 => digest_algorithms::SHA1,
        DigestAlgorithm::Sha256 => digest_algorithms::SHA256,
        DigestAlgorithm::Sha384 => digest_algorithms::SHA384,
        DigestAlgorithm::Sha512 => digest_algorithms::SHA512,
    }
}

/// Parses an XML-DSig digest algorithm URI.
#[must_use]
pub fn digest_from_uri(uri: &str) -> Option<DigestAlgorithm> {
    match uri {
        digest_algorithms::SHA1 => Some(DigestAlgorithm::Sha1),
        digest_algorithms::SHA256 => Some(DigestAlgorithm::Sha256),
        digest_algorithms::SHA384 => Some(DigestAlgorithm::Sha384),
        digest_algorithms::SHA512 => Some(DigestAlgorithm::Sha512),
        _ => None,
    }
}

/// Returns the digest conventionally paired with a signature algorithm.
#[must_use]
pub const fn paired_digest(algorithm: SignatureAlgorithm) -> DigestAlgorithm {
    match algorithm {
        SignatureAlgorithm::RsaSha1 => DigestAlgorithm::Sha1,
        SignatureAlgorithm::RsaSha256 | SignatureAlgorithm::EcdsaSha256 => DigestAlgorithm::Sha256,
        SignatureAlgorithm::RsaSha384 | SignatureAlgorithm::EcdsaSha384 => DigestAlgorithm::Sha384,
        SignatureAlgorithm::RsaSha512 => DigestAlgorithm::Sha512,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_uri_roundtrip() {
        for alg in [
            DigestAlgorithm::Sha1,
            DigestAlgorithm::Sha256,
            DigestAlgorithm::Sha384,
            DigestAlgorithm::Sha512,
        ] {
            assert_eq!(digest_from_uri(digest_uri(alg)), Some(alg));
        }
        assert_eq!(digest_from_uri("urn:md5"), None);
    }
}
