//! Keyed message signatures over raw request bodies.
//!
//! Signatures are rendered as `"<algo>=<hex-digest>"`, the format used by the
//! `X-Hub-Signature` family of headers. The same codec authenticates inbound
//! webhooks (with the App secret) and signs relayed copies (with each
//! destination's secret).

use hmac::digest::InvalidLength;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::Sha256;
use std::fmt;
use std::str::FromStr;
use subtle::ConstantTimeEq;
use tracing::{debug, error};

/// Supported keyed-hash algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DigestAlgorithm {
    #[default]
    Sha1,
    Sha256,
}

impl DigestAlgorithm {
    /// Tag written before the `=` in a rendered signature.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Sha1 => "sha1",
            Self::Sha256 => "sha256",
        }
    }

    /// Raw digest size in bytes.
    pub fn digest_size(&self) -> usize {
        match self {
            Self::Sha1 => 20,
            Self::Sha256 => 32,
        }
    }

    /// HTTP header that carries signatures of this algorithm.
    pub fn header_name(&self) -> &'static str {
        match self {
            Self::Sha1 => "X-Hub-Signature",
            Self::Sha256 => "X-Hub-Signature-256",
        }
    }

    /// Exact length of a well-formed rendered signature.
    pub fn signature_len(&self) -> usize {
        self.name().len() + 1 + 2 * self.digest_size()
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DigestAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sha1" => Ok(Self::Sha1),
            "sha256" => Ok(Self::Sha256),
            other => Err(format!("unsupported digest algorithm: {}", other)),
        }
    }
}

/// Signs and verifies bodies with one configured algorithm.
///
/// # Examples
///
/// ```rust
/// use hook_relay_core::{DigestAlgorithm, SignatureCodec};
///
/// let codec = SignatureCodec::new(DigestAlgorithm::Sha256);
/// let signature = codec.sign(b"secret", b"{\"zen\":\"hi\"}");
///
/// assert!(signature.starts_with("sha256="));
/// assert!(codec.verify(b"secret", b"{\"zen\":\"hi\"}", &signature));
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct SignatureCodec {
    algorithm: DigestAlgorithm,
}

impl SignatureCodec {
    pub fn new(algorithm: DigestAlgorithm) -> Self {
        Self { algorithm }
    }

    pub fn algorithm(&self) -> DigestAlgorithm {
        self.algorithm
    }

    /// Render the signature of `body` under `secret`.
    ///
    /// Keying failures are logged and produce a signature with an empty
    /// digest, which never verifies. Signing itself does not fail.
    pub fn sign(&self, secret: &[u8], body: &[u8]) -> String {
        match self.digest(secret, body) {
            Ok(digest) => format!("{}={}", self.algorithm.name(), hex::encode(digest)),
            Err(e) => {
                error!(algorithm = %self.algorithm, error = %e, "Failed to key signature digest");
                format!("{}=", self.algorithm.name())
            }
        }
    }

    /// Check `signature` against a freshly computed digest of `body`.
    ///
    /// Any length, prefix or hex problem is a verification failure.
    pub fn verify(&self, secret: &[u8], body: &[u8], signature: &str) -> bool {
        if signature.len() != self.algorithm.signature_len() {
            debug!(
                expected = self.algorithm.signature_len(),
                actual = signature.len(),
                "Signature has unexpected length"
            );
            return false;
        }

        let Some(hex_digest) = signature
            .strip_prefix(self.algorithm.name())
            .and_then(|rest| rest.strip_prefix('='))
        else {
            debug!(algorithm = %self.algorithm, "Signature prefix does not match algorithm");
            return false;
        };

        let Ok(provided) = hex::decode(hex_digest) else {
            debug!("Signature digest is not valid hex");
            return false;
        };

        match self.digest(secret, body) {
            Ok(expected) => expected.ct_eq(&provided).into(),
            Err(e) => {
                error!(algorithm = %self.algorithm, error = %e, "Failed to key signature digest");
                false
            }
        }
    }

    fn digest(&self, secret: &[u8], body: &[u8]) -> Result<Vec<u8>, InvalidLength> {
        match self.algorithm {
            DigestAlgorithm::Sha1 => {
                let mut mac = Hmac::<Sha1>::new_from_slice(secret)?;
                mac.update(body);
                Ok(mac.finalize().into_bytes().to_vec())
            }
            DigestAlgorithm::Sha256 => {
                let mut mac = Hmac::<Sha256>::new_from_slice(secret)?;
                mac.update(body);
                Ok(mac.finalize().into_bytes().to_vec())
            }
        }
    }
}

#[cfg(test)]
#[path = "signature_tests.rs"]
mod tests;
