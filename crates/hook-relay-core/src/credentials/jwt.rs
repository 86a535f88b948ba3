//! App-level authentication with RS256 JSON Web Tokens.
//!
//! The App authenticates as itself with a JWT signed by its private key:
//! - `iss` is the numeric App id
//! - `iat` is backdated 60 seconds to tolerate clock drift
//! - `exp` is at most 10 minutes after issuance
//!
//! Installation-level calls use installation credentials instead; see
//! [`crate::credentials::CredentialCache`].

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::RsaPrivateKey;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::RwLock;
use tracing::debug;
use zeroize::Zeroizing;

use crate::error::AuthError;
use crate::AppId;

const MAX_JWT_LIFETIME_MINUTES: i64 = 10;
const CLOCK_DRIFT_SECONDS: i64 = 60;

/// PEM-encoded RSA private key of the App.
#[derive(Clone)]
pub struct PrivateKey {
    key_data: Zeroizing<Vec<u8>>,
}

impl PrivateKey {
    /// Parse and validate a PKCS#1 or PKCS#8 PEM key.
    pub fn from_pem(pem: &str) -> Result<Self, AuthError> {
        let pem = pem.trim();

        if pem.is_empty() {
            return Err(AuthError::InvalidPrivateKey {
                message: "PEM string cannot be empty".to_string(),
            });
        }

        if !pem.contains("-----BEGIN") || !pem.contains("-----END") {
            return Err(AuthError::InvalidPrivateKey {
                message: "Invalid PEM format: missing BEGIN/END markers".to_string(),
            });
        }

        RsaPrivateKey::from_pkcs1_pem(pem)
            .map(|_| ())
            .or_else(|_| RsaPrivateKey::from_pkcs8_pem(pem).map(|_| ()))
            .map_err(|e| AuthError::InvalidPrivateKey {
                message: format!("Failed to parse RSA private key: {}", e),
            })?;

        Ok(Self {
            key_data: Zeroizing::new(pem.as_bytes().to_vec()),
        })
    }

    /// Read a key from disk. A missing or empty file is an error.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, AuthError> {
        let path = path.as_ref();
        let pem = Zeroizing::new(std::fs::read_to_string(path).map_err(|e| {
            AuthError::InvalidPrivateKey {
                message: format!("Failed to read private key file {}: {}", path.display(), e),
            }
        })?);

        if pem.trim().is_empty() {
            return Err(AuthError::InvalidPrivateKey {
                message: format!("Private key file {} is empty", path.display()),
            });
        }

        Self::from_pem(&pem)
    }

    fn key_data(&self) -> &[u8] {
        &self.key_data
    }
}

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrivateKey")
            .field("key_data", &"<REDACTED>")
            .finish()
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct JwtClaims {
    pub iss: u64,
    pub iat: i64,
    pub exp: i64,
}

/// A signed App JWT.
#[derive(Clone)]
pub struct JsonWebToken {
    token: String,
    app_id: AppId,
    expires_at: DateTime<Utc>,
}

impl JsonWebToken {
    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn app_id(&self) -> AppId {
        self.app_id
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Whether the token expires within `margin` from now.
    pub fn expires_soon(&self, margin: Duration) -> bool {
        Utc::now() + margin >= self.expires_at
    }
}

impl std::fmt::Debug for JsonWebToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonWebToken")
            .field("token", &"<REDACTED>")
            .field("app_id", &self.app_id)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Produces App JWTs, reusing the last one until it nears expiry.
pub struct AppJwtGenerator {
    app_id: AppId,
    private_key: PrivateKey,
    lifetime: Duration,
    current: RwLock<Option<JsonWebToken>>,
}

impl AppJwtGenerator {
    pub fn new(app_id: AppId, private_key: PrivateKey) -> Self {
        Self {
            app_id,
            private_key,
            lifetime: Duration::minutes(MAX_JWT_LIFETIME_MINUTES),
            current: RwLock::new(None),
        }
    }

    pub fn app_id(&self) -> AppId {
        self.app_id
    }

    /// Return a JWT valid for at least another minute.
    pub fn token(&self) -> Result<JsonWebToken, AuthError> {
        if let Ok(current) = self.current.read() {
            if let Some(jwt) = current.as_ref() {
                if !jwt.expires_soon(Duration::seconds(CLOCK_DRIFT_SECONDS)) {
                    return Ok(jwt.clone());
                }
            }
        }

        let jwt = self.generate()?;
        if let Ok(mut current) = self.current.write() {
            *current = Some(jwt.clone());
        }
        Ok(jwt)
    }

    /// Sign a brand-new JWT.
    pub fn generate(&self) -> Result<JsonWebToken, AuthError> {
        let now = Utc::now();
        let expires_at = now + self.lifetime;
        let claims = JwtClaims {
            iss: self.app_id.as_u64(),
            iat: (now - Duration::seconds(CLOCK_DRIFT_SECONDS)).timestamp(),
            exp: expires_at.timestamp(),
        };

        let encoding_key = EncodingKey::from_rsa_pem(self.private_key.key_data()).map_err(|e| {
            AuthError::InvalidPrivateKey {
                message: format!("Failed to create encoding key: {}", e),
            }
        })?;

        let token = encode(&Header::new(Algorithm::RS256), &claims, &encoding_key).map_err(|e| {
            AuthError::JwtGenerationFailed {
                message: format!("Failed to encode JWT: {}", e),
            }
        })?;

        debug!(app_id = %self.app_id, "Generated App JWT");

        Ok(JsonWebToken {
            token,
            app_id: self.app_id,
            expires_at,
        })
    }
}

#[cfg(test)]
#[path = "jwt_tests.rs"]
mod tests;
