//! Bearer token decoding + signature verification.
//!
//! The HTTP middleware hands tokens to a [`JwtValidator`]; the default
//! implementation verifies an HS256 signature with a shared secret and maps
//! the wire claims onto [`JwtClaims`].

use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use facturier_core::AccountId;

use crate::claims::{JwtClaims, validate_claims};
use crate::{PrincipalId, Role};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum JwtError {
    #[error("token decoding failed: {0}")]
    Decode(String),

    #[error("token claims rejected: {0}")]
    Claims(#[from] crate::claims::TokenValidationError),
}

/// Validates a raw bearer token into domain claims.
pub trait JwtValidator: Send + Sync {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<JwtClaims, JwtError>;
}

/// Wire-level claim layout (RFC 7519 numeric dates).
#[derive(Debug, Serialize, Deserialize)]
struct WireClaims {
    sub: Uuid,
    account_id: Uuid,
    #[serde(default)]
    roles: Vec<String>,
    iat: i64,
    exp: i64,
}

/// HS256 validator backed by a shared secret.
pub struct Hs256JwtValidator {
    key: DecodingKey,
}

impl Hs256JwtValidator {
    pub fn new(secret: Vec<u8>) -> Self {
        Self {
            key: DecodingKey::from_secret(&secret),
        }
    }
}

impl JwtValidator for Hs256JwtValidator {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<JwtClaims, JwtError> {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is checked deterministically below against the caller's clock.
        validation.validate_exp = false;
        validation.required_spec_claims.clear();

        let data = decode::<WireClaims>(token, &self.key, &validation)
            .map_err(|e| JwtError::Decode(e.to_string()))?;

        let wire = data.claims;
        let claims = JwtClaims {
            sub: PrincipalId::from_uuid(wire.sub),
            account_id: AccountId::from_uuid(wire.account_id),
            roles: wire.roles.into_iter().map(Role::new).collect(),
            issued_at: timestamp(wire.iat)?,
            expires_at: timestamp(wire.exp)?,
        };

        validate_claims(&claims, now)?;
        Ok(claims)
    }
}

fn timestamp(secs: i64) -> Result<DateTime<Utc>, JwtError> {
    Utc.timestamp_opt(secs, 0)
        .single()
        .ok_or_else(|| JwtError::Decode(format!("timestamp out of range: {secs}")))
}
