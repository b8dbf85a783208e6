/// Bearer token verification
///
/// Stateless: checks signature, issuer, audience and expiry of a presented
/// JWT and returns typed claims. Any failure is an `InvalidToken`.
use crate::{
    config::TokenConfig,
    error::{GateError, GateResult},
};
use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::{decode, errors::ErrorKind, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Claims as they appear on the wire
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireClaims {
    pub sub: String,
    pub email: String,
    pub role: String,
    #[serde(default, alias = "sessionId", skip_serializing_if = "Option::is_none")]
    pub sid: Option<String>,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
    pub aud: String,
}

/// Verified payload of a presented credential
#[derive(Debug, Clone, PartialEq)]
pub struct TokenClaims {
    /// The account's public id
    pub subject: String,
    pub email: String,
    pub role: String,
    pub session_id: Option<String>,
    pub issued_at: DateTime<Utc>,
}

impl TryFrom<WireClaims> for TokenClaims {
    type Error = GateError;

    fn try_from(wire: WireClaims) -> GateResult<Self> {
        let issued_at = Utc
            .timestamp_opt(wire.iat, 0)
            .single()
            .ok_or_else(|| GateError::InvalidToken("iat out of range".to_string()))?;

        Ok(TokenClaims {
            subject: wire.sub,
            email: wire.email,
            role: wire.role,
            session_id: wire.sid.filter(|sid| !sid.is_empty()),
            issued_at,
        })
    }
}

/// JWT verifier bound to one secret, algorithm, issuer and audience
#[derive(Clone)]
pub struct TokenVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl std::fmt::Debug for TokenVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenVerifier")
            .field("algorithms", &self.validation.algorithms)
            .finish_non_exhaustive()
    }
}

/// Parse an HMAC algorithm name
pub fn parse_algorithm(name: &str) -> GateResult<Algorithm> {
    let algorithm = Algorithm::from_str(&name.to_uppercase())
        .map_err(|_| GateError::Validation(format!("Unknown JWT algorithm: {}", name)))?;

    match algorithm {
        Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => Ok(algorithm),
        other => Err(GateError::Validation(format!(
            "Unsupported JWT algorithm {:?}: only HMAC secrets are supported",
            other
        ))),
    }
}

impl TokenVerifier {
    pub fn new(config: &TokenConfig) -> GateResult<Self> {
        let algorithm = parse_algorithm(&config.algorithm)?;

        let mut validation = Validation::new(algorithm);
        validation.leeway = config.leeway_secs;
        validation.set_issuer(&[config.issuer.as_str()]);
        validation.set_audience(&[config.audience.as_str()]);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);

        Ok(Self {
            key: DecodingKey::from_secret(config.secret.as_bytes()),
            validation,
        })
    }

    /// Verify a raw token and return its claims
    pub fn verify(&self, token: &str) -> GateResult<TokenClaims> {
        let data = decode::<WireClaims>(token, &self.key, &self.validation).map_err(|e| {
            tracing::debug!("JWT verification failed: {}", e);
            match e.kind() {
                ErrorKind::ExpiredSignature => GateError::InvalidToken("token has expired".into()),
                ErrorKind::InvalidSignature => {
                    GateError::InvalidToken("invalid token signature".into())
                }
                ErrorKind::InvalidIssuer => GateError::InvalidToken("wrong issuer".into()),
                ErrorKind::InvalidAudience => GateError::InvalidToken("wrong audience".into()),
                _ => GateError::InvalidToken(format!("malformed token: {}", e)),
            }
        })?;

        TokenClaims::try_from(data.claims)
    }
}
