//! Handshake tokens minted per job and carried back on the completion
//! callback.
//!
//! The token is the only credential an external worker holds. It binds a
//! single job id and job type, so a leaked token cannot be replayed against
//! any other job. Verification failures all collapse to
//! [`EngineError::Unauthorized`] and carry no detail.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use vellum_core::types::{JobId, JobType};

use crate::error::EngineError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakeClaims {
    /// Job id the token is bound to.
    pub sub: String,
    /// Job type recorded at issue time.
    pub job_type: String,
    pub iss: String,
    pub exp: i64,
}

impl HandshakeClaims {
    pub fn job_id(&self) -> JobId {
        JobId::new(self.sub.clone())
    }
}

/// Issues and verifies HS256-signed handshake tokens.
#[derive(Clone)]
pub struct TokenIssuer {
    issuer: String,
    ttl: Duration,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl std::fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("issuer", &self.issuer)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl TokenIssuer {
    pub fn new(issuer: impl Into<String>, ttl_secs: u64, secret: &[u8]) -> Self {
        Self {
            issuer: issuer.into(),
            ttl: Duration::seconds(ttl_secs as i64),
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
        }
    }

    pub fn issue(&self, job_id: &JobId, job_type: &JobType) -> Result<String, EngineError> {
        let claims = HandshakeClaims {
            sub: job_id.0.clone(),
            job_type: job_type.as_str().to_string(),
            iss: self.issuer.clone(),
            exp: (Utc::now() + self.ttl).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|_| EngineError::Unauthorized)
    }

    /// Checks signature, expiry, and issuer. Any failure maps to the same
    /// opaque error so callers cannot distinguish forged from expired.
    pub fn verify(&self, token: &str) -> Result<HandshakeClaims, EngineError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_issuer(&[self.issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);

        decode::<HandshakeClaims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|_| EngineError::Unauthorized)
    }
}
