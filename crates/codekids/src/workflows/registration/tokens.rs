use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::config::VerificationConfig;

/// Path the verification link points at, relative to the public URL.
pub const VERIFY_PATH: &str = "/api/v1/registrations/verify";

const TOKEN_ID_LEN: usize = 21;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationClaims {
    /// Email address being verified.
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
    /// Single-use identifier.
    pub jti: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("verification token is invalid")]
    Invalid,
    #[error("verification token has expired")]
    Expired,
    #[error("verification token has already been used")]
    AlreadyUsed,
    #[error("unable to sign verification token: {0}")]
    Signing(String),
}

/// Issues and checks signed, expiring, single-use verification tokens.
pub struct VerificationTokens {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl: chrono::Duration,
    public_url: String,
    /// Redeemed token ids with their expiry (unix seconds).
    redeemed: Mutex<HashMap<String, i64>>,
}

impl fmt::Debug for VerificationTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerificationTokens")
            .field("ttl", &self.ttl)
            .field("public_url", &self.public_url)
            .finish_non_exhaustive()
    }
}

impl VerificationTokens {
    pub fn new(secret: &str, ttl: chrono::Duration, public_url: impl Into<String>) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
            public_url: public_url.into(),
            redeemed: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &VerificationConfig) -> Self {
        Self::new(&config.secret, config.token_ttl, config.public_url.clone())
    }

    pub fn issue(&self, email: &str) -> Result<String, TokenError> {
        self.issue_at(email, Utc::now())
    }

    pub fn issue_at(&self, email: &str, now: DateTime<Utc>) -> Result<String, TokenError> {
        let claims = VerificationClaims {
            sub: email.to_string(),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
            jti: nanoid::nanoid!(TOKEN_ID_LEN),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|err| TokenError::Signing(err.to_string()))
    }

    /// Full link to embed in the confirmation email.
    pub fn link_for(&self, email: &str) -> Result<String, TokenError> {
        let token = self.issue(email)?;
        Ok(format!("{}{VERIFY_PATH}?token={token}", self.public_url))
    }

    /// Check signature and expiry. Does not consume the token.
    pub fn decode(&self, token: &str) -> Result<VerificationClaims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        decode::<VerificationClaims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|err| match err.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid,
            })
    }

    /// Reserve a token id. Fails if it was already redeemed or is being redeemed.
    ///
    /// Ids whose token has expired are dropped first; `decode` refuses those
    /// tokens anyway.
    pub(crate) fn claim(&self, jti: &str, exp: i64) -> Result<(), TokenError> {
        self.claim_at(jti, exp, Utc::now())
    }

    fn claim_at(&self, jti: &str, exp: i64, now: DateTime<Utc>) -> Result<(), TokenError> {
        let mut redeemed = self
            .redeemed
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let now = now.timestamp();
        redeemed.retain(|_, expires| *expires >= now);

        if redeemed.contains_key(jti) {
            return Err(TokenError::AlreadyUsed);
        }
        redeemed.insert(jti.to_string(), exp);
        Ok(())
    }

    /// Give a reserved id back after a failed redemption.
    pub(crate) fn release(&self, jti: &str) {
        self.redeemed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(jti);
    }
}
