//! Signed, expiring session tokens.
//!
//! A token is a compact JWT carrying `{userID, expiry}`. The expiry lives in
//! our own claim rather than `exp`, so it's checked here after the signature
//! has been verified.

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use log::{debug, error, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::time::Timestamp;

pub const DEFAULT_TTL_SECS: u64 = 500;

const MIN_SECRET_LEN: usize = 32;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("token secret must not be empty")]
    EmptySecret,
    #[error("unsupported token algorithm {0:?}, expected one of HS256, HS384, HS512")]
    Algorithm(String),
    #[error("token lifetime must be between 1 and {max} seconds")]
    Ttl { max: i64 },
}

/// Fixed for the lifetime of the process.
#[derive(Clone)]
pub struct TokenConfig {
    secret: Vec<u8>,
    algorithm: Algorithm,
    ttl_secs: i64,
}

impl TokenConfig {
    pub fn new(secret: &str, algorithm: &str, ttl_secs: u64) -> Result<Self, ConfigError> {
        if secret.is_empty() {
            return Err(ConfigError::EmptySecret);
        }
        if secret.len() < MIN_SECRET_LEN {
            warn!("token secret is shorter than {MIN_SECRET_LEN} bytes");
        }

        let algorithm = match algorithm {
            "HS256" => Algorithm::HS256,
            "HS384" => Algorithm::HS384,
            "HS512" => Algorithm::HS512,
            other => return Err(ConfigError::Algorithm(other.into())),
        };

        let max = i64::from(u32::MAX);
        let ttl_secs = i64::try_from(ttl_secs)
            .ok()
            .filter(|ttl| (1..=max).contains(ttl))
            .ok_or(ConfigError::Ttl { max })?;

        Ok(Self {
            secret: secret.as_bytes().to_vec(),
            algorithm,
            ttl_secs,
        })
    }
}

impl std::fmt::Debug for TokenConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenConfig")
            .field("secret", &"<redacted>")
            .field("algorithm", &self.algorithm)
            .field("ttl_secs", &self.ttl_secs)
            .finish()
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    #[serde(rename = "userID")]
    user_id: String,
    expiry: Timestamp,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AccessToken {
    pub access_token: String,
}

#[derive(Debug, Error)]
pub enum IssueError {
    #[error("couldn't get the current time")]
    Clock,
    #[error("couldn't sign token: {0}")]
    Sign(#[from] jsonwebtoken::errors::Error),
}

pub struct TokenService {
    header: Header,
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl_secs: i64,
}

impl TokenService {
    pub fn new(config: &TokenConfig) -> Self {
        let mut validation = Validation::new(config.algorithm);
        // no `exp` in our claims, `expiry` is checked by hand
        validation.required_spec_claims.clear();
        validation.validate_exp = false;

        Self {
            header: Header::new(config.algorithm),
            encoding: EncodingKey::from_secret(&config.secret),
            decoding: DecodingKey::from_secret(&config.secret),
            validation,
            ttl_secs: config.ttl_secs,
        }
    }

    pub fn issue(&self, identity: &str) -> Result<AccessToken, IssueError> {
        let now = Timestamp::now().map_err(|()| IssueError::Clock)?;
        self.issue_at(identity, now)
    }

    pub fn issue_at(&self, identity: &str, now: Timestamp) -> Result<AccessToken, IssueError> {
        let claims = Claims {
            user_id: identity.into(),
            expiry: now.plus_secs(self.ttl_secs),
        };

        let access_token = encode(&self.header, &claims, &self.encoding)?;
        debug!("issued token for {identity}, expires {}", claims.expiry);

        Ok(AccessToken { access_token })
    }

    /// The identity the token was issued for, or `None` if the token is
    /// malformed, wrongly signed or expired.
    pub fn verify(&self, token: &str) -> Option<String> {
        match Timestamp::now() {
            Ok(now) => self.verify_at(token, now),
            Err(()) => {
                error!("rejecting token, no clock");
                None
            }
        }
    }

    pub fn verify_at(&self, token: &str, now: Timestamp) -> Option<String> {
        let claims = match decode::<Claims>(token, &self.decoding, &self.validation) {
            Ok(data) => data.claims,
            Err(e) => {
                debug!("token rejected: {e}");
                return None;
            }
        };

        if claims.expiry < now {
            debug!("token for {} expired at {}", claims.user_id, claims.expiry);
            return None;
        }

        Some(claims.user_id)
    }
}
