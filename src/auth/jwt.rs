//! JWT token generation and verification.
//!
//! Access and refresh tokens are signed with two independent Ed25519 keys, so a
//! token of one kind can never verify as the other.

use jwt_simple::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

use super::session::Scope;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    pub email: String,
    pub company_id: Option<i32>,
    pub scope: Scope,
    pub roles: Vec<String>,
    pub acl_version: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshCustomClaims {
    pub token_id: String,
}

/// Decoded access token.
#[derive(Debug, Clone)]
pub struct Claims {
    pub sub: i32,
    pub email: String,
    pub company_id: Option<i32>,
    pub scope: Scope,
    pub roles: Vec<String>,
    pub acl_version: i32,
    pub exp: i64,
    pub iat: i64,
}

#[derive(Debug, Clone)]
pub struct RefreshClaims {
    pub sub: i32,
    pub token_id: String,
    pub exp: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum JwtKeyError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{0} must be valid base64")]
    Encoding(&'static str),

    #[error("{0} must be a valid Ed25519 key")]
    Key(&'static str),
}

#[derive(Clone)]
pub struct JwtKeys {
    access_key: Arc<Ed25519KeyPair>,
    access_public: Arc<Ed25519PublicKey>,
    refresh_key: Arc<Ed25519KeyPair>,
    refresh_public: Arc<Ed25519PublicKey>,
    pub access_token_expiry: i64,
    pub refresh_token_expiry: i64,
    pub issuer: Option<String>,
    pub audience: Option<String>,
}

fn load_key(var: &'static str) -> Result<Ed25519KeyPair, JwtKeyError> {
    use base64::Engine;

    let encoded = std::env::var(var).map_err(|_| JwtKeyError::Missing(var))?;
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|_| JwtKeyError::Encoding(var))?;
    Ed25519KeyPair::from_bytes(&bytes).map_err(|_| JwtKeyError::Key(var))
}

fn token_seconds(value: Option<UnixTimeStamp>) -> i64 {
    value.map(|t| t.as_secs() as i64).unwrap_or(0)
}

impl JwtKeys {
    /// Reads `JWT_PRIVATE_KEY` and `JWT_REFRESH_PRIVATE_KEY` (base64 Ed25519 keys).
    pub fn from_env(config: &crate::config::JwtConfig) -> Result<Self, JwtKeyError> {
        let access = load_key("JWT_PRIVATE_KEY")?;
        let refresh = load_key("JWT_REFRESH_PRIVATE_KEY")?;

        Ok(Self::from_key_pairs(access, refresh).with_settings(config))
    }

    pub fn from_key_pairs(access: Ed25519KeyPair, refresh: Ed25519KeyPair) -> Self {
        let access_public = access.public_key();
        let refresh_public = refresh.public_key();
        Self {
            access_key: Arc::new(access),
            access_public: Arc::new(access_public),
            refresh_key: Arc::new(refresh),
            refresh_public: Arc::new(refresh_public),
            access_token_expiry: 900,
            refresh_token_expiry: 604_800,
            issuer: None,
            audience: None,
        }
    }

    pub fn generate() -> Self {
        Self::from_key_pairs(Ed25519KeyPair::generate(), Ed25519KeyPair::generate())
    }

    pub fn with_settings(mut self, config: &crate::config::JwtConfig) -> Self {
        self.access_token_expiry = config.access_token_expiry_secs;
        self.refresh_token_expiry = config.refresh_token_expiry_secs;
        self.issuer = config.issuer.clone();
        self.audience = config.audience.clone();
        self
    }

    /// Returns a fresh base64-encoded private key.
    pub fn generate_private_key() -> String {
        use base64::Engine;

        let key_pair = Ed25519KeyPair::generate();
        base64::engine::general_purpose::STANDARD.encode(key_pair.to_bytes())
    }

    fn stamp<T>(&self, claims: JWTClaims<T>) -> JWTClaims<T> {
        let mut claims = claims;
        if let Some(issuer) = &self.issuer {
            claims = claims.with_issuer(issuer);
        }
        if let Some(audience) = &self.audience {
            claims = claims.with_audience(audience);
        }
        claims
    }

    fn verification_options(&self) -> VerificationOptions {
        let mut options = VerificationOptions {
            time_tolerance: Some(Duration::from_secs(30)),
            ..Default::default()
        };
        if let Some(issuer) = &self.issuer {
            options.allowed_issuers = Some(HashSet::from([issuer.clone()]));
        }
        if let Some(audience) = &self.audience {
            options.allowed_audiences = Some(HashSet::from([audience.clone()]));
        }
        options
    }

    pub fn generate_access_token(
        &self,
        user_id: i32,
        claims: AccessClaims,
    ) -> Result<String, jwt_simple::Error> {
        let claims = jwt_simple::claims::Claims::with_custom_claims(
            claims,
            Duration::from_secs(self.access_token_expiry.max(1) as u64),
        )
        .with_subject(user_id.to_string());

        self.access_key.sign(self.stamp(claims))
    }

    pub fn generate_refresh_token(&self, user_id: i32) -> Result<String, jwt_simple::Error> {
        let custom_claims = RefreshCustomClaims {
            token_id: Uuid::new_v4().to_string(),
        };

        let claims = jwt_simple::claims::Claims::with_custom_claims(
            custom_claims,
            Duration::from_secs(self.refresh_token_expiry.max(1) as u64),
        )
        .with_subject(user_id.to_string());

        self.refresh_key.sign(self.stamp(claims))
    }

    pub fn verify_access_token(&self, token: &str) -> Result<Claims, jwt_simple::Error> {
        let token_data = self
            .access_public
            .verify_token::<AccessClaims>(token, Some(self.verification_options()))?;

        let sub = token_data
            .subject
            .as_deref()
            .and_then(|s| s.parse::<i32>().ok())
            .ok_or_else(|| jwt_simple::Error::msg("Token subject is not a user id"))?;

        Ok(Claims {
            sub,
            email: token_data.custom.email,
            company_id: token_data.custom.company_id,
            scope: token_data.custom.scope,
            roles: token_data.custom.roles,
            acl_version: token_data.custom.acl_version,
            exp: token_seconds(token_data.expires_at),
            iat: token_seconds(token_data.issued_at),
        })
    }

    pub fn verify_refresh_token(&self, token: &str) -> Result<RefreshClaims, jwt_simple::Error> {
        let token_data = self
            .refresh_public
            .verify_token::<RefreshCustomClaims>(token, Some(self.verification_options()))?;

        let sub = token_data
            .subject
            .as_deref()
            .and_then(|s| s.parse::<i32>().ok())
            .ok_or_else(|| jwt_simple::Error::msg("Token subject is not a user id"))?;

        Ok(RefreshClaims {
            sub,
            token_id: token_data.custom.token_id,
            exp: token_seconds(token_data.expires_at),
        })
    }
}
