//! Password hashing with Argon2id and the password policy applied at registration.

use argon2::{
    password_hash::{
        PasswordHash, PasswordHasher as Argon2PasswordHasher, PasswordVerifier, SaltString,
    },
    Argon2, Params,
};
use rand::rngs::OsRng;

use crate::config::SecurityConfig;
use crate::error::ServiceError;

#[derive(Debug, Clone)]
pub struct PasswordPolicy {
    pub min_length: usize,
    pub require_uppercase: bool,
    pub require_lowercase: bool,
    pub require_digit: bool,
    pub require_special: bool,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            min_length: 8,
            require_uppercase: false,
            require_lowercase: false,
            require_digit: false,
            require_special: false,
        }
    }
}

impl PasswordPolicy {
    pub fn complex(min_length: usize) -> Self {
        Self {
            min_length,
            require_uppercase: true,
            require_lowercase: true,
            require_digit: true,
            require_special: true,
        }
    }

    pub fn from_config(security: &SecurityConfig) -> Self {
        if security.require_password_complexity {
            Self::complex(security.min_password_length)
        } else {
            Self {
                min_length: security.min_password_length,
                ..Default::default()
            }
        }
    }

    pub fn validate(&self, password: &str) -> Result<(), PasswordPolicyError> {
        if password.chars().count() < self.min_length {
            return Err(PasswordPolicyError::TooShort {
                min_length: self.min_length,
            });
        }
        if self.require_uppercase && !password.chars().any(|c| c.is_uppercase()) {
            return Err(PasswordPolicyError::MissingUppercase);
        }
        if self.require_lowercase && !password.chars().any(|c| c.is_lowercase()) {
            return Err(PasswordPolicyError::MissingLowercase);
        }
        if self.require_digit && !password.chars().any(|c| c.is_ascii_digit()) {
            return Err(PasswordPolicyError::MissingDigit);
        }
        if self.require_special && password.chars().all(|c| c.is_alphanumeric()) {
            return Err(PasswordPolicyError::MissingSpecial);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PasswordPolicyError {
    #[error("Password must be at least {min_length} characters")]
    TooShort { min_length: usize },

    #[error("Password must contain at least one uppercase letter")]
    MissingUppercase,

    #[error("Password must contain at least one lowercase letter")]
    MissingLowercase,

    #[error("Password must contain at least one digit")]
    MissingDigit,

    #[error("Password must contain at least one special character")]
    MissingSpecial,
}

impl From<PasswordPolicyError> for ServiceError {
    fn from(err: PasswordPolicyError) -> Self {
        ServiceError::Validation(err.to_string())
    }
}

/// Well-formed Argon2id hash that matches no password. Verifying against it
/// costs the same as a real check at the default hash cost.
const UNMATCHABLE_HASH: &str =
    "$argon2id$v=19$m=4096,t=3,p=1$Q96VXPuOPK/r2UR+znN06w$3ejWsut0fY+qmFwNvsOso38jmPTvPDdwfKqWPFOwUKw";

pub struct PasswordService;

impl PasswordService {
    /// Hashes with Argon2id using `2^memory_cost_log2` KiB of memory.
    ///
    /// Tests use 4; production deployments should stay at 16 or above.
    pub fn hash_password_with_cost(
        password: &str,
        memory_cost_log2: u32,
    ) -> Result<String, argon2::password_hash::Error> {
        let salt = SaltString::generate(&mut OsRng);
        // Argon2 rejects anything below 8 KiB.
        let m_cost = (1u32 << memory_cost_log2.min(22)).max(Params::MIN_M_COST);

        let params =
            Params::new(m_cost, 3, 1, None).map_err(|_| argon2::password_hash::Error::Algorithm)?;
        let argon2 = Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params);

        Ok(argon2.hash_password(password.as_bytes(), &salt)?.to_string())
    }

    /// Hashes and maps hashing failures into the service error space.
    pub fn hash(password: &str, memory_cost_log2: u32) -> Result<String, ServiceError> {
        Self::hash_password_with_cost(password, memory_cost_log2)
            .map_err(|e| ServiceError::Internal(format!("Password hashing failed: {}", e)))
    }

    pub fn verify_password(
        password: &str,
        password_hash: &str,
    ) -> Result<bool, argon2::password_hash::Error> {
        let parsed_hash = PasswordHash::new(password_hash)?;
        match Argon2::default().verify_password(password.as_bytes(), &parsed_hash) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Burns one verification for a login whose account does not exist.
    pub fn verify_unknown_account(password: &str) {
        let _ = Self::verify_password(password, UNMATCHABLE_HASH);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify_password() {
        let hash = PasswordService::hash_password_with_cost("secure_password_123", 4)
            .expect("Hashing should succeed");

        assert!(hash.starts_with("$argon2id$"));
        assert!(PasswordService::verify_password("secure_password_123", &hash).unwrap());
        assert!(!PasswordService::verify_password("wrong_password", &hash).unwrap());
    }

    #[test]
    fn test_unique_salts() {
        let hash1 = PasswordService::hash_password_with_cost("same_password", 4).unwrap();
        let hash2 = PasswordService::hash_password_with_cost("same_password", 4).unwrap();
        assert_ne!(hash1, hash2);
    }

    #[test]
    fn test_unmatchable_hash_parses_and_rejects() {
        assert!(!PasswordService::verify_password("password123", UNMATCHABLE_HASH).unwrap());
        assert!(!PasswordService::verify_password("", UNMATCHABLE_HASH).unwrap());
    }

    #[test]
    fn test_malformed_hash_is_an_error() {
        assert!(PasswordService::verify_password("anything", "not-a-phc-string").is_err());
    }

    #[test]
    fn test_password_policy_default() {
        let policy = PasswordPolicy::default();
        assert!(policy.validate("password").is_ok());
        assert_eq!(
            policy.validate("short"),
            Err(PasswordPolicyError::TooShort { min_length: 8 })
        );
    }

    #[test]
    fn test_password_policy_complex() {
        let policy = PasswordPolicy::complex(8);

        assert_eq!(
            policy.validate("password1!"),
            Err(PasswordPolicyError::MissingUppercase)
        );
        assert_eq!(
            policy.validate("PASSWORD1!"),
            Err(PasswordPolicyError::MissingLowercase)
        );
        assert_eq!(
            policy.validate("Password!"),
            Err(PasswordPolicyError::MissingDigit)
        );
        assert_eq!(
            policy.validate("Password1"),
            Err(PasswordPolicyError::MissingSpecial)
        );
        assert!(policy.validate("Password1!").is_ok());
    }

    #[test]
    fn test_policy_error_becomes_validation_error() {
        let err: ServiceError = PasswordPolicyError::TooShort { min_length: 10 }.into();
        assert!(matches!(err, ServiceError::Validation(_)));
        assert!(err.to_string().contains("10 characters"));
    }
}
