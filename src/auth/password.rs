//! Password hashing with Argon2id.

use argon2::{
    password_hash::{
        PasswordHash, PasswordHasher as Argon2PasswordHasher, PasswordVerifier, SaltString,
    },
    Argon2, Params,
};
use rand::rngs::OsRng;
use thiserror::Error;

use crate::config::SecurityConfig;

#[derive(Debug, Clone)]
pub struct PasswordPolicy {
    pub min_length: usize,
    /// Requires upper case, lower case, a digit and a symbol.
    pub require_complexity: bool,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            min_length: 8,
            require_complexity: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PasswordPolicyError {
    #[error("Password must be at least {min_length} characters")]
    TooShort { min_length: usize },
    #[error("Password must mix upper and lower case letters, digits and symbols")]
    TooSimple,
}

impl PasswordPolicy {
    pub fn from_config(config: &SecurityConfig) -> Self {
        Self {
            min_length: config.min_password_length,
            require_complexity: config.require_password_complexity,
        }
    }

    pub fn validate(&self, password: &str) -> Result<(), PasswordPolicyError> {
        if password.chars().count() < self.min_length {
            return Err(PasswordPolicyError::TooShort {
                min_length: self.min_length,
            });
        }

        if self.require_complexity {
            let upper = password.chars().any(|c| c.is_uppercase());
            let lower = password.chars().any(|c| c.is_lowercase());
            let digit = password.chars().any(|c| c.is_ascii_digit());
            let symbol = password.chars().any(|c| !c.is_alphanumeric());
            if !(upper && lower && digit && symbol) {
                return Err(PasswordPolicyError::TooSimple);
            }
        }

        Ok(())
    }
}

pub struct PasswordService;

impl PasswordService {
    /// Hashes with Argon2id; memory cost is `2^memory_cost_log2` KiB, capped at 4 GiB.
    pub fn hash_password(
        password: &str,
        memory_cost_log2: u32,
    ) -> Result<String, argon2::password_hash::Error> {
        let salt = SaltString::generate(&mut OsRng);
        let m_cost = 1u32 << memory_cost_log2.clamp(3, 22);

        let params =
            Params::new(m_cost, 3, 1, None).map_err(|_| argon2::password_hash::Error::Algorithm)?;

        let argon2 = Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params);
        Ok(argon2.hash_password(password.as_bytes(), &salt)?.to_string())
    }

    pub fn verify_password(
        password: &str,
        hashed_password: &str,
    ) -> Result<bool, argon2::password_hash::Error> {
        let parsed_hash = PasswordHash::new(hashed_password)?;
        match Argon2::default().verify_password(password.as_bytes(), &parsed_hash) {
            Ok(_) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(e),
        }
    }
}
