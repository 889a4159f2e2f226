//! Bearer token issuance and verification.

use jwt_simple::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    pub username: String,
}

/// Verified token contents.
#[derive(Debug, Clone)]
pub struct Claims {
    pub sub: String,
    pub username: String,
    pub exp: i64,
    pub iat: i64,
}

impl Claims {
    pub fn user_id(&self) -> Option<Uuid> {
        Uuid::parse_str(&self.sub).ok()
    }
}

#[derive(Clone)]
pub struct JwtConfig {
    key_pair: Arc<Ed25519KeyPair>,
    public_key: Arc<Ed25519PublicKey>,
    pub access_token_expiry: i64,
    pub issuer: Option<String>,
    pub audience: Option<String>,
}

impl JwtConfig {
    /// Expects JWT_PRIVATE_KEY env var (base64-encoded Ed25519 key).
    pub fn from_env_with_expiry(
        access_token_expiry: i64,
        issuer: Option<String>,
        audience: Option<String>,
    ) -> Self {
        use base64::Engine;

        let private_key_b64 =
            std::env::var("JWT_PRIVATE_KEY").expect("JWT_PRIVATE_KEY must be set");

        let key_bytes = base64::engine::general_purpose::STANDARD
            .decode(&private_key_b64)
            .expect("JWT_PRIVATE_KEY must be valid base64");

        let key_pair = Ed25519KeyPair::from_bytes(&key_bytes)
            .expect("JWT_PRIVATE_KEY must be a valid Ed25519 key");

        let mut config = Self::from_key_pair(key_pair);
        config.access_token_expiry = access_token_expiry;
        config.issuer = issuer;
        config.audience = audience;
        config
    }

    pub fn from_key_pair(key_pair: Ed25519KeyPair) -> Self {
        let public_key = key_pair.public_key();
        Self {
            key_pair: Arc::new(key_pair),
            public_key: Arc::new(public_key),
            access_token_expiry: 1800,
            issuer: None,
            audience: None,
        }
    }

    pub fn generate_key_pair() -> (String, String) {
        use base64::Engine;

        let key_pair = Ed25519KeyPair::generate();
        let private_b64 = base64::engine::general_purpose::STANDARD.encode(key_pair.to_bytes());
        let public_b64 =
            base64::engine::general_purpose::STANDARD.encode(key_pair.public_key().to_bytes());
        (private_b64, public_b64)
    }

    pub fn generate_access_token(
        &self,
        user_id: Uuid,
        username: &str,
    ) -> Result<String, jwt_simple::Error> {
        let custom_claims = AccessClaims {
            username: username.to_string(),
        };

        let mut claims = jwt_simple::claims::Claims::with_custom_claims(
            custom_claims,
            Duration::from_secs(self.access_token_expiry as u64),
        )
        .with_subject(user_id.to_string());

        if let Some(issuer) = &self.issuer {
            claims = claims.with_issuer(issuer);
        }
        if let Some(audience) = &self.audience {
            claims = claims.with_audience(audience);
        }

        self.key_pair.sign(claims)
    }

    pub fn verify_access_token(&self, token: &str) -> Result<Claims, jwt_simple::Error> {
        let mut options = VerificationOptions::default();
        if let Some(issuer) = &self.issuer {
            options.allowed_issuers = Some(std::collections::HashSet::from([issuer.clone()]));
        }
        if let Some(audience) = &self.audience {
            options.allowed_audiences = Some(std::collections::HashSet::from([audience.clone()]));
        }

        let token_data = self
            .public_key
            .verify_token::<AccessClaims>(token, Some(options))?;

        Ok(Claims {
            sub: token_data.subject.unwrap_or_default(),
            username: token_data.custom.username,
            exp: token_data
                .expires_at
                .map(|t| t.as_secs() as i64)
                .unwrap_or(0),
            iat: token_data
                .issued_at
                .map(|t| t.as_secs() as i64)
                .unwrap_or(0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> JwtConfig {
        JwtConfig::from_key_pair(Ed25519KeyPair::generate())
    }

    #[test]
    fn test_generate_and_verify_access_token() {
        let config = test_config();
        let user_id = Uuid::new_v4();

        let token = config
            .generate_access_token(user_id, "alice")
            .expect("Token generation should succeed");

        let claims = config
            .verify_access_token(&token)
            .expect("Token verification should succeed");

        assert_eq!(claims.sub, user_id.to_string());
        assert_eq!(claims.user_id(), Some(user_id));
        assert_eq!(claims.username, "alice");
        assert_eq!(claims.exp - claims.iat, 1800);
    }

    #[test]
    fn test_invalid_token_fails_verification() {
        let config = test_config();
        assert!(config.verify_access_token("invalid.token.here").is_err());
    }

    #[test]
    fn test_wrong_key_fails_verification() {
        let config1 = test_config();
        let config2 = test_config();

        let token = config1
            .generate_access_token(Uuid::new_v4(), "alice")
            .expect("Token generation should succeed");

        assert!(config2.verify_access_token(&token).is_err());
    }

    #[test]
    fn test_issuer_mismatch_fails_verification() {
        let mut signer = test_config();
        signer.issuer = Some("someone-else".to_string());
        let mut verifier = signer.clone();
        verifier.issuer = Some("taskboard".to_string());

        let token = signer
            .generate_access_token(Uuid::new_v4(), "alice")
            .expect("Token generation should succeed");

        assert!(verifier.verify_access_token(&token).is_err());
    }

    #[test]
    fn test_key_generation_round_trips_through_base64() {
        use base64::Engine;

        let (private_b64, public_b64) = JwtConfig::generate_key_pair();
        assert!(!public_b64.is_empty());

        let key_bytes = base64::engine::general_purpose::STANDARD
            .decode(&private_b64)
            .unwrap();
        let config = JwtConfig::from_key_pair(Ed25519KeyPair::from_bytes(&key_bytes).unwrap());

        let token = config
            .generate_access_token(Uuid::new_v4(), "bob")
            .unwrap();
        assert!(config.verify_access_token(&token).is_ok());
    }
}
