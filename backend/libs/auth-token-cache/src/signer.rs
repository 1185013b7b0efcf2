//! Token signing port and its HS256 JWT implementation

use crate::error::{AuthError, AuthResult};
use crate::models::{UserRole, UserSnapshot};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Claims carried by an access token.
///
/// Everything except `exp` is optional when decoding so that tokens signed
/// elsewhere can still be inspected. A token without a `jti` cannot be
/// tracked by the cache and is rejected by the validation gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject (user ID)
    #[serde(default)]
    pub sub: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub role: UserRole,
    /// Token ID, the cache key of the token record
    #[serde(default)]
    pub jti: String,
    #[serde(default)]
    pub iat: i64,
    pub exp: i64,
}

impl TokenClaims {
    pub fn for_user(user: &UserSnapshot, jti: String, iat: i64, exp: i64) -> Self {
        Self {
            sub: user.id.clone(),
            username: user.username.clone(),
            role: user.role,
            jti,
            iat,
            exp,
        }
    }
}

#[cfg_attr(test, mockall::automock)]
pub trait TokenSigner: Send + Sync {
    fn sign(&self, claims: &TokenClaims) -> AuthResult<String>;

    /// Read the claims without checking signature or expiry
    fn decode(&self, token: &str) -> Option<TokenClaims>;

    /// Check signature and expiry, then return the claims
    fn verify(&self, token: &str) -> AuthResult<TokenClaims>;
}

/// HS256 signer over a shared secret
pub struct JwtSigner {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl JwtSigner {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }
}

impl TokenSigner for JwtSigner {
    fn sign(&self, claims: &TokenClaims) -> AuthResult<String> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|e| AuthError::Signing(e.to_string()))
    }

    fn decode(&self, token: &str) -> Option<TokenClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.insecure_disable_signature_validation();
        validation.validate_exp = false;
        validation.required_spec_claims = HashSet::new();

        decode::<TokenClaims>(token, &self.decoding, &validation)
            .ok()
            .map(|data| data.claims)
    }

    fn verify(&self, token: &str) -> AuthResult<TokenClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        decode::<TokenClaims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|_| AuthError::InvalidToken)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    const SECRET: &[u8] = b"a-test-secret-that-is-at-least-32-bytes";

    fn claims(exp_offset: i64) -> TokenClaims {
        let now = Utc::now().timestamp();
        TokenClaims {
            sub: "u1".into(),
            username: "ada".into(),
            role: UserRole::Admin,
            jti: "jti-1".into(),
            iat: now,
            exp: now + exp_offset,
        }
    }

    #[test]
    fn test_sign_and_verify() {
        let signer = JwtSigner::new(SECRET);
        let token = signer.sign(&claims(3600)).unwrap();

        let verified = signer.verify(&token).unwrap();
        assert_eq!(verified.sub, "u1");
        assert_eq!(verified.jti, "jti-1");
        assert_eq!(verified.role, UserRole::Admin);
    }

    #[test]
    fn test_verify_rejects_expired_and_foreign_tokens() {
        let signer = JwtSigner::new(SECRET);
        let expired = signer.sign(&claims(-10)).unwrap();
        assert!(matches!(signer.verify(&expired), Err(AuthError::InvalidToken)));

        let other = JwtSigner::new(b"another-secret-that-is-also-32-bytes!!");
        let foreign = other.sign(&claims(3600)).unwrap();
        assert!(matches!(signer.verify(&foreign), Err(AuthError::InvalidToken)));
        assert!(matches!(signer.verify("garbage"), Err(AuthError::InvalidToken)));
    }

    #[test]
    fn test_decode_ignores_signature_and_expiry() {
        let signer = JwtSigner::new(SECRET);
        let other = JwtSigner::new(b"another-secret-that-is-also-32-bytes!!");
        let token = other.sign(&claims(-10)).unwrap();

        let decoded = signer.decode(&token).unwrap();
        assert_eq!(decoded.jti, "jti-1");
        assert!(signer.decode("garbage").is_none());
    }

    #[test]
    fn test_missing_jti_decodes_as_empty() {
        #[derive(Serialize)]
        struct Bare {
            sub: String,
            exp: i64,
        }

        let token = encode(
            &Header::new(Algorithm::HS256),
            &Bare {
                sub: "u1".into(),
                exp: Utc::now().timestamp() + 60,
            },
            &EncodingKey::from_secret(SECRET),
        )
        .unwrap();

        let claims = JwtSigner::new(SECRET).verify(&token).unwrap();
        assert!(claims.jti.is_empty());
    }
}
