// src/auth.rs
use crate::models::User;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[cfg(not(test))]
const HASH_COST: u32 = bcrypt::DEFAULT_COST;
// bcrypt minimum.
#[cfg(test)]
const HASH_COST: u32 = 4;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("could not sign session token: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),

    #[error("could not hash password: {0}")]
    Hash(#[from] bcrypt::BcryptError),
}

#[derive(Serialize, Deserialize)]
struct Claims {
    sub: String,
    exp: usize,
}

/// The authenticated caller, handed explicitly to every mutating operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: i64,
    pub username: String,
    pub is_admin: bool,
}

impl From<&User> for Identity {
    fn from(user: &User) -> Self {
        Identity {
            user_id: user.id,
            username: user.username.clone(),
            is_admin: user.is_admin,
        }
    }
}

/// Signs and checks session tokens.
pub struct SessionKeys {
    secret: Vec<u8>,
    ttl_secs: i64,
}

impl SessionKeys {
    pub fn new(secret: &str, ttl_hours: i64) -> Self {
        SessionKeys {
            secret: secret.as_bytes().to_vec(),
            ttl_secs: ttl_hours * 3600,
        }
    }

    pub fn ttl_secs(&self) -> i64 {
        self.ttl_secs
    }

    pub fn create_token(&self, username: &str) -> Result<String, AuthError> {
        let exp = chrono::Utc::now().timestamp() + self.ttl_secs;
        let claims = Claims {
            sub: username.to_string(),
            exp: exp.max(0) as usize,
        };
        Ok(encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(&self.secret),
        )?)
    }

    /// Returns the username the token was issued to, if it is valid and unexpired.
    pub fn verify_token(&self, token: &str) -> Option<String> {
        decode::<Claims>(
            token,
            &DecodingKey::from_secret(&self.secret),
            &Validation::default(),
        )
        .map(|data| data.claims.sub)
        .ok()
    }
}

pub fn hash_password(password: &str) -> Result<String, AuthError> {
    Ok(bcrypt::hash(password, HASH_COST)?)
}

/// Checks `password` against a bcrypt hash; anything unparsable never matches.
pub fn verify_password(password: &str, stored: &str) -> bool {
    bcrypt::verify(password, stored).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_round_trip() {
        let stored = hash_password("hunter2").unwrap();
        assert!(stored.starts_with("$2b$"));
        assert!(verify_password("hunter2", &stored));
        assert!(!verify_password("hunter3", &stored));
    }

    #[test]
    fn test_same_password_gets_different_salts() {
        let a = hash_password("pw").unwrap();
        let b = hash_password("pw").unwrap();
        assert_ne!(a, b);
        assert!(verify_password("pw", &a));
        assert!(verify_password("pw", &b));
    }

    #[test]
    fn test_garbage_hash_never_verifies() {
        assert!(!verify_password("pw", ""));
        assert!(!verify_password("pw", "plain-text"));
        assert!(!verify_password("pw", "md5$00$00"));
        assert!(!verify_password("pw", "$2b$04$not-a-real-hash"));
    }

    #[test]
    fn test_token_round_trip() {
        let keys = SessionKeys::new("secret", 1);
        let token = keys.create_token("alice").unwrap();
        assert_eq!(keys.verify_token(&token).as_deref(), Some("alice"));
    }

    #[test]
    fn test_token_signed_with_other_secret_is_rejected() {
        let token = SessionKeys::new("one", 1).create_token("alice").unwrap();
        assert_eq!(SessionKeys::new("two", 1).verify_token(&token), None);
        assert_eq!(SessionKeys::new("one", 1).verify_token("not-a-token"), None);
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let keys = SessionKeys::new("secret", -2);
        let token = keys.create_token("alice").unwrap();
        assert_eq!(keys.verify_token(&token), None);
    }
}
