use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Invalid session token: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),
    #[error("Session token has no email")]
    MissingEmail,
    #[error("Auth secret is not configured")]
    MissingSecret,
}

/// Claims carried by the auth provider's session token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionClaims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
    pub exp: usize,
}

/// A verified session: the identity the auth provider vouches for.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionIdentity {
    pub email: String,
    pub name: Option<String>,
    pub image: Option<String>,
}

pub struct SessionKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl SessionKeys {
    pub fn new(secret: &str) -> Result<Self, SessionError> {
        if secret.is_empty() {
            return Err(SessionError::MissingSecret);
        }

        Ok(Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        })
    }

    pub fn verify(&self, token: &str) -> Result<SessionIdentity, SessionError> {
        let data = decode::<SessionClaims>(token, &self.decoding, &self.validation)?;
        let claims = data.claims;

        let email = claims
            .email
            .map(|e| e.trim().to_lowercase())
            .filter(|e| !e.is_empty())
            .ok_or(SessionError::MissingEmail)?;

        Ok(SessionIdentity {
            email,
            name: claims.name,
            image: claims.picture,
        })
    }

    /// Mints a token with the same secret; used by local tooling and tests.
    pub fn issue(&self, claims: &SessionClaims) -> Result<String, SessionError> {
        Ok(encode(&Header::new(Algorithm::HS256), claims, &self.encoding)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn claims(email: Option<&str>, exp_offset: Duration) -> SessionClaims {
        SessionClaims {
            sub: Some("provider-123".to_string()),
            email: email.map(str::to_string),
            name: Some("Ada".to_string()),
            picture: None,
            exp: (Utc::now() + exp_offset).timestamp() as usize,
        }
    }

    #[test]
    fn verifies_issued_token_and_normalizes_email() {
        let keys = SessionKeys::new("test-secret").unwrap();
        let token = keys.issue(&claims(Some(" Ada@Example.com "), Duration::hours(1))).unwrap();

        let identity = keys.verify(&token).unwrap();
        assert_eq!(identity.email, "ada@example.com");
        assert_eq!(identity.name.as_deref(), Some("Ada"));
    }

    #[test]
    fn rejects_wrong_secret_expired_and_emailless_tokens() {
        let keys = SessionKeys::new("test-secret").unwrap();
        let other = SessionKeys::new("other-secret").unwrap();

        let token = other.issue(&claims(Some("a@b.c"), Duration::hours(1))).unwrap();
        assert!(matches!(keys.verify(&token), Err(SessionError::InvalidToken(_))));

        let expired = keys.issue(&claims(Some("a@b.c"), Duration::hours(-2))).unwrap();
        assert!(matches!(keys.verify(&expired), Err(SessionError::InvalidToken(_))));

        let no_email = keys.issue(&claims(None, Duration::hours(1))).unwrap();
        assert!(matches!(keys.verify(&no_email), Err(SessionError::MissingEmail)));
    }

    #[test]
    fn empty_secret_is_rejected() {
        assert!(matches!(SessionKeys::new(""), Err(SessionError::MissingSecret)));
    }
}
