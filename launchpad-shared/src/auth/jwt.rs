/// Bearer token issue and verification
///
/// Tokens are RS256 JWTs signed with the key store's current key. The header
/// carries the signing key's `kid`, which verification uses to pick the public
/// key, so tokens keep verifying across rotations until their key is disabled.
///
/// # Security
///
/// - **Algorithm**: RS256 only; any other `alg` is rejected before key lookup
/// - **Key selection**: `kid` header, required
/// - **Expiration**: `exp` checked with zero leeway
/// - **Internal claims**: never issued and never accepted
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use chrono::{Duration, Utc};
/// use launchpad_shared::auth::claims::Claims;
/// use launchpad_shared::auth::jwt::Authenticator;
/// use launchpad_shared::auth::keystore::{KeyStore, MemoryKeySource, RotationPolicy};
/// use uuid::Uuid;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let keys = KeyStore::new(Arc::new(MemoryKeySource::new()), RotationPolicy::new(Duration::hours(24)), Utc::now()).await?;
/// let authenticator = Authenticator::new(Arc::new(keys));
///
/// let account = Uuid::new_v4();
/// let claims = Claims::new(Uuid::new_v4(), account, vec![account], vec![], Utc::now(), Duration::minutes(60));
/// let token = authenticator.issue(&claims)?;
///
/// assert_eq!(authenticator.verify(&token)?, claims);
/// # Ok(())
/// # }
/// ```

use std::sync::Arc;

use jsonwebtoken::{decode, decode_header, encode, Algorithm, Header, Validation};

use crate::auth::claims::Claims;
use crate::auth::keystore::KeyStore;

/// Error type for token operations
#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    /// Failed to sign a token
    #[error("Failed to create token: {0}")]
    CreateError(String),

    /// Token rejected; the reason is for logs only
    #[error("Invalid token: {0}")]
    InvalidToken(String),
}

/// Issues and verifies bearer tokens
#[derive(Debug, Clone)]
pub struct Authenticator {
    keys: Arc<KeyStore>,
    algorithm: Algorithm,
}

impl Authenticator {
    pub fn new(keys: Arc<KeyStore>) -> Self {
        Self {
            keys,
            algorithm: Algorithm::RS256,
        }
    }

    pub fn keys(&self) -> &Arc<KeyStore> {
        &self.keys
    }

    /// Signs `claims` with the current key
    pub fn issue(&self, claims: &Claims) -> Result<String, JwtError> {
        if claims.is_internal() {
            return Err(JwtError::CreateError("internal claims cannot be issued".to_string()));
        }

        let key = self.keys.current();
        let mut header = Header::new(self.algorithm);
        header.kid = Some(key.kid.clone());

        encode(&header, claims, key.encoding_key()).map_err(|e| JwtError::CreateError(e.to_string()))
    }

    /// Verifies `token` and returns its claims
    ///
    /// # Errors
    ///
    /// `JwtError::InvalidToken` for a malformed token, a different algorithm, a
    /// missing or unknown `kid`, a bad signature, an expired token, or a token
    /// carrying internal claims.
    pub fn verify(&self, token: &str) -> Result<Claims, JwtError> {
        let header = decode_header(token)
            .map_err(|e| JwtError::InvalidToken(format!("malformed header: {}", e)))?;

        if header.alg != self.algorithm {
            return Err(JwtError::InvalidToken(format!("unexpected algorithm {:?}", header.alg)));
        }

        let kid = header
            .kid
            .ok_or_else(|| JwtError::InvalidToken("missing kid".to_string()))?;
        let key = self
            .keys
            .public(&kid)
            .map_err(|_| JwtError::InvalidToken(format!("unknown kid {}", kid)))?;

        let mut validation = Validation::new(self.algorithm);
        validation.validate_aud = false;
        validation.leeway = 0;

        let data = decode::<Claims>(token, key.decoding_key(), &validation)
            .map_err(|e| JwtError::InvalidToken(e.to_string()))?;

        if data.claims.is_internal() {
            return Err(JwtError::InvalidToken("internal claims".to_string()));
        }

        Ok(data.claims)
    }
}
