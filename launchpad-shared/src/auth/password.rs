/// Password hashing module using Argon2id
///
/// Users carry two password columns: a random `password_salt` and a
/// `password_hash`. The hash is an Argon2id PHC string computed over
/// `password || password_salt`; Argon2 embeds its own random salt as well, so
/// the stored salt is an application-level pepper per user that is re-rolled
/// on every password change.
///
/// # Security
///
/// - **Algorithm**: Argon2id (hybrid of Argon2i and Argon2d)
/// - **Memory**: 64 MB (65536 KB)
/// - **Iterations**: 3 passes
/// - **Parallelism**: 4 lanes
/// - **Output**: 32-byte hash
///
/// Hashing is CPU and memory heavy, so the async helpers run it on the
/// blocking thread pool.
///
/// # Example
///
/// ```
/// use launchpad_shared::auth::password::{generate_salt, hash_password, verify_password};
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let salt = generate_salt();
/// let hash = hash_password("pw!Fr0nt1er", &salt)?;
///
/// assert!(verify_password("pw!Fr0nt1er", &salt, &hash)?);
/// assert!(!verify_password("wrong_password", &salt, &hash)?);
/// # Ok(())
/// # }
/// ```

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2, ParamsBuilder, Version,
};
use rand::RngCore;

/// Error type for password hashing operations
#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    /// Failed to hash password
    #[error("Failed to hash password: {0}")]
    HashError(String),

    /// Failed to verify password
    #[error("Failed to verify password: {0}")]
    VerifyError(String),

    /// Invalid password hash format
    #[error("Invalid password hash format: {0}")]
    InvalidHash(String),
}

/// Generates a fresh random per-user salt (32 hex characters)
pub fn generate_salt() -> String {
    let mut bytes = [0u8; 16];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Generates an opaque password reset token (64 hex characters)
pub fn generate_reset_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn argon2() -> Result<Argon2<'static>, PasswordError> {
    let params = ParamsBuilder::new()
        .m_cost(65536) // 64 MB
        .t_cost(3)
        .p_cost(4)
        .output_len(32)
        .build()
        .map_err(|e| PasswordError::HashError(format!("Invalid parameters: {}", e)))?;

    Ok(Argon2::new(argon2::Algorithm::Argon2id, Version::V0x13, params))
}

/// Hashes `password || salt` using Argon2id
///
/// # Returns
///
/// PHC string format hash, e.g. `$argon2id$v=19$m=65536,t=3,p=4$...`
///
/// # Errors
///
/// Returns `PasswordError::HashError` if hashing fails
pub fn hash_password(password: &str, salt: &str) -> Result<String, PasswordError> {
    let phc_salt = SaltString::generate(&mut OsRng);
    let salted = format!("{}{}", password, salt);

    let password_hash = argon2()?
        .hash_password(salted.as_bytes(), &phc_salt)
        .map_err(|e| PasswordError::HashError(format!("Hash generation failed: {}", e)))?;

    Ok(password_hash.to_string())
}

/// Verifies `password || salt` against a stored PHC hash
///
/// The comparison is constant-time.
///
/// # Returns
///
/// `Ok(true)` if the password matches, `Ok(false)` if it doesn't
///
/// # Errors
///
/// Returns an error if the stored hash cannot be parsed
pub fn verify_password(password: &str, salt: &str, hash: &str) -> Result<bool, PasswordError> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|e| PasswordError::InvalidHash(format!("Failed to parse hash: {}", e)))?;

    let salted = format!("{}{}", password, salt);

    // Parameters are embedded in the hash
    match Argon2::default().verify_password(salted.as_bytes(), &parsed_hash) {
        Ok(_) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(PasswordError::VerifyError(format!("Verification failed: {}", e))),
    }
}

/// [`hash_password`] on the blocking thread pool
pub async fn hash_password_blocking(password: String, salt: String) -> Result<String, PasswordError> {
    tokio::task::spawn_blocking(move || hash_password(&password, &salt))
        .await
        .map_err(|e| PasswordError::HashError(format!("Hash task failed: {}", e)))?
}

/// [`verify_password`] on the blocking thread pool
pub async fn verify_password_blocking(
    password: String,
    salt: String,
    hash: String,
) -> Result<bool, PasswordError> {
    tokio::task::spawn_blocking(move || verify_password(&password, &salt, &hash))
        .await
        .map_err(|e| PasswordError::VerifyError(format!("Verify task failed: {}", e)))?
}

/// Validates password strength
///
/// Requires at least 8 characters with an uppercase letter, a lowercase
/// letter, a digit, and a special character.
///
/// # Example
///
/// ```
/// use launchpad_shared::auth::password::validate_password_strength;
///
/// assert!(validate_password_strength("pw!Fr0nt1er").is_ok());
/// assert!(validate_password_strength("Sh0rt!").is_err());
/// assert!(validate_password_strength("Password123").is_err());
/// ```
pub fn validate_password_strength(password: &str) -> Result<(), String> {
    if password.chars().count() < 8 {
        return Err("Password must be at least 8 characters long".to_string());
    }

    if !password.chars().any(|c| c.is_uppercase()) {
        return Err("Password must contain at least one uppercase letter".to_string());
    }

    if !password.chars().any(|c| c.is_lowercase()) {
        return Err("Password must contain at least one lowercase letter".to_string());
    }

    if !password.chars().any(|c| c.is_numeric()) {
        return Err("Password must contain at least one digit".to_string());
    }

    if !password.chars().any(|c| !c.is_alphanumeric()) {
        return Err("Password must contain at least one special character".to_string());
    }

    Ok(())
}
