use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

use crate::error::{AppError, AppResult};

/// Hashes with Argon2id and a fresh random salt, returning a PHC string.
pub(crate) fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Hashing(e.to_string()))
}

pub(crate) fn verify_password(password: &str, digest: &str) -> AppResult<bool> {
    let parsed = PasswordHash::new(digest).map_err(|e| AppError::Hashing(e.to_string()))?;
    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(AppError::Hashing(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_accepts_only_the_original_password() {
        let digest = hash_password("s3cret").unwrap();
        assert_ne!(digest, "s3cret");
        assert!(verify_password("s3cret", &digest).unwrap());
        assert!(!verify_password("S3cret", &digest).unwrap());
    }

    #[test]
    fn malformed_digest_is_an_error() {
        assert!(verify_password("s3cret", "not-a-phc-string").is_err());
    }
}
