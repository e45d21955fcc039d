//! Argon2 password hashing. Raw passwords exist only in transit as
//! [`secrecy::SecretString`] and are hashed before anything is persisted.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use secrecy::{ExposeSecret, SecretString};

use crate::error::Error;

/// Hash a raw password into a PHC string for storage.
pub fn hash_password(password: &SecretString) -> Result<String, Error> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.expose_secret().as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| Error::PasswordHash(err.to_string()))
}

/// Verify a raw password against a stored PHC hash.
///
/// Returns `Ok(false)` on mismatch; `Err` only when the stored hash itself is
/// unparseable.
pub fn verify_password(password: &SecretString, hash: &str) -> Result<bool, Error> {
    let parsed = PasswordHash::new(hash).map_err(|err| Error::PasswordHash(err.to_string()))?;
    Ok(Argon2::default()
        .verify_password(password.expose_secret().as_bytes(), &parsed)
        .is_ok())
}
