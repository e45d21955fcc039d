//! Crate error taxonomy.
//!
//! Authentication and authorization *outcomes* (rejected logins, denied
//! access) are not errors; they are returned as typed enum variants so the
//! presentation layer decides messaging. This enum covers real failures:
//! duplicate registration, broken hashes, and storage faults.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Registration hit an existing normalized email.
    #[error("email address is already registered")]
    DuplicateEmail,

    /// Registration email failed the format check.
    #[error("invalid email address")]
    InvalidEmail,

    /// Password hashing or hash parsing failed.
    #[error("password hash error: {0}")]
    PasswordHash(String),

    /// Underlying store failure (connection, query, constraint other than
    /// the unique email).
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}
