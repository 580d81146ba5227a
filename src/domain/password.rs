//! One-way password digests.
//!
//! Two digest formats are recognised:
//! - Argon2id PHC strings (`$argon2id$v=19$...`) with a random per-user salt.
//!   Every new credential is stored in this format.
//! - Legacy unsalted SHA-256 hex digests (64 lowercase hex chars), as written
//!   by earlier deployments of the clinic database. They still verify so that
//!   existing accounts keep working, but they are reported as needing an
//!   upgrade.
//!
//! # Security
//!
//! - Argon2id is memory-hard and resistant to GPU/ASIC attacks
//! - Legacy digests are compared in constant time
//! - Plaintext passwords are never stored or logged

use std::sync::OnceLock;

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Errors while producing a password digest.
#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("Password hashing failed: {0}")]
    Hashing(String),

    #[error("Stored password digest is malformed")]
    MalformedDigest,
}

/// Digest scheme of a stored credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestScheme {
    Argon2id,
    LegacySha256,
}

/// A stored, one-way password digest.
///
/// `Debug` prints only the scheme so digests never end up in logs.
#[derive(Clone, PartialEq, Eq)]
pub struct PasswordDigest(String);

impl PasswordDigest {
    /// Wrap a digest loaded from storage.
    ///
    /// # Errors
    /// Returns `PasswordError::MalformedDigest` if the value is neither a PHC
    /// string nor a 64-char hex digest.
    pub fn from_stored(value: impl Into<String>) -> Result<Self, PasswordError> {
        let value = value.into();
        if value.starts_with("$argon2") || is_legacy_hex(&value) {
            Ok(Self(value))
        } else {
            Err(PasswordError::MalformedDigest)
        }
    }

    /// The stored representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn scheme(&self) -> DigestScheme {
        if is_legacy_hex(&self.0) {
            DigestScheme::LegacySha256
        } else {
            DigestScheme::Argon2id
        }
    }

    /// Whether this credential should be re-hashed with Argon2id.
    #[must_use]
    pub fn needs_upgrade(&self) -> bool {
        self.scheme() == DigestScheme::LegacySha256
    }
}

impl std::fmt::Debug for PasswordDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("PasswordDigest").field(&self.scheme()).finish()
    }
}

fn is_legacy_hex(value: &str) -> bool {
    value.len() == 64 && value.bytes().all(|b| b.is_ascii_hexdigit())
}

fn argon2() -> Result<Argon2<'static>, PasswordError> {
    // OWASP minimum for Argon2id: 19 MiB, 2 iterations, 1 lane.
    let params = Params::new(19 * 1024, 2, 1, None)
        .map_err(|e| PasswordError::Hashing(format!("Invalid Argon2 params: {e}")))?;
    Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
}

/// Hash a password into a salted Argon2id PHC string.
///
/// # Errors
/// Returns error if hashing fails.
pub fn hash_password(password: &str) -> Result<PasswordDigest, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = argon2()?
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| PasswordError::Hashing(e.to_string()))?;
    Ok(PasswordDigest(hash.to_string()))
}

/// Legacy unsalted digest: lowercase hex SHA-256 of the UTF-8 password.
#[must_use]
pub fn legacy_sha256_hex(password: &str) -> String {
    Sha256::digest(password.as_bytes())
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// Check a password against a stored digest.
///
/// Legacy digests also pay for one Argon2id verification, so a legacy
/// account answers in the same time as any other login.
#[must_use]
pub fn verify_password(password: &str, digest: &PasswordDigest) -> bool {
    match digest.scheme() {
        DigestScheme::LegacySha256 => {
            verify_against_dummy(password);
            constant_time_eq_str(&legacy_sha256_hex(password), &digest.0.to_ascii_lowercase())
        }
        DigestScheme::Argon2id => {
            let Ok(parsed) = PasswordHash::new(&digest.0) else {
                return false;
            };
            let Ok(argon2) = argon2() else {
                return false;
            };
            argon2.verify_password(password.as_bytes(), &parsed).is_ok()
        }
    }
}

static DUMMY: OnceLock<Option<PasswordDigest>> = OnceLock::new();

/// Burn roughly the same time as a real verification.
///
/// Used when a username does not exist so response timing does not reveal
/// which usernames are registered.
pub fn verify_against_dummy(password: &str) {
    if let Some(dummy) = DUMMY.get_or_init(|| hash_password("dummy-credential").ok()) {
        let _ = verify_password(password, dummy);
    }
}

// Constant-time compare for ASCII strings (used for SHA-256 hex digests).
fn constant_time_eq_str(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff: u8 = 0;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes().iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_verify_roundtrip() {
        let digest = hash_password("correct-horse-battery-staple").expect("Hashing should succeed");
        assert_eq!(digest.scheme(), DigestScheme::Argon2id);
        assert!(verify_password("correct-horse-battery-staple", &digest));
        assert!(!verify_password("wrong-password", &digest));
    }

    #[test]
    fn test_same_password_different_salts() {
        let a = hash_password("same_password").expect("Hashing should succeed");
        let b = hash_password("same_password").expect("Hashing should succeed");
        assert_ne!(a.as_str(), b.as_str());
    }

    #[test]
    fn test_legacy_digest_verifies() {
        // sha256("admin123")
        let stored = "240be518fabd2724ddb6f04eeb1da5967448d7e831c08c8fa822809f74c720a9";
        let digest = PasswordDigest::from_stored(stored).expect("Legacy digest should parse");
        assert_eq!(digest.scheme(), DigestScheme::LegacySha256);
        assert!(digest.needs_upgrade());
        assert!(verify_password("admin123", &digest));
        assert!(!verify_password("admin124", &digest));
    }

    #[test]
    fn test_legacy_verification_runs_argon2() {
        let digest = PasswordDigest::from_stored(legacy_sha256_hex("pw")).expect("parse");
        assert!(!verify_password("other", &digest));
        assert!(matches!(DUMMY.get(), Some(Some(d)) if d.scheme() == DigestScheme::Argon2id));
    }

    #[test]
    fn test_malformed_digest_rejected() {
        assert!(PasswordDigest::from_stored("plaintext").is_err());
        assert!(PasswordDigest::from_stored("").is_err());
    }

    #[test]
    fn test_debug_does_not_leak_digest() {
        let digest = PasswordDigest::from_stored(legacy_sha256_hex("pw")).expect("Should parse");
        let debug = format!("{digest:?}");
        assert!(!debug.contains(&legacy_sha256_hex("pw")));
        assert!(debug.contains("LegacySha256"));
    }
}
