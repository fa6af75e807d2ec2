//! Password hashing and verification (scrypt, PHC string format).
//!
//! Parameters match the original's documented defaults (based on Node.js's
//! `crypto.scrypt` defaults): `ln=14, r=8, p=1`, 32-byte salt, 32-byte hash.
//! The `scrypt` crate's own `PasswordHasher`/`PasswordHash` machinery
//! produces and parses the exact `$scrypt$ln=...,r=...,p=...$salt$hash` PHC
//! string, so there is no hand-rolled parser here.

use scrypt::Scrypt;
use scrypt::password_hash::rand_core::OsRng;
use scrypt::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};

use crate::error::AppError;

const LOG_N: u8 = 14;
const R: u32 = 8;
const P: u32 = 1;
const OUTPUT_LEN: usize = 32;

/// Hashes `password`, returning a self-describing PHC string. Each call
/// draws a fresh random salt, so hashing the same password twice yields
/// two different strings.
pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    let params = scrypt::Params::new(LOG_N, R, P, OUTPUT_LEN)
        .map_err(|err| AppError::Other(format!("invalid scrypt params: {err}")))?;
    let hash = Scrypt
        .hash_password_customized(password.as_bytes(), None, None, params, &salt)
        .map_err(|err| AppError::Other(format!("password hashing failed: {err}")))?;
    Ok(hash.to_string())
}

/// Verifies `password` against a previously produced PHC string. A
/// malformed hash (corrupt data, unexpected algorithm) is treated the same
/// as a mismatch: both collapse to `LoginFailed` at the caller boundary.
pub fn verify_password(password: &str, hashed_password: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hashed_password) else {
        return false;
    };
    Scrypt.verify_password(password.as_bytes(), &parsed).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_hash_and_verify() {
        let hashed = hash_password("Passw0rd!!").unwrap();
        assert!(verify_password("Passw0rd!!", &hashed));
        assert!(!verify_password("wrong-password", &hashed));
    }

    #[test]
    fn two_hashes_of_the_same_password_differ() {
        let a = hash_password("Passw0rd!!").unwrap();
        let b = hash_password("Passw0rd!!").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn hash_carries_documented_scrypt_params() {
        let hashed = hash_password("Passw0rd!!").unwrap();
        assert!(hashed.starts_with("$scrypt$ln=14,r=8,p=1$"));
    }

    #[test]
    fn malformed_hash_fails_verification_rather_than_panicking() {
        assert!(!verify_password("whatever", "not a phc string"));
    }
}
