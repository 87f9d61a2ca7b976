//! Password hashing and one-time token helpers.
//!
//! Stored format: `pbkdf2-sha256$<iterations>$<salt b64>$<hash b64>`.

use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine as _};
use pbkdf2::pbkdf2_hmac;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use super::AuthError;

const SCHEME: &str = "pbkdf2-sha256";
const SALT_LEN: usize = 16;
const OUTPUT_LEN: usize = 32;

fn random_bytes(len: usize) -> Result<Vec<u8>, AuthError> {
    let mut out = vec![0u8; len];
    getrandom::fill(&mut out).map_err(|e| AuthError::Random(e.to_string()))?;
    Ok(out)
}

fn derive(password: &str, salt: &[u8], iterations: u32) -> [u8; OUTPUT_LEN] {
    let mut out = [0u8; OUTPUT_LEN];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, iterations, &mut out);
    out
}

pub fn hash_password(password: &str, iterations: u32) -> Result<String, AuthError> {
    let iterations = iterations.max(1);
    let salt = random_bytes(SALT_LEN)?;
    let hash = derive(password, &salt, iterations);

    Ok(format!(
        "{}${}${}${}",
        SCHEME,
        iterations,
        STANDARD_NO_PAD.encode(&salt),
        STANDARD_NO_PAD.encode(hash)
    ))
}

/// Constant-time check against a stored hash. Malformed hashes never match.
pub fn verify_password(password: &str, stored: &str) -> bool {
    let mut parts = stored.split('$');
    let (Some(SCHEME), Some(iterations), Some(salt), Some(expected), None) = (
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
    ) else {
        return false;
    };

    let Ok(iterations) = iterations.parse::<u32>() else {
        return false;
    };
    let (Ok(salt), Ok(expected)) = (
        STANDARD_NO_PAD.decode(salt),
        STANDARD_NO_PAD.decode(expected),
    ) else {
        return false;
    };
    if iterations == 0 || expected.len() != OUTPUT_LEN {
        return false;
    }

    let actual = derive(password, &salt, iterations);
    actual[..].ct_eq(&expected[..]).into()
}

/// 32 random bytes as lowercase hex, handed to the client exactly once
pub fn random_token() -> Result<String, AuthError> {
    let bytes = random_bytes(32)?;
    Ok(bytes.iter().map(|b| format!("{:02x}", b)).collect())
}

/// Lookup key stored in place of a one-time token
pub fn hash_token(token: &str) -> String {
    format!("{:x}", Sha256::digest(token.as_bytes()))
}

/// Short lowercase hex suffix for generated slugs
pub fn random_suffix(len: usize) -> Result<String, AuthError> {
    let bytes = random_bytes(len.div_ceil(2))?;
    let mut hex: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
    hex.truncate(len);
    Ok(hex)
}
