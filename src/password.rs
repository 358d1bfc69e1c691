//! Salted password hashing with PBKDF2-HMAC-SHA256.

use pbkdf2::pbkdf2_hmac;
use rand::Rng;
use sha2::Sha256;

const SCHEME: &str = "pbkdf2-sha256";
const NUM_ITERATIONS: u32 = 50_000;
const SALT_LEN: usize = 16;
const HASH_LEN: usize = 32;

/// Derives a salted hash and encodes it as
/// `pbkdf2-sha256$<iterations>$<salt-hex>$<hash-hex>`.
pub fn hash_password(password: &str) -> String {
    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill(&mut salt[..]);
    let mut hash = [0u8; HASH_LEN];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), &salt, NUM_ITERATIONS, &mut hash);
    format!(
        "{SCHEME}${NUM_ITERATIONS}${}${}",
        hex::encode(salt),
        hex::encode(hash)
    )
}

/// Checks a candidate password against a stored hash string. Malformed
/// stored values verify as false rather than erroring.
pub fn verify_password(stored: &str, candidate: &str) -> bool {
    let mut parts = stored.split('$');
    let (Some(scheme), Some(iterations), Some(salt), Some(hash), None) = (
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
    ) else {
        return false;
    };
    if scheme != SCHEME {
        return false;
    }
    let Ok(iterations) = iterations.parse::<u32>() else {
        return false;
    };
    let (Ok(salt), Ok(hash)) = (hex::decode(salt), hex::decode(hash)) else {
        return false;
    };
    let mut derived = vec![0u8; hash.len()];
    pbkdf2_hmac::<Sha256>(candidate.as_bytes(), &salt, iterations, &mut derived);
    constant_time_eq(&derived, &hash)
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
