//! Passcode generation and hashing
//!
//! Codes come from the thread-local CSPRNG and are stored only as bcrypt
//! hashes. bcrypt is CPU bound, so the async wrappers run it on the blocking
//! pool instead of the request worker.

use rand::Rng;

use crate::error::AuthError;

/// Work factor for passcode and password hashes
pub const HASH_COST: u32 = 10;

/// Longest code that fits the `u64` range used for sampling
pub const MAX_SECRET_LENGTH: u32 = 18;

/// Generate a numeric passcode of exactly `length` digits.
///
/// Drawn uniformly from `[10^(length-1), 10^length - 1]`.
///
/// # Errors
///
/// Returns `ServerError` when `length` is zero or above [`MAX_SECRET_LENGTH`]
pub fn generate_secret(length: u32) -> Result<String, AuthError> {
    if length == 0 || length > MAX_SECRET_LENGTH {
        return Err(AuthError::server(format!("unsupported passcode length {length}")));
    }
    let low = 10u64.pow(length - 1);
    let high = 10u64.pow(length) - 1;
    let value = rand::rng().random_range(low..=high);
    Ok(value.to_string())
}

/// Salted one-way hash of a passcode
///
/// # Errors
///
/// Returns `ServerError` if bcrypt fails
pub fn hash_secret(secret: &str) -> Result<String, AuthError> {
    bcrypt::hash(secret, HASH_COST).map_err(|e| AuthError::server(format!("hashing failed: {e}")))
}

/// Compare a candidate against a stored hash using bcrypt's own comparison.
///
/// A malformed stored hash counts as a mismatch.
#[must_use]
pub fn verify_secret(candidate: &str, hashed: &str) -> bool {
    bcrypt::verify(candidate, hashed).unwrap_or(false)
}

/// [`hash_secret`] on the blocking thread pool
///
/// # Errors
///
/// Returns `ServerError` if hashing fails or the blocking task is cancelled
pub async fn hash_secret_blocking(secret: String) -> Result<String, AuthError> {
    tokio::task::spawn_blocking(move || hash_secret(&secret))
        .await
        .map_err(|e| AuthError::server(format!("hashing task failed: {e}")))?
}

/// [`verify_secret`] on the blocking thread pool
///
/// # Errors
///
/// Returns `ServerError` if the blocking task is cancelled
pub async fn verify_secret_blocking(candidate: String, hashed: String) -> Result<bool, AuthError> {
    tokio::task::spawn_blocking(move || verify_secret(&candidate, &hashed))
        .await
        .map_err(|e| AuthError::server(format!("verification task failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_codes_have_exact_length() {
        for length in [4, 6, 8] {
            for _ in 0..200 {
                let code = generate_secret(length).unwrap();
                assert_eq!(code.len(), length as usize);
                assert!(code.chars().all(|c| c.is_ascii_digit()));
                assert!(!code.starts_with('0'));
            }
        }
    }

    #[test]
    fn test_generated_codes_are_roughly_uniform() {
        // Leading digit of a 6-digit code is uniform over 1..=9
        let trials = 18_000;
        let mut buckets = [0u32; 10];
        for _ in 0..trials {
            let code = generate_secret(6).unwrap();
            let first = code.as_bytes()[0] - b'0';
            buckets[first as usize] += 1;
        }
        assert_eq!(buckets[0], 0);
        let expected = f64::from(trials) / 9.0;
        for count in &buckets[1..] {
            let deviation = (f64::from(*count) - expected).abs() / expected;
            assert!(deviation < 0.15, "bucket count {count} too far from {expected}");
        }

        // Last digit is uniform over 0..=9
        let mut last = [0u32; 10];
        for _ in 0..trials {
            let code = generate_secret(6).unwrap();
            last[(code.as_bytes()[5] - b'0') as usize] += 1;
        }
        let expected = f64::from(trials) / 10.0;
        for count in last {
            assert!((f64::from(count) - expected).abs() / expected < 0.15);
        }
    }

    #[test]
    fn test_consecutive_codes_differ() {
        let codes: std::collections::HashSet<String> =
            (0..50).map(|_| generate_secret(6).unwrap()).collect();
        assert!(codes.len() > 45);
    }

    #[test]
    fn test_invalid_lengths() {
        assert!(generate_secret(0).is_err());
        assert!(generate_secret(MAX_SECRET_LENGTH + 1).is_err());
        assert_eq!(generate_secret(MAX_SECRET_LENGTH).unwrap().len(), 18);
    }

    #[test]
    fn test_hash_round_trip() {
        let secret = generate_secret(6).unwrap();
        let hashed = hash_secret(&secret).unwrap();
        assert_ne!(hashed, secret);
        assert!(verify_secret(&secret, &hashed));

        let other = if secret == "123456" { "654321" } else { "123456" };
        assert!(!verify_secret(other, &hashed));
    }

    #[test]
    fn test_hashes_are_salted() {
        let a = hash_secret("123456").unwrap();
        let b = hash_secret("123456").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_malformed_hash_is_mismatch() {
        assert!(!verify_secret("123456", "not-a-bcrypt-hash"));
    }

    #[tokio::test]
    async fn test_blocking_wrappers() {
        let hashed = hash_secret_blocking("424242".to_string()).await.unwrap();
        assert!(verify_secret_blocking("424242".to_string(), hashed.clone()).await.unwrap());
        assert!(!verify_secret_blocking("000000".to_string(), hashed).await.unwrap());
    }
}
