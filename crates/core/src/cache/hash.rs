//! Request key generation.

use sha2::{Digest, Sha256};

/// Compute the store key for a request identity.
///
/// `url` must already be canonical (fragment stripped, host lowercased).
/// Header variance is not part of the key; it is checked at match time.
pub fn compute_cache_key(method: &str, url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(method.to_ascii_uppercase().as_bytes());
    hasher.update(b"\n");
    hasher.update(url.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_stability() {
        let hash1 = compute_cache_key("GET", "https://open.er-api.com/v6/latest/USD");
        let hash2 = compute_cache_key("GET", "https://open.er-api.com/v6/latest/USD");
        assert_eq!(hash1, hash2);
    }

    #[test]
    fn test_hash_method_case_insensitive() {
        assert_eq!(compute_cache_key("get", "https://a.test/"), compute_cache_key("GET", "https://a.test/"));
    }

    #[test]
    fn test_hash_query_participates() {
        let usd = compute_cache_key("GET", "https://a.test/latest?base=USD");
        let eur = compute_cache_key("GET", "https://a.test/latest?base=EUR");
        assert_ne!(usd, eur);
    }

    #[test]
    fn test_hash_format() {
        let hash = compute_cache_key("GET", "https://example.com/");
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
