//! Request identity keys.

use sha2::{Digest, Sha256};

use crate::Request;

/// Compute the store key for a method and canonical URL.
pub fn compute_request_key(method: &str, url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(method.to_ascii_uppercase().as_bytes());
    hasher.update(b"\n");
    hasher.update(url.as_bytes());
    hex::encode(hasher.finalize())
}

/// Store key for `request`.
pub fn request_key(request: &Request) -> String {
    compute_request_key(&request.method, request.url.as_str())
}

/// Hex SHA-256 of arbitrary bytes, used for release digests.
pub fn digest_bytes(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_stability() {
        let key1 = compute_request_key("GET", "https://absensi.test/");
        let key2 = compute_request_key("get", "https://absensi.test/");
        assert_eq!(key1, key2);
    }

    #[test]
    fn test_key_different_method() {
        let get = compute_request_key("GET", "https://absensi.test/api");
        let head = compute_request_key("HEAD", "https://absensi.test/api");
        assert_ne!(get, head);
    }

    #[test]
    fn test_key_ignores_fragment_through_request() {
        let a = Request::get(url::Url::parse("https://absensi.test/a#x").unwrap());
        let b = Request::get(url::Url::parse("https://absensi.test/a").unwrap());
        assert_eq!(request_key(&a), request_key(&b));
    }

    #[test]
    fn test_key_format() {
        let key = compute_request_key("GET", "https://absensi.test/");
        assert_eq!(key.len(), 64);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(digest_bytes(b"release").len(), 64);
    }
}
