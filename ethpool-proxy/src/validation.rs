//! Cheap syntactic checks on untrusted wire fields.
//!
//! These run before any policy or share-processing work. Nonce and digest
//! fields are never normalized: anything but the exact lower-case encoding
//! is rejected.

use std::sync::LazyLock;

use regex::Regex;

use crate::session::DEFAULT_WORKER_ID;

static ADDRESS_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("^0x[0-9a-f]{40}$").expect("valid address pattern"));
static NONCE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("^0x[0-9a-f]{16}$").expect("valid nonce pattern"));
static HASH_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("^0x[0-9a-f]{64}$").expect("valid hash pattern"));
static WORKER_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9a-zA-Z\-_]{1,64}$").expect("valid worker pattern"));

/// Lower-case a wallet address and check its format.
///
/// Returns the normalized form, or `None` if it isn't a hex address.
pub fn normalize_login(address: &str) -> Option<String> {
    let login = address.to_lowercase();
    ADDRESS_PATTERN.is_match(&login).then_some(login)
}

/// Return the worker id if acceptable, the default id otherwise.
pub fn sanitize_worker_id(id: &str) -> &str {
    if WORKER_PATTERN.is_match(id) {
        id
    } else {
        DEFAULT_WORKER_ID
    }
}

pub fn is_valid_nonce(nonce: &str) -> bool {
    NONCE_PATTERN.is_match(nonce)
}

pub fn is_valid_hash(hash: &str) -> bool {
    HASH_PATTERN.is_match(hash)
}

/// Check a `[nonce, mix digest, result digest]` triple.
pub fn is_valid_pow(nonce: &str, mix_digest: &str, result: &str) -> bool {
    is_valid_nonce(nonce) && is_valid_hash(mix_digest) && is_valid_hash(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_login_is_lowercased() {
        assert_eq!(
            normalize_login("0xABCDEF0123456789ABCDEF0123456789ABCDEF01").as_deref(),
            Some("0xabcdef0123456789abcdef0123456789abcdef01")
        );
    }

    #[test_case(""; "empty")]
    #[test_case("0xabcdef"; "too short")]
    #[test_case("abcdef0123456789abcdef0123456789abcdef0123"; "no prefix")]
    #[test_case("0xabcdef0123456789abcdef0123456789abcdef0g"; "not hex")]
    #[test_case("0xabcdef0123456789abcdef0123456789abcdef0101"; "too long")]
    fn test_bad_logins(address: &str) {
        assert_eq!(normalize_login(address), None);
    }

    #[test_case("rig-01_A", "rig-01_A"; "accepted")]
    #[test_case("", "0"; "empty")]
    #[test_case("rig 1", "0"; "space")]
    #[test_case("rig.1", "0"; "dot")]
    fn test_worker_id(input: &str, expected: &str) {
        assert_eq!(sanitize_worker_id(input), expected);
    }

    #[test]
    fn test_worker_id_length_limit() {
        let longest = "w".repeat(64);
        assert_eq!(sanitize_worker_id(&longest), longest);
        assert_eq!(sanitize_worker_id(&"w".repeat(65)), DEFAULT_WORKER_ID);
    }

    #[test_case("0x0000000000000000", true; "zero")]
    #[test_case("0x00000000deadbeef", true; "lower hex")]
    #[test_case("0x00000000DEADBEEF", false; "upper hex")]
    #[test_case("0x000000000000000", false; "short")]
    #[test_case("00000000000000000", false; "no prefix")]
    #[test_case(" 0x0000000000000000", false; "whitespace")]
    fn test_nonce(nonce: &str, valid: bool) {
        assert_eq!(is_valid_nonce(nonce), valid);
    }

    #[test]
    fn test_hash() {
        assert!(is_valid_hash(&format!("0x{}", "f".repeat(64))));
        assert!(!is_valid_hash(&format!("0xAA{}", "0".repeat(62))));
        assert!(!is_valid_hash(&format!("0x{}", "f".repeat(63))));
        assert!(!is_valid_hash(&format!("0x{}", "f".repeat(65))));
    }

    #[test]
    fn test_pow_triple_rejects_mixed_case_digest() {
        let mix = format!("0xAA{}", "0".repeat(62));
        let result = format!("0x{}", "f".repeat(64));
        assert!(!is_valid_pow("0x0000000000000000", &mix, &result));
        assert!(is_valid_pow("0x0000000000000000", &result, &result));
    }
}
