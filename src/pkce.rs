use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::Rng;
use sha2::{Digest, Sha256};

const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Generates a random PKCE code verifier of `length` characters from `[A-Za-z0-9]`.
///
/// Each character comes from a `u32` drawn from the thread-local CSPRNG and
/// reduced modulo the alphabet size. The modulo bias (62 does not divide 2^32)
/// is negligible and accepted.
#[must_use]
pub fn generate_verifier(length: usize) -> String {
    let mut rng = rand::rng();
    (0..length)
        .map(|_| {
            let value: u32 = rng.random();
            CHARSET[value as usize % CHARSET.len()] as char
        })
        .collect()
}

/// Computes the S256 code challenge from a code verifier.
///
/// `challenge = BASE64URL(SHA256(verifier))` without `=` padding.
#[must_use]
pub fn derive_challenge(verifier: &str) -> String {
    let hash = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hash)
}

/// A verifier together with its derived challenge, for one authorization attempt.
#[derive(Debug, Clone)]
pub struct PkcePair {
    pub verifier: String,
    pub challenge: String,
}

impl PkcePair {
    pub fn generate(length: usize) -> Self {
        let verifier = generate_verifier(length);
        let challenge = derive_challenge(&verifier);
        Self {
            verifier,
            challenge,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verifier_length_and_alphabet() {
        for length in [1, 2, 43, 64, 128, 500] {
            let verifier = generate_verifier(length);
            assert_eq!(verifier.len(), length);
            assert!(
                verifier.chars().all(|c| c.is_ascii_alphanumeric()),
                "verifier should be alphanumeric: {}",
                verifier
            );
        }
    }

    #[test]
    fn test_verifier_uniqueness() {
        let v1 = generate_verifier(64);
        let v2 = generate_verifier(64);
        assert_ne!(v1, v2, "verifiers should be unique");
    }

    #[test]
    fn test_challenge_deterministic() {
        let c1 = derive_challenge("test_verifier_string");
        let c2 = derive_challenge("test_verifier_string");
        assert_eq!(c1, c2);
        assert_eq!(c1.len(), 43);
        assert!(!c1.contains(['+', '/', '=']));
    }

    #[test]
    fn test_challenge_known_vector() {
        // RFC 7636, Appendix B
        assert_eq!(
            derive_challenge("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk"),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    #[test]
    fn test_pair_is_consistent() {
        let pair = PkcePair::generate(64);
        assert_eq!(pair.challenge, derive_challenge(&pair.verifier));
    }
}
