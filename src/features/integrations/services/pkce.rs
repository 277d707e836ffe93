//! PKCE (RFC 7636) helpers for the authorization-code flow.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use sha2::{Digest, Sha256};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct PkcePair {
    pub verifier: String,
    pub challenge: String,
}

impl PkcePair {
    pub fn generate() -> Self {
        let verifier = generate_verifier();
        let challenge = challenge_s256(&verifier);
        Self {
            verifier,
            challenge,
        }
    }
}

/// 128 hex characters, the longest verifier the RFC allows
fn generate_verifier() -> String {
    (0..4).map(|_| Uuid::new_v4().simple().to_string()).collect()
}

/// `BASE64URL(SHA256(verifier))` without padding
pub fn challenge_s256(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rfc7636_appendix_b_vector() {
        assert_eq!(
            challenge_s256("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk"),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    #[test]
    fn test_generated_pair_is_consistent() {
        let pair = PkcePair::generate();

        assert_eq!(pair.verifier.len(), 128);
        assert!(pair.verifier.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_eq!(pair.challenge, challenge_s256(&pair.verifier));
        assert_ne!(pair.verifier, PkcePair::generate().verifier);
    }
}
