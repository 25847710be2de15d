//! Ed25519 signing key wrapper used to issue and verify approval tokens.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use zeroize::Zeroizing;

/// A signing keypair for approval tokens.
///
/// Wraps `ed25519_dalek::SigningKey`; the private key bytes are zeroized on drop.
pub struct KeyPair {
    signing_key: SigningKey,
}

impl KeyPair {
    /// Generate a fresh keypair from the OS RNG.
    #[must_use]
    pub fn generate() -> Self {
        KeyPair {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Load a keypair from 32 secret-key bytes (e.g. derived from
    /// `SILAS_SIGNING_PASSPHRASE`).
    #[must_use]
    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        let secret = Zeroizing::new(*bytes);
        KeyPair {
            signing_key: SigningKey::from_bytes(&secret),
        }
    }

    /// This keypair's public verifying key.
    #[must_use]
    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    /// Sign an arbitrary message.
    #[must_use]
    pub fn sign(&self, message: &[u8]) -> Signature {
        self.signing_key.sign(message)
    }

    /// Verify a signature against this keypair's public key.
    #[must_use]
    pub fn verify(&self, message: &[u8], signature: &Signature) -> bool {
        self.signing_key.verifying_key().verify(message, signature).is_ok()
    }
}

/// Verify a signature against an arbitrary public key (for tokens issued by
/// a different keypair than the verifier holds).
#[must_use]
pub fn verify_with_key(key: &VerifyingKey, message: &[u8], signature: &Signature) -> bool {
    key.verify(message, signature).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_verify_roundtrip() {
        let kp = KeyPair::generate();
        let sig = kp.sign(b"hello");
        assert!(kp.verify(b"hello", &sig));
        assert!(!kp.verify(b"goodbye", &sig));
    }
}
