//! Ed25519 signing keypairs backing identities.

use cargolib_schema::Fingerprint;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

pub const SECRET_KEY_LEN: usize = 32;
pub const PUBLIC_KEY_LEN: usize = 32;
pub const SIGNATURE_LEN: usize = 64;

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("invalid hex encoding: {0}")]
    Hex(#[from] hex::FromHexError),
    #[error("invalid {what} length: expected {expected} bytes, got {actual}")]
    Length {
        what: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("invalid public key: {0}")]
    PublicKey(String),
    #[error("stored public key does not match the secret key")]
    PublicKeyMismatch,
    #[error("signature verification failed")]
    BadSignature,
}

/// Compute the identity fingerprint for a public key.
pub fn fingerprint_of(public_key: &[u8]) -> Fingerprint {
    Fingerprint::new(blake3::hash(public_key).to_hex().to_string())
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(try_from = "KeypairHex", into = "KeypairHex")]
pub struct SigningKeypair {
    signing: SigningKey,
}

/// Hex form of a keypair as persisted.
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct KeypairHex {
    pub public: String,
    pub secret: String,
}

impl SigningKeypair {
    pub fn from_secret_bytes(secret: &[u8; SECRET_KEY_LEN]) -> Self {
        Self {
            signing: SigningKey::from_bytes(secret),
        }
    }

    pub fn public_key(&self) -> [u8; PUBLIC_KEY_LEN] {
        self.signing.verifying_key().to_bytes()
    }

    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public_key())
    }

    pub fn fingerprint(&self) -> Fingerprint {
        fingerprint_of(&self.public_key())
    }

    pub fn sign(&self, message: &[u8]) -> [u8; SIGNATURE_LEN] {
        self.signing.sign(message).to_bytes()
    }

    pub fn verify(&self, message: &[u8], signature: &[u8]) -> Result<(), KeyError> {
        verify_signature(&self.public_key(), message, signature)
    }
}

/// Check `signature` over `message` against a bare public key.
pub fn verify_signature(
    public_key: &[u8],
    message: &[u8],
    signature: &[u8],
) -> Result<(), KeyError> {
    let public: [u8; PUBLIC_KEY_LEN] = public_key.try_into().map_err(|_| KeyError::Length {
        what: "public key",
        expected: PUBLIC_KEY_LEN,
        actual: public_key.len(),
    })?;
    let sig: [u8; SIGNATURE_LEN] = signature.try_into().map_err(|_| KeyError::Length {
        what: "signature",
        expected: SIGNATURE_LEN,
        actual: signature.len(),
    })?;
    let verifying =
        VerifyingKey::from_bytes(&public).map_err(|e| KeyError::PublicKey(e.to_string()))?;
    verifying
        .verify(message, &Signature::from_bytes(&sig))
        .map_err(|_| KeyError::BadSignature)
}

impl From<SigningKeypair> for KeypairHex {
    fn from(kp: SigningKeypair) -> Self {
        Self {
            public: kp.public_key_hex(),
            secret: hex::encode(kp.signing.to_bytes()),
        }
    }
}

impl TryFrom<KeypairHex> for SigningKeypair {
    type Error = KeyError;

    fn try_from(raw: KeypairHex) -> Result<Self, Self::Error> {
        let secret = Zeroizing::new(hex::decode(&raw.secret)?);
        let secret: &[u8; SECRET_KEY_LEN] =
            secret.as_slice().try_into().map_err(|_| KeyError::Length {
                what: "secret key",
                expected: SECRET_KEY_LEN,
                actual: secret.len(),
            })?;
        let keypair = Self::from_secret_bytes(secret);
        if keypair.public_key_hex() != raw.public.to_ascii_lowercase() {
            return Err(KeyError::PublicKeyMismatch);
        }
        Ok(keypair)
    }
}

impl PartialEq for SigningKeypair {
    fn eq(&self, other: &Self) -> bool {
        self.public_key() == other.public_key()
    }
}

impl Eq for SigningKeypair {}

impl fmt::Debug for SigningKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKeypair")
            .field("public", &self.public_key_hex())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keypair(byte: u8) -> SigningKeypair {
        SigningKeypair::from_secret_bytes(&[byte; SECRET_KEY_LEN])
    }

    #[test]
    fn fingerprint_is_blake3_of_public_key() {
        let kp = keypair(1);
        let fp = kp.fingerprint();
        assert_eq!(fp.len(), 64);
        assert!(fp.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_eq!(fp, fingerprint_of(&kp.public_key()));
        assert_ne!(fp, keypair(2).fingerprint());
    }

    #[test]
    fn sign_then_verify() {
        let kp = keypair(3);
        let sig = kp.sign(b"hello");
        kp.verify(b"hello", &sig).unwrap();
        assert!(matches!(kp.verify(b"hullo", &sig), Err(KeyError::BadSignature)));
        assert!(matches!(
            keypair(4).verify(b"hello", &sig),
            Err(KeyError::BadSignature)
        ));
        assert!(matches!(
            verify_signature(&kp.public_key(), b"hello", &sig[..10]),
            Err(KeyError::Length { .. })
        ));
    }

    #[test]
    fn hex_serialization_round_trip() {
        let kp = keypair(5);
        let json = serde_json::to_string(&kp).unwrap();
        assert!(json.contains(&kp.public_key_hex()));
        let back: SigningKeypair = serde_json::from_str(&json).unwrap();
        assert_eq!(back, kp);
        assert_eq!(back.sign(b"m"), kp.sign(b"m"));
    }

    #[test]
    fn tampered_public_key_is_rejected() {
        let kp = keypair(6);
        let raw = KeypairHex {
            public: keypair(7).public_key_hex(),
            secret: hex::encode([6u8; SECRET_KEY_LEN]),
        };
        assert!(matches!(
            SigningKeypair::try_from(raw),
            Err(KeyError::PublicKeyMismatch)
        ));
        let short = KeypairHex {
            public: kp.public_key_hex(),
            secret: "abcd".to_owned(),
        };
        assert!(matches!(
            SigningKeypair::try_from(short),
            Err(KeyError::Length { .. })
        ));
    }

    #[test]
    fn debug_omits_secret() {
        let printed = format!("{:?}", keypair(9));
        assert!(!printed.contains(&hex::encode([9u8; SECRET_KEY_LEN])));
        assert!(printed.contains("public"));
    }
}
