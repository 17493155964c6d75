//! Key material for cargolib identities.
//!
//! `Mnemonic` encodes 128 bits of entropy as a 12-word BIP-39 phrase and
//! yields a 64-byte `Seed`. The `derivation` functions turn a seed into
//! deterministic ed25519 forest and device keypairs.

pub mod derivation;
pub mod keys;
pub mod mnemonic;
pub mod seed;

pub use derivation::{derive_device, derive_forest, derive_forest_at};
pub use keys::{
    fingerprint_of, verify_signature, KeyError, KeypairHex, SigningKeypair, PUBLIC_KEY_LEN,
    SECRET_KEY_LEN, SIGNATURE_LEN,
};
pub use mnemonic::{Mnemonic, MnemonicError, ENTROPY_LEN, MNEMONIC_WORD_COUNT};
pub use seed::{Seed, SEED_LEN};
