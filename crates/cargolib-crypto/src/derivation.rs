//! Deterministic forest and device key derivation.
//!
//! Keys come from blake3 in key-derivation mode over the BIP-39 seed. Forest
//! and device keys use separate context strings, so the two hierarchies never
//! collide. The device name is length-prefixed into the input.

use crate::keys::SigningKeypair;
use crate::seed::Seed;
use zeroize::Zeroizing;

const FOREST_CONTEXT: &str = "cargolib 2024-05-01 forest identity signing key v1";
const DEVICE_CONTEXT: &str = "cargolib 2024-05-01 device identity signing key v1";

pub fn derive_forest(seed: &Seed) -> SigningKeypair {
    derive_forest_at(seed, 0)
}

pub fn derive_forest_at(seed: &Seed, index: u32) -> SigningKeypair {
    let mut hasher = blake3::Hasher::new_derive_key(FOREST_CONTEXT);
    hasher.update(seed.as_bytes());
    hasher.update(&index.to_le_bytes());
    finish(&hasher)
}

pub fn derive_device(seed: &Seed, device_name: &str) -> SigningKeypair {
    let mut hasher = blake3::Hasher::new_derive_key(DEVICE_CONTEXT);
    hasher.update(seed.as_bytes());
    hasher.update(&(device_name.len() as u64).to_le_bytes());
    hasher.update(device_name.as_bytes());
    finish(&hasher)
}

fn finish(hasher: &blake3::Hasher) -> SigningKeypair {
    let secret = Zeroizing::new(*hasher.finalize().as_bytes());
    SigningKeypair::from_secret_bytes(&secret)
}
