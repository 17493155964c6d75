use crate::seed::Seed;
use bip39::Language;
use rand::RngCore;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use zeroize::Zeroizing;

pub const MNEMONIC_WORD_COUNT: usize = 12;
/// Bytes of entropy encoded by a 12-word phrase.
pub const ENTROPY_LEN: usize = 16;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MnemonicError {
    #[error("expected {MNEMONIC_WORD_COUNT} words, got {0}")]
    InvalidWordCount(usize),
    #[error("word #{index} '{word}' is not in the wordlist")]
    UnknownWord { index: usize, word: String },
    #[error("mnemonic checksum mismatch")]
    ChecksumMismatch,
    #[error("not enough entropy: got {0} bytes, need at least {ENTROPY_LEN}")]
    EntropyTooLow(usize),
}

/// A 12-word English BIP-39 phrase with a valid checksum.
#[derive(Clone, PartialEq, Eq)]
pub struct Mnemonic {
    inner: bip39::Mnemonic,
}

impl Mnemonic {
    pub fn generate() -> Self {
        let mut entropy = Zeroizing::new([0u8; ENTROPY_LEN]);
        rand::thread_rng().fill_bytes(entropy.as_mut());
        Self::encode(&entropy)
    }

    /// Deterministic phrase from caller-supplied entropy of at least 128 bits.
    pub fn from_entropy(entropy: &[u8]) -> Result<Self, MnemonicError> {
        if entropy.len() < ENTROPY_LEN {
            return Err(MnemonicError::EntropyTooLow(entropy.len()));
        }
        let digest = blake3::hash(entropy);
        let mut truncated = Zeroizing::new([0u8; ENTROPY_LEN]);
        truncated.copy_from_slice(&digest.as_bytes()[..ENTROPY_LEN]);
        Ok(Self::encode(&truncated))
    }

    fn encode(entropy: &[u8; ENTROPY_LEN]) -> Self {
        let inner = bip39::Mnemonic::from_entropy_in(Language::English, entropy)
            .expect("128-bit entropy is always encodable");
        Self { inner }
    }

    pub fn from_words<S: AsRef<str>>(words: &[S]) -> Result<Self, MnemonicError> {
        if words.len() != MNEMONIC_WORD_COUNT {
            return Err(MnemonicError::InvalidWordCount(words.len()));
        }
        let normalized: Vec<String> = words
            .iter()
            .map(|w| w.as_ref().trim().to_lowercase())
            .collect();
        if let Some(index) = normalized
            .iter()
            .position(|w| Language::English.find_word(w).is_none())
        {
            return Err(MnemonicError::UnknownWord {
                index,
                word: normalized[index].clone(),
            });
        }

        let phrase = Zeroizing::new(normalized.join(" "));
        let inner = bip39::Mnemonic::parse_in_normalized(Language::English, &phrase).map_err(
            |e| match e {
                bip39::Error::BadWordCount(n) => MnemonicError::InvalidWordCount(n),
                bip39::Error::UnknownWord(index) => MnemonicError::UnknownWord {
                    index,
                    word: normalized.get(index).cloned().unwrap_or_default(),
                },
                _ => MnemonicError::ChecksumMismatch,
            },
        )?;
        Ok(Self { inner })
    }

    pub fn from_phrase(phrase: &str) -> Result<Self, MnemonicError> {
        let words: Vec<&str> = phrase.split_whitespace().collect();
        Self::from_words(&words)
    }

    pub fn words(&self) -> Vec<&'static str> {
        self.inner.words().collect()
    }

    /// Space-joined text form.
    pub fn phrase(&self) -> Zeroizing<String> {
        Zeroizing::new(self.words().join(" "))
    }

    pub fn to_seed(&self) -> Seed {
        Seed::from_bytes(self.inner.to_seed_normalized(""))
    }
}

impl FromStr for Mnemonic {
    type Err = MnemonicError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_phrase(s)
    }
}

impl fmt::Debug for Mnemonic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Mnemonic(<redacted>)")
    }
}
