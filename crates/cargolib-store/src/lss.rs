use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LssError {
    #[error("storage backend failure: {0}")]
    BackendFailure(String),
}

pub type LssResult<T> = Result<T, LssError>;

/// Host-supplied key/value persistence.
///
/// Keys are strings, values are opaque bytes. Every call may fail with
/// [`LssError::BackendFailure`]; callers propagate it and never retry.
/// Implementations guarantee key uniqueness. No locking across separate
/// calls is assumed.
pub trait LocalSecureStorage: Send + Sync {
    /// Upsert. Returns the previous value if the key existed.
    fn insert(&self, key: &str, value: Vec<u8>) -> LssResult<Option<Vec<u8>>>;

    fn get(&self, key: &str) -> LssResult<Option<Vec<u8>>>;

    fn contains_key(&self, key: &str) -> LssResult<bool>;

    /// All keys, in no particular order.
    fn keys(&self) -> LssResult<Vec<String>>;

    /// Keys with the given prefix, in no particular order. The empty prefix
    /// selects every key.
    fn keys_starting_with(&self, prefix: &str) -> LssResult<Vec<String>>;

    fn remove(&self, key: &str) -> LssResult<Option<Vec<u8>>>;

    fn len(&self) -> LssResult<usize>;

    /// Must agree with `len() == 0`.
    fn is_empty(&self) -> LssResult<bool>;
}
