use thiserror::Error;

/// The failure of a fetch operation, as observed through the cache.
///
/// The cache never fails on its own; it only relays the outcome of the
/// underlying operation. Once an entry is rejected it stays rejected, and
/// every accessor bound to it observes the same error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    /// The underlying fetch operation failed.
    ///
    /// The attached string contains the producer's error message, verbatim.
    #[error("{0}")]
    Rejected(String),
    /// The fetch task went away without ever settling.
    ///
    /// This happens when the fetch panics, or when the runtime tears the task
    /// down before the operation completes.
    #[error("fetch dropped before settling")]
    Dropped,
}

impl CacheError {
    /// Creates a [`Rejected`](Self::Rejected) error from any std error,
    /// preserving its message.
    pub fn from_std_error<E: std::error::Error>(e: E) -> Self {
        Self::Rejected(e.to_string())
    }
}

/// The terminal contents of a cache entry, containing either the fetched value
/// or an error denoting the reason why the fetch failed.
pub type CacheContents<T> = Result<T, CacheError>;
