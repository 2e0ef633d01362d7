use thiserror::Error;

/// Errors surfaced to the drivers. Invariant violations inside the cache
/// (corrupted set ids, a block missing right after a fill) are programmer
/// errors and panic instead of being reported through this type.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("invalid cache policy: {0}")]
    InvalidPolicy(String),

    #[error("trace parse error at line {line}: {message}")]
    Trace { line: u64, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
