//! Error types for Rearview

use thiserror::Error;

/// Main error type for Rearview cache operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid frame buffer: {0}")]
    InvalidFrame(String),

    #[error("no stored entry with id {0}")]
    EntryNotFound(u64),

    #[error("entry {0} is not a base frame")]
    NotABase(u64),
}

/// Result type alias using Rearview's Error
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::EntryNotFound(42);
        assert_eq!(err.to_string(), "no stored entry with id 42");

        let err = Error::NotABase(7);
        assert_eq!(err.to_string(), "entry 7 is not a base frame");
    }
}
