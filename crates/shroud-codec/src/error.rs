//! Codec errors

use thiserror::Error;

/// Errors raised while decoding a bundle
///
/// Encoding never fails on well-formed input; every variant describes a
/// malformed or tampered bundle.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Secret arrays disagree in length or the order is not a permutation
    #[error("Corrupt secret: {0}")]
    CorruptSecret(String),

    /// Bootstrap program is malformed
    #[error("Bootstrap fault at word {offset}: {message}")]
    Bootstrap {
        /// Program offset
        offset: usize,
        /// What went wrong
        message: String,
    },

    /// A symbol outside the alphabet
    #[error("Invalid symbol {0:?}")]
    InvalidSymbol(char),

    /// Decoded bytes do not form the expected payload
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    /// Payload too large for the shard order encoding
    #[error("Payload too large: {0} shards")]
    TooManyShards(usize),
}

impl CodecError {
    /// Create a corrupt-secret error
    pub fn corrupt(msg: impl Into<String>) -> Self {
        Self::CorruptSecret(msg.into())
    }

    /// Create a bootstrap error
    pub fn bootstrap(offset: usize, msg: impl Into<String>) -> Self {
        Self::Bootstrap {
            offset,
            message: msg.into(),
        }
    }

    /// Create a malformed-payload error
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedPayload(msg.into())
    }
}

/// Result type for codec operations
pub type CodecResult<T> = std::result::Result<T, CodecError>;
