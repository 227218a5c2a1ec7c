// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Error taxonomy shared by every pipeline stage

use std::path::PathBuf;

use thiserror::Error;

use crate::persist::FormatError;

/// Coarse error class, used by callers that only care about the category
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing or unreadable input file, malformed dataset row, unwritable model artifact
    Io,
    /// Invalid hyperparameter, split fraction or degenerate data set
    Config,
    /// Unrecognized or corrupt serialized model
    Format,
    /// Feature vector length does not match the fitted model
    Dimension,
}

/// Errors raised by the sentiment pipeline
#[derive(Debug, Error)]
pub enum Error {
    /// Failed to open, read or write a file
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A dataset row could not be parsed into a record
    #[error("{}:{line}: {reason}", path.display())]
    MalformedRow {
        path: PathBuf,
        line: u64,
        reason: String,
    },

    /// Invalid configuration or degenerate input data
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Serialized model could not be decoded
    #[error(transparent)]
    Format(#[from] FormatError),

    /// Feature vector length mismatch
    #[error("feature vector has {actual} dimensions, model expects {expected}")]
    Dimension { expected: usize, actual: usize },
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Io { .. } | Error::MalformedRow { .. } => ErrorKind::Io,
            Error::Config(_) => ErrorKind::Config,
            Error::Format(_) => ErrorKind::Format,
            Error::Dimension { .. } => ErrorKind::Dimension,
        }
    }
}

/// Result alias used across the crate
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        let io = Error::io("missing.txt", std::io::Error::from(std::io::ErrorKind::NotFound));
        assert_eq!(io.kind(), ErrorKind::Io);
        assert!(io.to_string().contains("missing.txt"));

        let row = Error::MalformedRow {
            path: PathBuf::from("data.tsv"),
            line: 3,
            reason: "bad label".to_string(),
        };
        assert_eq!(row.kind(), ErrorKind::Io);
        assert_eq!(row.to_string(), "data.tsv:3: bad label");

        assert_eq!(Error::config("nope").kind(), ErrorKind::Config);
        assert_eq!(
            Error::Dimension { expected: 4, actual: 3 }.kind(),
            ErrorKind::Dimension
        );
        assert_eq!(Error::from(FormatError::NotAModel).kind(), ErrorKind::Format);
    }
}
