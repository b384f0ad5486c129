// Copyright 2023-2025 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

#[derive(thiserror::Error, PartialEq, Eq)]
pub enum Error {
    /// The message buffer was used out of sequence.  This is a bug in the
    /// caller, never a transient condition.
    #[error("Buffer contract violation: {0}")]
    Contract(String),
    #[error("Overflow: {0}")]
    Overflow(String),
    #[error("Framing error: {0}")]
    Framing(String),
    #[error("Transport error: {0}")]
    Io(String),
}

impl std::fmt::Debug for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Contract(e) | Error::Overflow(e) | Error::Framing(e) | Error::Io(e) => {
                write!(f, "{}", e)
            }
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}
