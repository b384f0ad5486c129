// Copyright 2023-2025 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use crate::protocol;

#[derive(thiserror::Error, PartialEq, Eq)]
pub enum Error {
    #[error("Syntax error: {0}")]
    Syntax(String),
    #[error("Encoding error: {0}")]
    Encoding(#[from] protocol::Error),
    #[error("Unsupported cryptosystem: {0}")]
    UnsupportedCryptosystem(String),
    #[error("Key loading failed: {0}")]
    Key(String),
    #[error("Key type mismatch: {0}")]
    KeyMismatch(String),
    #[error("Signing failed: {0}")]
    Signing(String),
    #[error("Verification failed: {0}")]
    Verification(String),
}

impl Error {
    /// True for conditions that mean "this target cannot be exercised with
    /// this key" rather than a defect
    pub fn is_skip(&self) -> bool {
        matches!(self, Error::UnsupportedCryptosystem(_))
    }
}

impl std::fmt::Debug for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Encoding(e) => write!(f, "{:?}", e),
            Error::Syntax(e)
            | Error::UnsupportedCryptosystem(e)
            | Error::Key(e)
            | Error::KeyMismatch(e)
            | Error::Signing(e)
            | Error::Verification(e) => {
                write!(f, "{}", e)
            }
        }
    }
}
