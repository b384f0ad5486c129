// Copyright 2023-2025 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use crate::protocol;

#[derive(thiserror::Error, PartialEq, Eq)]
pub enum Error {
    #[error("Malformed chain: {0}")]
    Syntax(#[from] protocol::Error),
    #[error("Certificate too short: {0}")]
    Truncated(String),
    #[error("Reserved field not zero: {0}")]
    Reserved(String),
    #[error("Too many extensions: {0}")]
    TooManyExtensions(String),
    #[error("Leaf certificate not found")]
    LeafNotFound,
    #[error("Unsupported cryptosystem: {0}")]
    UnsupportedCryptosystem(String),
    #[error("Semantic error: {0}")]
    Sema(String),
}

impl Error {
    /// True for conditions that mean "this target cannot be exercised with
    /// this chain" rather than a defect
    pub fn is_skip(&self) -> bool {
        matches!(self, Error::UnsupportedCryptosystem(_))
    }
}

impl std::fmt::Debug for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Syntax(e) => write!(f, "{:?}", e),
            Error::LeafNotFound => write!(f, "leaf certificate not found"),
            Error::Truncated(e)
            | Error::Reserved(e)
            | Error::TooManyExtensions(e)
            | Error::UnsupportedCryptosystem(e)
            | Error::Sema(e) => {
                write!(f, "{}", e)
            }
        }
    }
}
