// Copyright 2023-2025 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

#[derive(thiserror::Error, PartialEq, Eq)]
pub enum Error {
    #[error("Syntax error: {0}")]
    Syntax(String),
    #[error("Semantic error: {0}")]
    Sema(String),
    #[error("Bounds error: {0}")]
    Bounds(String),
    #[error("Reserved field not zero: {0}")]
    Reserved(String),
    #[error("Duplicated record: {0}")]
    DuplicatedRecord(String),
    #[error("Missing record: {0}")]
    MissingRecord(String),
}

impl std::fmt::Debug for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Syntax(e)
            | Error::Sema(e)
            | Error::Bounds(e)
            | Error::Reserved(e)
            | Error::DuplicatedRecord(e)
            | Error::MissingRecord(e) => {
                write!(f, "{}", e)
            }
        }
    }
}
