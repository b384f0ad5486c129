// Copyright 2023-2025 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use crate::{cert, protocol, token, transport};

#[derive(thiserror::Error, PartialEq, Eq)]
pub enum Error {
    #[error("Transport: {0}")]
    Transport(#[from] transport::Error),
    #[error("Protocol: {0}")]
    Protocol(#[from] protocol::Error),
    #[error("Certificate: {0}")]
    Certificate(#[from] cert::Error),
    #[error("Token: {0}")]
    Token(#[from] token::Error),
    #[error("Unsupported cryptosystem: {0}")]
    UnsupportedCryptosystem(String),
    #[error("Unexpected status: {0}")]
    UnexpectedStatus(String),
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),
}

impl Error {
    /// True when the target or the supplied material does not support the
    /// requested cryptosystem.  Such outcomes are skips, not failures.
    pub fn is_skip(&self) -> bool {
        match self {
            Error::UnsupportedCryptosystem(_) => true,
            Error::Certificate(e) => e.is_skip(),
            Error::Token(e) => e.is_skip(),
            _ => false,
        }
    }
}

impl std::fmt::Debug for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Transport(e) => write!(f, "{:?}", e),
            Error::Protocol(e) => write!(f, "{:?}", e),
            Error::Certificate(e) => write!(f, "{:?}", e),
            Error::Token(e) => write!(f, "{:?}", e),
            Error::UnsupportedCryptosystem(e)
            | Error::UnexpectedStatus(e)
            | Error::InvalidTransition(e) => {
                write!(f, "{}", e)
            }
        }
    }
}
