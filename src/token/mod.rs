// Copyright 2023-2025 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

//! The token module builds the authentication response closing an ADAC
//! challenge: a `psa_binary_token` record holding a [`TokenHeader`] that
//! echoes the challenge, optional extension records, and a signature over
//! both.
//!
//! # Example
//!
//! ```
//! use adac_host::protocol::KeyType;
//! use adac_host::token::{construct_token, sw_partition_extensions, Challenge, SigningKey};
//!
//! let key = SigningKey::generate(KeyType::HmacSha256).expect("generating key");
//! let challenge = Challenge::new([0x42; 32]);
//! let ext = sw_partition_extensions(&[1, 2]).expect("encoding extensions");
//!
//! let token = construct_token(&challenge, &ext, &[0xff; 16], &key).expect("signing token");
//! assert!(token.is_bound_to(&challenge));
//!
//! let fragment = token.fragment().expect("encoding token");
//! ```

pub use self::auth::{
    construct_token, sw_partition_extensions, AuthToken, Challenge, TokenHeader,
    CHALLENGE_RESPONSE_SIZE, TOKEN_HEADER_SIZE,
};
pub use self::errors::Error;
pub use self::signer::{SigningKey, TokenSigner, TokenVerifier};

mod auth;
mod errors;
mod signer;
