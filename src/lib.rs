// Copyright 2023-2025 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

//! Host-side engine for PSA Authenticated Debug Access Control (ADAC).
//!
//! This crate drives the host end of the ADAC protocol, through which a
//! debug probe proves to a target device that it is entitled to unlock
//! debug access.  For detailed information about the protocol, see the Arm
//! [ADAC] specification.
//!
//! The API allows:
//! * Exchanging framed command/response packets over a single guarded buffer
//! * Encoding and decoding the word-aligned TLV records used by discovery and
//!   certificates
//! * Walking a certificate chain to find its leaf, cryptosystem and scope
//! * Building and signing authentication tokens bound to a challenge
//! * Sequencing discovery, challenge, certificates and token into a session
//!
//! [ADAC]: https://developer.arm.com/documentation/den0101/latest

pub mod cert;
pub mod config;
pub mod protocol;
pub mod session;
pub mod token;
pub mod transport;
