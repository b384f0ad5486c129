// Copyright 2023-2025 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

//! The host side of the ADAC authentication sequence:
//!
//! ```text
//! Idle --Discovery--> Discovered --AuthStart--> Challenged
//! Challenged --certificates--> CertSent --token--> Authenticated | Rejected
//! Authenticated --LcsChange--> LcsPending --applied--> Idle
//! ```
//!
//! # Example
//!
//! ```no_run
//! use adac_host::cert::CertificateChain;
//! use adac_host::protocol::MAX_EXTENSIONS;
//! use adac_host::session::{AuthOutcome, Session};
//! use adac_host::token::{SigningKey, TokenSigner};
//! use adac_host::transport::{connect_tcp, DEFAULT_BUFFER_SIZE};
//!
//! let blob = std::fs::read("chain.bin").expect("reading chain");
//! let chain = CertificateChain::parse(&blob, MAX_EXTENSIONS).expect("parsing chain");
//! let key_type = chain.detect_cryptosystem().expect("detecting cryptosystem");
//! let key = SigningKey::load("leaf.pem", key_type).expect("loading key");
//!
//! let link = connect_tcp("localhost:9000", None).expect("connecting");
//! let mut s = Session::new(link, DEFAULT_BUFFER_SIZE).expect("opening session");
//!
//! s.discover(&[]).expect("discovery");
//! s.check_cryptosystem_support(key.key_type()).expect("cryptosystem support");
//!
//! let challenge = s.auth_start().expect("challenge");
//! s.send_certificates(&chain).expect("sending certificates");
//!
//! let token = s.prepare_token(&chain, &challenge, &key, &[]).expect("building token");
//! assert_eq!(s.authenticate(&token).expect("authenticating"), AuthOutcome::Granted);
//! ```

pub use self::discovery::{discovery_request, Discovery};
pub use self::errors::Error;
pub use self::host::{AuthOutcome, LcsOutcome, Session};
pub use self::state::{SessionEvent, SessionFsm, SessionState};

mod discovery;
mod errors;
mod host;
mod state;
