// Copyright 2023-2025 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

//! Certificate chains as handed over by an external loader: a TLV sequence
//! whose binary certificate records start with a fixed [`CertificateHeader`].

pub use self::chain::{Certificate, CertificateChain};
pub use self::errors::Error;
pub use self::header::{CertificateHeader, CERTIFICATE_HEADER_SIZE, SOC_ID_SIZE};

mod chain;
mod errors;
mod header;
