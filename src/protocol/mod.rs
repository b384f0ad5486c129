// Copyright 2023-2025 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

//! Protocol vocabulary shared by every layer: command and status codes,
//! record type identifiers, cryptosystems and the TLV codec.

pub use self::common::*;
pub use self::errors::Error;
pub use self::tlv::{Tlv, TlvIter, TlvRef, MAX_TLV_VALUE_SIZE, TLV_HEADER_SIZE};

mod common;
mod errors;
pub mod tlv;
