// Copyright 2023-2025 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use super::errors::Error;
use super::signer::{TokenSigner, TokenVerifier};
use crate::protocol::{
    tlv, KeyType, Tlv, TlvRef, CHALLENGE_SIZE, FORMAT_VERSION_MAJOR, FORMAT_VERSION_MINOR,
    PERMISSIONS_SIZE, PSA_BINARY_TOKEN, SW_PARTITION_ID,
};
use log::debug;

/// Size of a challenge as returned by AuthStart
pub const CHALLENGE_RESPONSE_SIZE: usize = 4 + CHALLENGE_SIZE;

/// Size of the fixed part of a token
pub const TOKEN_HEADER_SIZE: usize = 8 + PERMISSIONS_SIZE + CHALLENGE_SIZE;

/// A challenge issued by the target in response to AuthStart
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    pub version_major: u8,
    pub version_minor: u8,
    pub reserved: u16,
    pub vector: [u8; CHALLENGE_SIZE],
}

impl Challenge {
    pub fn new(vector: [u8; CHALLENGE_SIZE]) -> Self {
        Self {
            version_major: FORMAT_VERSION_MAJOR,
            version_minor: FORMAT_VERSION_MINOR,
            reserved: 0,
            vector,
        }
    }

    /// Decode an AuthStart response payload, which must be exactly one
    /// challenge long
    pub fn decode(buf: &[u8]) -> Result<Self, Error> {
        if buf.len() != CHALLENGE_RESPONSE_SIZE {
            return Err(Error::Syntax(format!(
                "challenge: expecting {CHALLENGE_RESPONSE_SIZE} bytes, got {}",
                buf.len()
            )));
        }

        let mut vector = [0u8; CHALLENGE_SIZE];
        vector.copy_from_slice(&buf[4..]);

        Ok(Self {
            version_major: buf[0],
            version_minor: buf[1],
            reserved: u16::from_le_bytes([buf[2], buf[3]]),
            vector,
        })
    }

    pub fn encode(&self) -> [u8; CHALLENGE_RESPONSE_SIZE] {
        let mut out = [0u8; CHALLENGE_RESPONSE_SIZE];
        out[0] = self.version_major;
        out[1] = self.version_minor;
        out[2..4].copy_from_slice(&self.reserved.to_le_bytes());
        out[4..].copy_from_slice(&self.vector);
        out
    }
}

/// Fixed part of a token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenHeader {
    pub version_major: u8,
    pub version_minor: u8,
    pub signature_type: u8,
    pub reserved: u8,
    pub extensions_bytes: u32,
    pub requested_permissions: [u8; PERMISSIONS_SIZE],
    pub challenge_vector: [u8; CHALLENGE_SIZE],
}

impl TokenHeader {
    pub fn encode(&self) -> [u8; TOKEN_HEADER_SIZE] {
        let mut out = [0u8; TOKEN_HEADER_SIZE];
        out[0] = self.version_major;
        out[1] = self.version_minor;
        out[2] = self.signature_type;
        out[3] = self.reserved;
        out[4..8].copy_from_slice(&self.extensions_bytes.to_le_bytes());
        out[8..24].copy_from_slice(&self.requested_permissions);
        out[24..].copy_from_slice(&self.challenge_vector);
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self, Error> {
        if buf.len() < TOKEN_HEADER_SIZE {
            return Err(Error::Syntax(format!(
                "token: expecting at least {TOKEN_HEADER_SIZE} bytes, got {}",
                buf.len()
            )));
        }

        let mut requested_permissions = [0u8; PERMISSIONS_SIZE];
        requested_permissions.copy_from_slice(&buf[8..24]);

        let mut challenge_vector = [0u8; CHALLENGE_SIZE];
        challenge_vector.copy_from_slice(&buf[24..TOKEN_HEADER_SIZE]);

        Ok(Self {
            version_major: buf[0],
            version_minor: buf[1],
            signature_type: buf[2],
            reserved: buf[3],
            extensions_bytes: u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]),
            requested_permissions,
            challenge_vector,
        })
    }
}

/// A signed token, ready to be sent as an AuthResponse payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthToken {
    pub header: TokenHeader,
    pub extensions: Vec<u8>,
    pub signature: Vec<u8>,
}

impl AuthToken {
    /// The bytes covered by the signature: header followed by extensions
    pub fn signed_bytes(&self) -> Vec<u8> {
        let mut out = self.header.encode().to_vec();
        out.extend_from_slice(&self.extensions);
        out
    }

    pub fn challenge_vector(&self) -> &[u8; CHALLENGE_SIZE] {
        &self.header.challenge_vector
    }

    /// True if the token answers `challenge`
    pub fn is_bound_to(&self, challenge: &Challenge) -> bool {
        self.header.challenge_vector == challenge.vector
    }

    /// The token wrapped in its `psa_binary_token` record
    pub fn fragment(&self) -> Result<Vec<u8>, Error> {
        let mut value = self.signed_bytes();
        value.extend_from_slice(&self.signature);

        Ok(tlv::encode(PSA_BINARY_TOKEN, &value)?)
    }

    /// Decode a token fragment.  `key_type` gives the signature length.
    pub fn decode(fragment: &[u8], key_type: KeyType) -> Result<Self, Error> {
        let record = Tlv::decode(fragment)?;

        if record.type_id != PSA_BINARY_TOKEN {
            return Err(Error::Syntax(format!(
                "expecting a token record, got type 0x{:04x}",
                record.type_id
            )));
        }

        let header = TokenHeader::decode(&record.value)?;

        let ext_end = TOKEN_HEADER_SIZE + header.extensions_bytes as usize;
        let expected = ext_end + key_type.signature_size();

        if record.value.len() != expected {
            return Err(Error::Syntax(format!(
                "token: expecting {expected} bytes for {key_type}, got {}",
                record.value.len()
            )));
        }

        Ok(Self {
            extensions: record.value[TOKEN_HEADER_SIZE..ext_end].to_vec(),
            signature: record.value[ext_end..].to_vec(),
            header,
        })
    }

    /// Check the signature with `verifier`
    pub fn verify(&self, verifier: &TokenVerifier) -> Result<(), Error> {
        verifier.verify(&self.signed_bytes(), &self.signature)
    }

    /// The extension records carried by the token
    pub fn extension_records(&self) -> Result<Vec<TlvRef<'_>>, Error> {
        Ok(tlv::split(&self.extensions)?)
    }
}

/// Build and sign a token answering `challenge`.
///
/// `extensions` is an already encoded TLV sequence (possibly empty) placed
/// between the header and the signature.  The signature covers the header,
/// challenge vector included, and the extensions.
pub fn construct_token(
    challenge: &Challenge,
    extensions: &[u8],
    requested_permissions: &[u8; PERMISSIONS_SIZE],
    signer: &dyn TokenSigner,
) -> Result<AuthToken, Error> {
    let key_type = signer.key_type();

    if key_type == KeyType::Sm2Sm3 {
        return Err(Error::UnsupportedCryptosystem(key_type.to_string()));
    }

    let extensions_bytes = u32::try_from(extensions.len())
        .map_err(|_| Error::Syntax(format!("{} extension bytes", extensions.len())))?;

    // the extension area must be a valid record sequence
    tlv::split(extensions)?;

    let header = TokenHeader {
        version_major: FORMAT_VERSION_MAJOR,
        version_minor: FORMAT_VERSION_MINOR,
        signature_type: key_type.code(),
        reserved: 0,
        extensions_bytes,
        requested_permissions: *requested_permissions,
        challenge_vector: challenge.vector,
    };

    let mut token = AuthToken {
        header,
        extensions: extensions.to_vec(),
        signature: Vec::new(),
    };

    token.signature = signer.sign(&token.signed_bytes()).map_err(|e| match e {
        Error::UnsupportedCryptosystem(_) => e,
        e => Error::Signing(format!("{e:?}")),
    })?;

    debug!(
        target: "host",
        "token signed with {key_type}: {} extension bytes, {} signature bytes",
        token.extensions.len(),
        token.signature.len()
    );

    Ok(token)
}

/// Encode one `sw_partition_id` record per partition, each carrying the
/// identifier as a little-endian u32
pub fn sw_partition_extensions(ids: &[u32]) -> Result<Vec<u8>, Error> {
    let mut out = Vec::new();

    for id in ids {
        tlv::encode_into(&mut out, SW_PARTITION_ID, &id.to_le_bytes())?;
    }

    Ok(out)
}
