// Copyright 2023-2025 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use super::errors::Error;
use super::header::{CertificateHeader, CERTIFICATE_HEADER_SIZE};
use crate::protocol::{tlv, CertificateRole, KeyType, TlvRef, PSA_BINARY_CRT};
use log::{debug, info};

/// A binary certificate found in a chain, with its decoded header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate<'a> {
    /// Position of the enclosing record in the chain
    pub index: usize,
    pub header: CertificateHeader,
    pub record: TlvRef<'a>,
}

impl<'a> Certificate<'a> {
    fn decode(index: usize, record: TlvRef<'a>) -> Result<Self, Error> {
        let header = CertificateHeader::decode(record.value).map_err(|e| match e {
            Error::Truncated(m) => Error::Truncated(format!("certificate #{index}: {m}")),
            e => e,
        })?;

        Ok(Self {
            index,
            header,
            record,
        })
    }

    pub fn role(&self) -> Option<CertificateRole> {
        self.header.role()
    }

    /// The certificate body: header, extensions, key and signature
    pub fn body(&self) -> &'a [u8] {
        self.record.value
    }

    /// The complete record as sent to the target
    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        Ok(self.record.to_tlv().encode()?)
    }

    /// The complete record with its header replaced by `header`.  Everything
    /// past the header is carried over unchanged, signature included.
    pub fn to_bytes_with_header(&self, header: &CertificateHeader) -> Result<Vec<u8>, Error> {
        let mut body = self.record.value.to_vec();
        body[..CERTIFICATE_HEADER_SIZE].copy_from_slice(&header.encode());

        Ok(tlv::encode(self.record.type_id, &body)?)
    }
}

/// A certificate chain blob viewed as its sequence of top-level records
#[derive(Debug, Clone)]
pub struct CertificateChain<'a> {
    extensions: Vec<TlvRef<'a>>,
}

impl<'a> CertificateChain<'a> {
    /// Split `blob` into its top-level records.  Fails on a malformed
    /// sequence, on a non-zero reserved field, and when the chain holds more
    /// than `max_extensions` records.
    pub fn parse(blob: &'a [u8], max_extensions: usize) -> Result<Self, Error> {
        let extensions = tlv::split(blob)?;

        if extensions.len() > max_extensions {
            return Err(Error::TooManyExtensions(format!(
                "chain holds {} records, at most {max_extensions} allowed",
                extensions.len()
            )));
        }

        for e in &extensions {
            e.check_reserved()
                .map_err(|e| Error::Reserved(format!("{e:?}")))?;
        }

        info!(target: "host", "Found {} certificates", extensions.len());

        Ok(Self { extensions })
    }

    pub fn extensions(&self) -> &[TlvRef<'a>] {
        &self.extensions
    }

    pub fn len(&self) -> usize {
        self.extensions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }

    /// Binary certificates in chain order.  Records of other types (e.g.
    /// X.509) are skipped.
    pub fn certificates(&self) -> impl Iterator<Item = Result<Certificate<'a>, Error>> + '_ {
        self.extensions
            .iter()
            .enumerate()
            .filter(|(_, r)| r.type_id == PSA_BINARY_CRT)
            .map(|(i, r)| Certificate::decode(i, *r))
    }

    // The binary certificate closest to the end of the chain
    fn last_certificate(&self) -> Result<Option<Certificate<'a>>, Error> {
        self.certificates().last().transpose()
    }

    /// The cryptosystem the chain is bound to, as declared by its last
    /// binary certificate.  A chain without one, or declaring a key type this
    /// host does not know, is reported as unsupported.
    pub fn detect_cryptosystem(&self) -> Result<KeyType, Error> {
        let c = self.last_certificate()?.ok_or_else(|| {
            Error::UnsupportedCryptosystem("no binary certificate in chain".to_string())
        })?;

        let k = c.header.key_type().ok_or_else(|| {
            Error::UnsupportedCryptosystem(format!("key type {}", c.header.key_type))
        })?;

        info!(target: "host", "Cryptosystem detected: {k}");

        Ok(k)
    }

    /// Role of the last binary certificate of the chain
    pub fn certificate_role(&self) -> Result<CertificateRole, Error> {
        let c = self
            .last_certificate()?
            .ok_or_else(|| Error::Sema("no binary certificate in chain".to_string()))?;

        let r = c
            .role()
            .ok_or_else(|| Error::Sema(format!("unknown certificate role {}", c.header.role)))?;

        info!(target: "host", "Certificate role: {r:?}");

        Ok(r)
    }

    /// The first leaf certificate of the chain
    pub fn leaf(&self) -> Result<Certificate<'a>, Error> {
        for c in self.certificates() {
            let c = c?;
            if c.role() == Some(CertificateRole::Leaf) {
                return Ok(c);
            }
        }

        Err(Error::LeafNotFound)
    }

    /// Check that the scope constraint narrows consistently down the chain:
    /// every non-root certificate must either be neutral (`soc_class` 0) or
    /// match the nearest non-neutral `soc_class` above it.
    pub fn check_scope(&self) -> Result<(), Error> {
        let mut scope = 0u32;

        for c in self.certificates() {
            let c = c?;
            let class = c.header.soc_class;

            if class == 0 {
                continue;
            }

            if c.role() != Some(CertificateRole::Root) && scope != 0 && class != scope {
                debug!(
                    target: "certificate",
                    "certificate #{} soc_class 0x{class:08x} conflicts with 0x{scope:08x}",
                    c.index
                );
                return Err(Error::Sema(format!(
                    "certificate #{}: soc_class 0x{class:08x} outside scope 0x{scope:08x}",
                    c.index
                )));
            }

            scope = class;
        }

        Ok(())
    }

    /// Re-encode the chain
    pub fn encode(&self) -> Result<Vec<u8>, Error> {
        let mut out = Vec::new();

        for e in &self.extensions {
            tlv::encode_into(&mut out, e.type_id, e.value)?;
        }

        Ok(out)
    }
}
