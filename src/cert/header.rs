// Copyright 2023-2025 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use super::errors::Error;
use crate::protocol::{CertificateRole, KeyType, PERMISSIONS_SIZE};

/// Size of the fixed part of a certificate, in bytes
pub const CERTIFICATE_HEADER_SIZE: usize = 52;

/// Size of the SoC identifier carried in a certificate
pub const SOC_ID_SIZE: usize = 16;

/// Fixed-offset fields found at the start of every binary certificate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateHeader {
    pub version_major: u8,
    pub version_minor: u8,
    pub signature_type: u8,
    pub key_type: u8,
    pub role: u8,
    pub usage: u8,
    pub reserved: u16,
    pub lifecycle: u16,
    pub oem_constraint: u16,
    pub extensions_bytes: u32,
    /// Scope constraint; 0 means "any SoC class"
    pub soc_class: u32,
    pub soc_id: [u8; SOC_ID_SIZE],
    pub permissions_mask: [u8; PERMISSIONS_SIZE],
}

impl CertificateHeader {
    /// Decode the header at the start of a certificate body.  Anything after
    /// the header (extensions, public key, signature) is ignored.
    pub fn decode(buf: &[u8]) -> Result<Self, Error> {
        if buf.len() < CERTIFICATE_HEADER_SIZE {
            return Err(Error::Truncated(format!(
                "expecting at least {CERTIFICATE_HEADER_SIZE} bytes, got {}",
                buf.len()
            )));
        }

        let u16_at = |o: usize| u16::from_le_bytes([buf[o], buf[o + 1]]);
        let u32_at = |o: usize| u32::from_le_bytes([buf[o], buf[o + 1], buf[o + 2], buf[o + 3]]);

        let mut soc_id = [0u8; SOC_ID_SIZE];
        soc_id.copy_from_slice(&buf[20..36]);

        let mut permissions_mask = [0u8; PERMISSIONS_SIZE];
        permissions_mask.copy_from_slice(&buf[36..52]);

        Ok(Self {
            version_major: buf[0],
            version_minor: buf[1],
            signature_type: buf[2],
            key_type: buf[3],
            role: buf[4],
            usage: buf[5],
            reserved: u16_at(6),
            lifecycle: u16_at(8),
            oem_constraint: u16_at(10),
            extensions_bytes: u32_at(12),
            soc_class: u32_at(16),
            soc_id,
            permissions_mask,
        })
    }

    /// Serialise the header into its 52-byte wire form
    pub fn encode(&self) -> [u8; CERTIFICATE_HEADER_SIZE] {
        let mut out = [0u8; CERTIFICATE_HEADER_SIZE];

        out[0] = self.version_major;
        out[1] = self.version_minor;
        out[2] = self.signature_type;
        out[3] = self.key_type;
        out[4] = self.role;
        out[5] = self.usage;
        out[6..8].copy_from_slice(&self.reserved.to_le_bytes());
        out[8..10].copy_from_slice(&self.lifecycle.to_le_bytes());
        out[10..12].copy_from_slice(&self.oem_constraint.to_le_bytes());
        out[12..16].copy_from_slice(&self.extensions_bytes.to_le_bytes());
        out[16..20].copy_from_slice(&self.soc_class.to_le_bytes());
        out[20..36].copy_from_slice(&self.soc_id);
        out[36..52].copy_from_slice(&self.permissions_mask);

        out
    }

    pub fn check_reserved(&self) -> Result<(), Error> {
        if self.reserved != 0 {
            return Err(Error::Reserved(format!(
                "certificate header reserved field is 0x{:04x}",
                self.reserved
            )));
        }
        Ok(())
    }

    pub fn role(&self) -> Option<CertificateRole> {
        CertificateRole::from_code(self.role)
    }

    pub fn key_type(&self) -> Option<KeyType> {
        KeyType::from_code(self.key_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    const LEAF: [u8; 52] = hex!(
        "01 00 01 01 03 00 0000 0030 0000 00000000"
        "11000000"
        "000102030405060708090a0b0c0d0e0f"
        "ffffffffffffffffffffffffffffffff"
    );

    #[test]
    fn decode_leaf() {
        let h = CertificateHeader::decode(&LEAF).unwrap();

        assert_eq!(h.version_major, 1);
        assert_eq!(h.role(), Some(CertificateRole::Leaf));
        assert_eq!(h.key_type(), Some(KeyType::EcdsaP256Sha256));
        assert_eq!(h.lifecycle, 0x3000);
        assert_eq!(h.soc_class, 0x11);
        assert_eq!(h.soc_id[15], 0x0f);
        assert_eq!(h.permissions_mask, [0xff; 16]);
        assert!(h.check_reserved().is_ok());

        assert_eq!(h.encode(), LEAF);
    }

    #[test]
    fn short_certificate() {
        assert!(matches!(
            CertificateHeader::decode(&LEAF[..51]),
            Err(Error::Truncated(_))
        ));
    }

    #[test]
    fn reserved_not_zero() {
        let mut b = LEAF;
        b[6] = 1;

        let h = CertificateHeader::decode(&b).unwrap();
        assert!(matches!(h.check_reserved(), Err(Error::Reserved(_))));
    }

    #[test]
    fn unknown_codes() {
        let mut b = LEAF;
        b[3] = 0x42;
        b[4] = 0;

        let h = CertificateHeader::decode(&b).unwrap();
        assert!(h.key_type().is_none());
        assert!(h.role().is_none());
    }
}
