// Copyright 2023-2025 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use super::errors::Error;
use crate::protocol::{self, *};
use bitmask::*;
use log::{debug, error};
use std::collections::BTreeSet;

bitmask! {
    #[derive(Debug)]
    mask RecordSet: u16 where flags Record {
        AuthVersion          = 0x0001,
        VendorId             = 0x0002,
        SocClass             = 0x0004,
        SocId                = 0x0008,
        TargetIdentity       = 0x0010,
        HwPermissionsFixed   = 0x0020,
        HwPermissionsMask    = 0x0040,
        PsaLifecycle         = 0x0080,
        SwPartitionId        = 0x0100,
        SdaId                = 0x0200,
        SdaVersion           = 0x0400,
        EffectivePermissions = 0x0800,
        TokenFormats         = 0x1000,
        CertFormats          = 0x2000,
        Cryptosystems        = 0x4000,
    }
}

fn well_known(type_id: u16) -> Option<(Record, &'static str)> {
    let r = match type_id {
        AUTH_VERSION => (Record::AuthVersion, "auth_version"),
        VENDOR_ID => (Record::VendorId, "vendor_id"),
        SOC_CLASS => (Record::SocClass, "soc_class"),
        SOC_ID => (Record::SocId, "soc_id"),
        TARGET_IDENTITY => (Record::TargetIdentity, "target_identity"),
        HW_PERMISSIONS_FIXED => (Record::HwPermissionsFixed, "hw_permissions_fixed"),
        HW_PERMISSIONS_MASK => (Record::HwPermissionsMask, "hw_permissions_mask"),
        PSA_LIFECYCLE => (Record::PsaLifecycle, "psa_lifecycle"),
        SW_PARTITION_ID => (Record::SwPartitionId, "sw_partition_id"),
        SDA_ID => (Record::SdaId, "sda_id"),
        SDA_VERSION => (Record::SdaVersion, "sda_version"),
        EFFECTIVE_PERMISSIONS => (Record::EffectivePermissions, "effective_permissions"),
        TOKEN_FORMATS => (Record::TokenFormats, "token_formats"),
        CERT_FORMATS => (Record::CertFormats, "cert_formats"),
        CRYPTOSYSTEMS => (Record::Cryptosystems, "cryptosystems"),
        _ => return None,
    };

    Some(r)
}

/// The capability records returned by a Discovery exchange
#[derive(Debug)]
pub struct Discovery {
    records: Vec<Tlv>,
    seen: RecordSet,
}

impl Discovery {
    /// Decode a Discovery response payload.  Well-known records may appear at
    /// most once; records of other types are kept as they are.
    pub fn decode(payload: &[u8]) -> Result<Self, Error> {
        let mut d = Discovery {
            records: Vec::new(),
            seen: RecordSet::none(),
        };

        for r in tlv::split(payload)? {
            r.check_reserved()?;

            debug!(
                target: "host",
                "discovery record 0x{:04x}, {} bytes",
                r.type_id,
                r.len()
            );

            if let Some((flag, name)) = well_known(r.type_id) {
                if d.seen.contains(flag) {
                    return Err(protocol::Error::DuplicatedRecord(name.to_string()).into());
                }
                d.seen.set(flag);
            }

            d.records.push(r.to_tlv());
        }

        Ok(d)
    }

    pub fn records(&self) -> &[Tlv] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, type_id: u16) -> Option<&Tlv> {
        self.records.iter().find(|r| r.type_id == type_id)
    }

    pub fn contains(&self, type_id: u16) -> bool {
        self.get(type_id).is_some()
    }

    pub fn type_ids(&self) -> BTreeSet<u16> {
        self.records.iter().map(|r| r.type_id).collect()
    }

    /// True if every record type found in `other` is also found here
    pub fn is_superset_of(&self, other: &Discovery) -> bool {
        self.type_ids().is_superset(&other.type_ids())
    }

    fn required(&self, type_id: u16, name: &str) -> Result<&Tlv, Error> {
        self.get(type_id)
            .ok_or_else(|| protocol::Error::MissingRecord(name.to_string()).into())
    }

    /// Protocol version spoken by the target, as (major, minor)
    pub fn auth_version(&self) -> Result<(u8, u8), Error> {
        let r = self.required(AUTH_VERSION, "auth_version")?;

        match r.value.as_slice() {
            [major, minor] => Ok((*major, *minor)),
            v => Err(protocol::Error::Sema(format!(
                "auth_version: expecting 2 bytes, got {}",
                v.len()
            ))
            .into()),
        }
    }

    /// The target lifecycle state.  The record must be exactly two bytes and
    /// hold a valid PSA lifecycle value.
    pub fn lifecycle(&self) -> Result<(LifecycleState, u16), Error> {
        let r = self.required(PSA_LIFECYCLE, "psa_lifecycle")?;

        let v = match r.value.as_slice() {
            [lo, hi] => u16::from_le_bytes([*lo, *hi]),
            v => {
                return Err(protocol::Error::Sema(format!(
                    "psa_lifecycle: expecting 2 bytes, got {}",
                    v.len()
                ))
                .into())
            }
        };

        let s = LifecycleState::from_raw(v).ok_or_else(|| {
            protocol::Error::Sema(format!("psa_lifecycle: unknown lifecycle 0x{v:04x}"))
        })?;

        Ok((s, v))
    }

    pub fn token_formats(&self) -> Vec<u16> {
        self.get(TOKEN_FORMATS)
            .map(|r| r.as_tlv_ref().u16_list())
            .unwrap_or_default()
    }

    pub fn cert_formats(&self) -> Vec<u16> {
        self.get(CERT_FORMATS)
            .map(|r| r.as_tlv_ref().u16_list())
            .unwrap_or_default()
    }

    /// Key type codes listed by the target, if it lists any
    pub fn cryptosystems(&self) -> Option<&[u8]> {
        self.get(CRYPTOSYSTEMS).map(|r| r.value.as_slice())
    }

    /// Software partition identifiers, read as little-endian u32 words
    pub fn sw_partitions(&self) -> Vec<u32> {
        self.get(SW_PARTITION_ID)
            .map(|r| {
                r.value
                    .chunks_exact(4)
                    .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Check the mandatory capabilities: a valid lifecycle, support for the
    /// binary token format and for the binary certificate format
    pub fn validate(&self) -> Result<(), Error> {
        self.lifecycle()?;

        if !self.token_formats().contains(&PSA_BINARY_TOKEN) {
            return Err(protocol::Error::Sema(
                "token_formats does not list psa_binary_token".to_string(),
            )
            .into());
        }

        if !self.cert_formats().contains(&PSA_BINARY_CRT) {
            return Err(protocol::Error::Sema(
                "cert_formats does not list psa_binary_crt".to_string(),
            )
            .into());
        }

        Ok(())
    }

    /// Check that the target lists `key_type` among its cryptosystems.  A
    /// target that lists none is an error; one that does not list this key
    /// type is a skip.
    pub fn check_cryptosystem_support(&self, key_type: KeyType) -> Result<(), Error> {
        let Some(supported) = self.cryptosystems() else {
            error!(target: "host", "Cryptosystem Type ID not specified");
            return Err(protocol::Error::MissingRecord("cryptosystems".to_string()).into());
        };

        if !supported.contains(&key_type.code()) {
            return Err(Error::UnsupportedCryptosystem(format!(
                "{key_type} not offered by target"
            )));
        }

        Ok(())
    }
}

/// Encode the payload of a Discovery request asking for `type_ids`
pub fn discovery_request(type_ids: &[u16]) -> Vec<u8> {
    type_ids.iter().flat_map(|t| t.to_le_bytes()).collect()
}
