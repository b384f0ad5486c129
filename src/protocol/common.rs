// Copyright 2023-2025 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use std::fmt;

/// Size of the random vector carried in a challenge
pub const CHALLENGE_SIZE: usize = 32;

/// Size of the permission masks carried in certificates and tokens
pub const PERMISSIONS_SIZE: usize = 16;

/// Default upper bound on the number of top-level records in a chain
pub const MAX_EXTENSIONS: usize = 16;

pub const FORMAT_VERSION_MAJOR: u8 = 1;
pub const FORMAT_VERSION_MINOR: u8 = 0;

// Discovery records
pub const AUTH_VERSION: u16 = 0x0001;
pub const VENDOR_ID: u16 = 0x0002;
pub const SOC_CLASS: u16 = 0x0003;
pub const SOC_ID: u16 = 0x0004;
pub const TARGET_IDENTITY: u16 = 0x0005;
pub const HW_PERMISSIONS_FIXED: u16 = 0x0006;
pub const HW_PERMISSIONS_MASK: u16 = 0x0007;
pub const PSA_LIFECYCLE: u16 = 0x0008;
pub const SW_PARTITION_ID: u16 = 0x0009;
pub const SDA_ID: u16 = 0x000A;
pub const SDA_VERSION: u16 = 0x000B;
pub const EFFECTIVE_PERMISSIONS: u16 = 0x000C;
pub const TOKEN_FORMATS: u16 = 0x0100;
pub const CERT_FORMATS: u16 = 0x0101;
pub const CRYPTOSYSTEMS: u16 = 0x0102;

// Token and certificate envelopes
pub const PSA_BINARY_TOKEN: u16 = 0x0200;
pub const PSA_BINARY_CRT: u16 = 0x0201;
pub const X509_CRT: u16 = 0x0202;

/// Mask selecting the major part of a PSA lifecycle value
pub const LIFECYCLE_MAJOR_MASK: u16 = 0xFF00;

/// Rounds a byte count up to the next multiple of 4
pub fn round_to_word(n: usize) -> usize {
    (n + 3) & !3
}

pub fn is_valid_lifecycle(value: u16) -> bool {
    matches!(
        value,
        0x0000..=0x00ff
            | 0x1000..=0x10ff
            | 0x2000..=0x20ff
            | 0x3000..=0x30ff
            | 0x4000..=0x40ff
            | 0x5000..=0x50ff
            | 0x6000..=0x60ff
    )
}

/// Major PSA lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Unknown,
    AssemblyAndTest,
    PsaRotProvisioning,
    Secured,
    NonPsaRotDebug,
    RecoverablePsaRotDebug,
    Decommissioned,
}

impl LifecycleState {
    /// Classify a raw lifecycle value by its major state
    pub fn from_raw(value: u16) -> Option<Self> {
        if !is_valid_lifecycle(value) {
            return None;
        }

        let s = match value & LIFECYCLE_MAJOR_MASK {
            0x0000 => Self::Unknown,
            0x1000 => Self::AssemblyAndTest,
            0x2000 => Self::PsaRotProvisioning,
            0x3000 => Self::Secured,
            0x4000 => Self::NonPsaRotDebug,
            0x5000 => Self::RecoverablePsaRotDebug,
            _ => Self::Decommissioned,
        };

        Some(s)
    }

    pub fn major(&self) -> u16 {
        match self {
            Self::Unknown => 0x0000,
            Self::AssemblyAndTest => 0x1000,
            Self::PsaRotProvisioning => 0x2000,
            Self::Secured => 0x3000,
            Self::NonPsaRotDebug => 0x4000,
            Self::RecoverablePsaRotDebug => 0x5000,
            Self::Decommissioned => 0x6000,
        }
    }
}

/// Host to target commands.  Codes outside the known set are carried
/// verbatim so that they can be framed and sent; the target is the one
/// expected to reject them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Discovery,
    AuthStart,
    AuthResponse,
    CloseSession,
    LockDebug,
    LcsChange,
    Vendor(u16),
    Unknown(u16),
}

impl Command {
    pub fn code(&self) -> u16 {
        match self {
            Self::Discovery => 0x0001,
            Self::AuthStart => 0x0002,
            Self::AuthResponse => 0x0003,
            Self::CloseSession => 0x0004,
            Self::LockDebug => 0x0005,
            Self::LcsChange => 0x0006,
            Self::Vendor(c) | Self::Unknown(c) => *c,
        }
    }

    pub fn is_recognized(&self) -> bool {
        !matches!(self, Self::Unknown(_))
    }
}

impl From<u16> for Command {
    fn from(code: u16) -> Self {
        match code {
            0x0001 => Self::Discovery,
            0x0002 => Self::AuthStart,
            0x0003 => Self::AuthResponse,
            0x0004 => Self::CloseSession,
            0x0005 => Self::LockDebug,
            0x0006 => Self::LcsChange,
            c if c & 0x8000 != 0 => Self::Vendor(c),
            c => Self::Unknown(c),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Discovery => write!(f, "discovery"),
            Self::AuthStart => write!(f, "auth-start"),
            Self::AuthResponse => write!(f, "auth-response"),
            Self::CloseSession => write!(f, "close-session"),
            Self::LockDebug => write!(f, "lock-debug"),
            Self::LcsChange => write!(f, "lcs-change"),
            Self::Vendor(c) => write!(f, "vendor(0x{c:04x})"),
            Self::Unknown(c) => write!(f, "unknown(0x{c:04x})"),
        }
    }
}

/// Target to host status codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Success,
    Failure,
    NeedMoreData,
    Unsupported,
    InvalidParameters,
    InvalidCommand,
    Other(u16),
}

impl Status {
    pub fn code(&self) -> u16 {
        match self {
            Self::Success => 0x0000,
            Self::Failure => 0x0001,
            Self::NeedMoreData => 0x0002,
            Self::Unsupported => 0x0003,
            Self::InvalidParameters => 0x7FFE,
            Self::InvalidCommand => 0x7FFF,
            Self::Other(c) => *c,
        }
    }
}

impl From<u16> for Status {
    fn from(code: u16) -> Self {
        match code {
            0x0000 => Self::Success,
            0x0001 => Self::Failure,
            0x0002 => Self::NeedMoreData,
            0x0003 => Self::Unsupported,
            0x7FFE => Self::InvalidParameters,
            0x7FFF => Self::InvalidCommand,
            c => Self::Other(c),
        }
    }
}

/// Cryptosystems a certificate or token can be bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyType {
    EcdsaP256Sha256,
    EcdsaP521Sha512,
    Rsa3072Sha256,
    Rsa4096Sha256,
    Ed25519Sha512,
    Ed448Shake256,
    Sm2Sm3,
    CmacAes,
    HmacSha256,
}

impl KeyType {
    pub fn code(&self) -> u8 {
        match self {
            Self::EcdsaP256Sha256 => 1,
            Self::EcdsaP521Sha512 => 2,
            Self::Rsa3072Sha256 => 3,
            Self::Rsa4096Sha256 => 4,
            Self::Ed25519Sha512 => 5,
            Self::Ed448Shake256 => 6,
            Self::Sm2Sm3 => 7,
            Self::CmacAes => 8,
            Self::HmacSha256 => 9,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        let k = match code {
            1 => Self::EcdsaP256Sha256,
            2 => Self::EcdsaP521Sha512,
            3 => Self::Rsa3072Sha256,
            4 => Self::Rsa4096Sha256,
            5 => Self::Ed25519Sha512,
            6 => Self::Ed448Shake256,
            7 => Self::Sm2Sm3,
            8 => Self::CmacAes,
            9 => Self::HmacSha256,
            _ => return None,
        };

        Some(k)
    }

    /// Symmetric cryptosystems use a shared secret rather than a key pair
    pub fn is_symmetric(&self) -> bool {
        matches!(self, Self::CmacAes | Self::HmacSha256)
    }

    /// Length in bytes of a signature (or MAC) produced with this key type
    pub fn signature_size(&self) -> usize {
        match self {
            Self::EcdsaP256Sha256 => 64,
            Self::EcdsaP521Sha512 => 132,
            Self::Rsa3072Sha256 => 384,
            Self::Rsa4096Sha256 => 512,
            Self::Ed25519Sha512 => 64,
            Self::Ed448Shake256 => 114,
            Self::Sm2Sm3 => 64,
            Self::CmacAes => 16,
            Self::HmacSha256 => 32,
        }
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::EcdsaP256Sha256 => "ECDSA P-256/SHA-256",
            Self::EcdsaP521Sha512 => "ECDSA P-521/SHA-512",
            Self::Rsa3072Sha256 => "RSA-3072/SHA-256",
            Self::Rsa4096Sha256 => "RSA-4096/SHA-256",
            Self::Ed25519Sha512 => "Ed25519/SHA-512",
            Self::Ed448Shake256 => "Ed448/SHAKE256",
            Self::Sm2Sm3 => "SM2/SM3",
            Self::CmacAes => "CMAC-AES",
            Self::HmacSha256 => "HMAC-SHA256",
        };
        write!(f, "{s}")
    }
}

/// Position of a certificate in the trust chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertificateRole {
    Root,
    Intermediate,
    Leaf,
}

impl CertificateRole {
    pub fn code(&self) -> u8 {
        match self {
            Self::Root => 1,
            Self::Intermediate => 2,
            Self::Leaf => 3,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::Root),
            2 => Some(Self::Intermediate),
            3 => Some(Self::Leaf),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_codes() {
        for code in 1..=6u16 {
            let c = Command::from(code);
            assert!(c.is_recognized());
            assert_eq!(c.code(), code);
        }

        assert_eq!(Command::from(0x8001), Command::Vendor(0x8001));

        for code in [0x0u16, 0x100, 0xBAD, 0x7FFF] {
            assert_eq!(Command::from(code), Command::Unknown(code));
            assert_eq!(Command::from(code).code(), code);
        }
    }

    #[test]
    fn status_codes() {
        assert_eq!(Status::from(0x7FFF), Status::InvalidCommand);
        assert_eq!(Status::from(0x7FFE), Status::InvalidParameters);
        assert_eq!(Status::from(0x1234), Status::Other(0x1234));
        assert_eq!(Status::NeedMoreData.code(), 2);
    }

    #[test]
    fn lifecycle() {
        assert_eq!(
            LifecycleState::from_raw(0x3001),
            Some(LifecycleState::Secured)
        );
        assert_eq!(LifecycleState::from_raw(0x3100), None);
        assert_eq!(LifecycleState::from_raw(0x7000), None);
        assert!(is_valid_lifecycle(0x60ff));
    }

    #[test]
    fn key_types() {
        for code in 1..=9u8 {
            assert_eq!(KeyType::from_code(code).map(|k| k.code()), Some(code));
        }
        assert!(KeyType::from_code(0).is_none());
        assert!(KeyType::HmacSha256.is_symmetric());
        assert!(!KeyType::Ed25519Sha512.is_symmetric());
    }

    #[test]
    fn word_rounding() {
        assert_eq!(round_to_word(0), 0);
        assert_eq!(round_to_word(1), 4);
        assert_eq!(round_to_word(4), 4);
        assert_eq!(round_to_word(6), 8);
    }
}
