// Copyright 2023-2025 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use super::errors::Error;
use crate::protocol::KeyType;
use log::debug;
use openssl::bn::BigNum;
use openssl::ec::{EcGroup, EcKey};
use openssl::ecdsa::EcdsaSig;
use openssl::error::ErrorStack;
use openssl::hash::{hash, MessageDigest};
use openssl::nid::Nid;
use openssl::pkey::{HasPublic, Id, PKey, PKeyRef, Private, Public};
use openssl::rsa::{Padding, Rsa};
use openssl::sign::{RsaPssSaltlen, Signer, Verifier};
use openssl::symm::Cipher;
use std::fs;
use std::path::Path;

/// Anything able to produce the signature (or MAC) closing a token
pub trait TokenSigner {
    fn key_type(&self) -> KeyType;

    /// Sign `msg`, returning a signature of exactly
    /// `self.key_type().signature_size()` bytes
    fn sign(&self, msg: &[u8]) -> Result<Vec<u8>, Error>;
}

fn crypto(what: &str) -> impl Fn(ErrorStack) -> Error + '_ {
    move |e| Error::Signing(format!("{what}: {e:?}"))
}

enum PrivateMaterial {
    KeyPair(PKey<Private>),
    Secret(Vec<u8>),
}

enum PublicMaterial {
    PublicKey(PKey<Public>),
    Secret(Vec<u8>),
}

/// A private key or shared secret bound to one of the ADAC cryptosystems
pub struct SigningKey {
    key_type: KeyType,
    material: PrivateMaterial,
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKey")
            .field("key_type", &self.key_type)
            .finish_non_exhaustive()
    }
}

impl SigningKey {
    /// Load the key at `path`.  Asymmetric key types expect a PEM or DER
    /// private key, symmetric ones the raw secret bytes.
    pub fn load<P: AsRef<Path>>(path: P, key_type: KeyType) -> Result<Self, Error> {
        let path = path.as_ref();

        let raw = fs::read(path)
            .map_err(|e| Error::Key(format!("reading {}: {e}", path.display())))?;

        debug!(target: "host", "loaded {} key bytes from {}", raw.len(), path.display());

        if key_type.is_symmetric() {
            Self::from_secret(key_type, &raw)
        } else {
            Self::from_private_key(key_type, &raw)
        }
    }

    /// Import a PEM or DER encoded private key, checking it is of `key_type`
    pub fn from_private_key(key_type: KeyType, raw: &[u8]) -> Result<Self, Error> {
        check_asymmetric(key_type)?;

        let pkey = PKey::private_key_from_pem(raw)
            .or_else(|_| PKey::private_key_from_der(raw))
            .map_err(|e| Error::Key(format!("{e:?}")))?;

        check_key_matches(key_type, &pkey)?;

        Ok(Self {
            key_type,
            material: PrivateMaterial::KeyPair(pkey),
        })
    }

    /// Wrap a CMAC or HMAC shared secret
    pub fn from_secret(key_type: KeyType, secret: &[u8]) -> Result<Self, Error> {
        check_secret(key_type, secret)?;

        Ok(Self {
            key_type,
            material: PrivateMaterial::Secret(secret.to_vec()),
        })
    }

    /// Generate a fresh key of `key_type`
    pub fn generate(key_type: KeyType) -> Result<Self, Error> {
        let fail = crypto("key generation");

        let material = match key_type {
            KeyType::EcdsaP256Sha256 | KeyType::EcdsaP521Sha512 => {
                let group = EcGroup::from_curve_name(curve_of(key_type)).map_err(&fail)?;
                let ec = EcKey::generate(&group).map_err(&fail)?;
                PrivateMaterial::KeyPair(PKey::from_ec_key(ec).map_err(&fail)?)
            }
            KeyType::Rsa3072Sha256 | KeyType::Rsa4096Sha256 => {
                let rsa = Rsa::generate(rsa_bits(key_type)).map_err(&fail)?;
                PrivateMaterial::KeyPair(PKey::from_rsa(rsa).map_err(&fail)?)
            }
            KeyType::Ed25519Sha512 => {
                PrivateMaterial::KeyPair(PKey::generate_ed25519().map_err(&fail)?)
            }
            KeyType::Ed448Shake256 => {
                PrivateMaterial::KeyPair(PKey::generate_ed448().map_err(&fail)?)
            }
            KeyType::CmacAes | KeyType::HmacSha256 => {
                let mut secret = vec![0u8; if key_type == KeyType::CmacAes { 16 } else { 32 }];
                openssl::rand::rand_bytes(&mut secret).map_err(&fail)?;
                PrivateMaterial::Secret(secret)
            }
            KeyType::Sm2Sm3 => return Err(unsupported(key_type)),
        };

        Ok(Self { key_type, material })
    }

    /// The matching verification key
    pub fn verifier(&self) -> Result<TokenVerifier, Error> {
        let material = match &self.material {
            PrivateMaterial::KeyPair(k) => {
                let der = k
                    .public_key_to_der()
                    .map_err(|e| Error::Key(format!("{e:?}")))?;
                let public =
                    PKey::public_key_from_der(&der).map_err(|e| Error::Key(format!("{e:?}")))?;
                PublicMaterial::PublicKey(public)
            }
            PrivateMaterial::Secret(s) => PublicMaterial::Secret(s.clone()),
        };

        Ok(TokenVerifier {
            key_type: self.key_type,
            material,
        })
    }
}

impl TokenSigner for SigningKey {
    fn key_type(&self) -> KeyType {
        self.key_type
    }

    fn sign(&self, msg: &[u8]) -> Result<Vec<u8>, Error> {
        let sig = match &self.material {
            PrivateMaterial::KeyPair(k) => sign_asymmetric(self.key_type, k, msg)?,
            PrivateMaterial::Secret(s) => mac(self.key_type, s, msg)?,
        };

        if sig.len() != self.key_type.signature_size() {
            return Err(Error::Signing(format!(
                "{}: expecting {} signature bytes, got {}",
                self.key_type,
                self.key_type.signature_size(),
                sig.len()
            )));
        }

        Ok(sig)
    }
}

/// A public key or shared secret able to check token signatures
pub struct TokenVerifier {
    key_type: KeyType,
    material: PublicMaterial,
}

impl std::fmt::Debug for TokenVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenVerifier")
            .field("key_type", &self.key_type)
            .finish_non_exhaustive()
    }
}

impl TokenVerifier {
    /// Import a PEM or DER encoded public key, checking it is of `key_type`
    pub fn from_public_key(key_type: KeyType, raw: &[u8]) -> Result<Self, Error> {
        check_asymmetric(key_type)?;

        let pkey = PKey::public_key_from_pem(raw)
            .or_else(|_| PKey::public_key_from_der(raw))
            .map_err(|e| Error::Key(format!("{e:?}")))?;

        check_key_matches(key_type, &pkey)?;

        Ok(Self {
            key_type,
            material: PublicMaterial::PublicKey(pkey),
        })
    }

    pub fn from_secret(key_type: KeyType, secret: &[u8]) -> Result<Self, Error> {
        check_secret(key_type, secret)?;

        Ok(Self {
            key_type,
            material: PublicMaterial::Secret(secret.to_vec()),
        })
    }

    pub fn key_type(&self) -> KeyType {
        self.key_type
    }

    /// Check `sig` over `msg`
    pub fn verify(&self, msg: &[u8], sig: &[u8]) -> Result<(), Error> {
        if sig.len() != self.key_type.signature_size() {
            return Err(Error::Verification(format!(
                "{}: expecting {} signature bytes, got {}",
                self.key_type,
                self.key_type.signature_size(),
                sig.len()
            )));
        }

        let ok = match &self.material {
            PublicMaterial::PublicKey(k) => verify_asymmetric(self.key_type, k, msg, sig)
                .map_err(|e| Error::Verification(format!("{e:?}")))?,
            PublicMaterial::Secret(s) => {
                let expected = mac(self.key_type, s, msg)?;
                openssl::memcmp::eq(&expected, sig)
            }
        };

        if !ok {
            return Err(Error::Verification(format!(
                "{} signature does not match",
                self.key_type
            )));
        }

        Ok(())
    }
}

fn unsupported(key_type: KeyType) -> Error {
    Error::UnsupportedCryptosystem(format!("{key_type} (0x{:x})", key_type.code()))
}

fn check_asymmetric(key_type: KeyType) -> Result<(), Error> {
    match key_type {
        KeyType::Sm2Sm3 => Err(unsupported(key_type)),
        k if k.is_symmetric() => Err(Error::KeyMismatch(format!(
            "{k} expects a shared secret, not a key pair"
        ))),
        _ => Ok(()),
    }
}

fn check_secret(key_type: KeyType, secret: &[u8]) -> Result<(), Error> {
    match key_type {
        KeyType::CmacAes if secret.len() == 16 || secret.len() == 32 => Ok(()),
        KeyType::CmacAes => Err(Error::KeyMismatch(format!(
            "CMAC-AES expects a 16 or 32 byte secret, got {}",
            secret.len()
        ))),
        KeyType::HmacSha256 if !secret.is_empty() => Ok(()),
        KeyType::HmacSha256 => Err(Error::KeyMismatch("empty HMAC secret".to_string())),
        k => Err(Error::KeyMismatch(format!(
            "{k} expects a key pair, not a shared secret"
        ))),
    }
}

fn curve_of(key_type: KeyType) -> Nid {
    if key_type == KeyType::EcdsaP521Sha512 {
        Nid::SECP521R1
    } else {
        Nid::X9_62_PRIME256V1
    }
}

fn rsa_bits(key_type: KeyType) -> u32 {
    if key_type == KeyType::Rsa4096Sha256 {
        4096
    } else {
        3072
    }
}

fn digest_of(key_type: KeyType) -> MessageDigest {
    if key_type == KeyType::EcdsaP521Sha512 {
        MessageDigest::sha512()
    } else {
        MessageDigest::sha256()
    }
}

fn check_key_matches<T: HasPublic>(key_type: KeyType, pkey: &PKeyRef<T>) -> Result<(), Error> {
    let matches = match key_type {
        KeyType::EcdsaP256Sha256 | KeyType::EcdsaP521Sha512 => {
            pkey.id() == Id::EC
                && pkey
                    .ec_key()
                    .map(|k| k.group().curve_name() == Some(curve_of(key_type)))
                    .unwrap_or(false)
        }
        KeyType::Rsa3072Sha256 | KeyType::Rsa4096Sha256 => {
            pkey.id() == Id::RSA && pkey.bits() == rsa_bits(key_type)
        }
        KeyType::Ed25519Sha512 => pkey.id() == Id::ED25519,
        KeyType::Ed448Shake256 => pkey.id() == Id::ED448,
        _ => false,
    };

    if !matches {
        return Err(Error::KeyMismatch(format!(
            "key ({:?}, {} bits) is not a {key_type} key",
            pkey.id(),
            pkey.bits()
        )));
    }

    Ok(())
}

fn sign_asymmetric(key_type: KeyType, pkey: &PKey<Private>, msg: &[u8]) -> Result<Vec<u8>, Error> {
    let fail = crypto("sign");

    match key_type {
        KeyType::EcdsaP256Sha256 | KeyType::EcdsaP521Sha512 => {
            let width = key_type.signature_size() / 2;
            let digest = hash(digest_of(key_type), msg).map_err(&fail)?;
            let ec = pkey.ec_key().map_err(&fail)?;
            let sig = EcdsaSig::sign(&digest, &ec).map_err(&fail)?;

            let mut out = sig.r().to_vec_padded(width as i32).map_err(&fail)?;
            out.extend(sig.s().to_vec_padded(width as i32).map_err(&fail)?);
            Ok(out)
        }
        KeyType::Rsa3072Sha256 | KeyType::Rsa4096Sha256 => {
            let mut s = Signer::new(MessageDigest::sha256(), pkey).map_err(&fail)?;
            s.set_rsa_padding(Padding::PKCS1_PSS).map_err(&fail)?;
            s.set_rsa_pss_saltlen(RsaPssSaltlen::DIGEST_LENGTH)
                .map_err(&fail)?;
            s.set_rsa_mgf1_md(MessageDigest::sha256()).map_err(&fail)?;
            s.update(msg).map_err(&fail)?;
            Ok(s.sign_to_vec().map_err(&fail)?)
        }
        KeyType::Ed25519Sha512 | KeyType::Ed448Shake256 => {
            let mut s = Signer::new_without_digest(pkey).map_err(&fail)?;
            Ok(s.sign_oneshot_to_vec(msg).map_err(&fail)?)
        }
        k => Err(Error::KeyMismatch(format!("{k} cannot sign with a key pair"))),
    }
}

fn verify_asymmetric(
    key_type: KeyType,
    pkey: &PKey<Public>,
    msg: &[u8],
    sig: &[u8],
) -> Result<bool, ErrorStack> {
    match key_type {
        KeyType::EcdsaP256Sha256 | KeyType::EcdsaP521Sha512 => {
            let (r, s) = sig.split_at(sig.len() / 2);
            let sig = EcdsaSig::from_private_components(BigNum::from_slice(r)?, BigNum::from_slice(s)?)?;
            let digest = hash(digest_of(key_type), msg)?;
            let ec = pkey.ec_key()?;
            sig.verify(&digest, &ec)
        }
        KeyType::Rsa3072Sha256 | KeyType::Rsa4096Sha256 => {
            let mut v = Verifier::new(MessageDigest::sha256(), pkey)?;
            v.set_rsa_padding(Padding::PKCS1_PSS)?;
            v.set_rsa_pss_saltlen(RsaPssSaltlen::DIGEST_LENGTH)?;
            v.set_rsa_mgf1_md(MessageDigest::sha256())?;
            v.update(msg)?;
            v.verify(sig)
        }
        KeyType::Ed25519Sha512 | KeyType::Ed448Shake256 => {
            let mut v = Verifier::new_without_digest(pkey)?;
            v.verify_oneshot(sig, msg)
        }
        _ => Ok(false),
    }
}

fn mac(key_type: KeyType, secret: &[u8], msg: &[u8]) -> Result<Vec<u8>, Error> {
    let fail = crypto("mac");

    let pkey = match key_type {
        KeyType::HmacSha256 => PKey::hmac(secret).map_err(&fail)?,
        KeyType::CmacAes => {
            let cipher = if secret.len() == 32 {
                Cipher::aes_256_cbc()
            } else {
                Cipher::aes_128_cbc()
            };
            PKey::cmac(&cipher, secret).map_err(&fail)?
        }
        k => return Err(Error::KeyMismatch(format!("{k} is not a MAC"))),
    };

    let mut s = if key_type == KeyType::HmacSha256 {
        Signer::new(MessageDigest::sha256(), &pkey).map_err(&fail)?
    } else {
        Signer::new_without_digest(&pkey).map_err(&fail)?
    };

    s.update(msg).map_err(&fail)?;

    Ok(s.sign_to_vec().map_err(&fail)?)
}
