// Copyright 2023-2025 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

//! An in-memory ADAC target, answering the host over a [`Transport`].

#![allow(dead_code)]

use adac_host::cert::CertificateHeader;
use adac_host::protocol::*;
use adac_host::token::{AuthToken, Challenge, SigningKey, TokenSigner, TokenVerifier};
use adac_host::transport::{self, decode_header, ResponsePacket, Transport, PACKET_HEADER_SIZE};
use std::collections::VecDeque;

/// Reply to every request with a header announcing this many words, and no
/// body
pub const OVERSIZED_WORDS: u16 = 0xFFFF;

#[derive(Debug)]
pub struct Target {
    capabilities: Vec<Tlv>,
    key_type: KeyType,
    verifier: TokenVerifier,

    challenge: Option<[u8; CHALLENGE_SIZE]>,
    certificates: usize,
    scope: u32,

    pub lcs_supported: bool,
    pub oversized: bool,
    /// Fail every send, as a dropped link would
    pub link_down: bool,
    pub authenticated: bool,
    pub lifecycle: u16,
    pub challenges: Vec<[u8; CHALLENGE_SIZE]>,

    inbox: Vec<u8>,
    outbox: VecDeque<u8>,
}

impl Target {
    /// A target trusting tokens signed by `key`, and listing `offered` as its
    /// cryptosystems
    pub fn new(key: &SigningKey, offered: &[KeyType]) -> Self {
        let lifecycle: u16 = 0x3000;
        let crypto: Vec<u8> = offered.iter().map(|k| k.code()).collect();

        let capabilities = vec![
            Tlv::new(AUTH_VERSION, &[FORMAT_VERSION_MAJOR, FORMAT_VERSION_MINOR]),
            Tlv::new(VENDOR_ID, &0x003Bu16.to_le_bytes()),
            Tlv::new(SOC_CLASS, &0x11u32.to_le_bytes()),
            Tlv::new(PSA_LIFECYCLE, &lifecycle.to_le_bytes()),
            Tlv::new(TOKEN_FORMATS, &PSA_BINARY_TOKEN.to_le_bytes()),
            Tlv::new(CERT_FORMATS, &PSA_BINARY_CRT.to_le_bytes()),
            Tlv::new(CRYPTOSYSTEMS, &crypto),
        ];

        Self {
            capabilities,
            key_type: key.key_type(),
            verifier: key.verifier().unwrap(),
            challenge: None,
            certificates: 0,
            scope: 0,
            lcs_supported: true,
            oversized: false,
            link_down: false,
            authenticated: false,
            lifecycle,
            challenges: Vec::new(),
            inbox: Vec::new(),
            outbox: VecDeque::new(),
        }
    }

    /// Drop the cryptosystems record from the capabilities
    pub fn without_cryptosystems(mut self) -> Self {
        self.capabilities.retain(|t| t.type_id != CRYPTOSYSTEMS);
        self
    }

    pub fn capability_count(&self) -> usize {
        self.capabilities.len()
    }

    /// Certificates accepted since the last challenge
    pub fn certificates_received(&self) -> usize {
        self.certificates
    }

    fn respond(&mut self, status: Status, payload: &[u8]) {
        let r = ResponsePacket::new(status, payload).unwrap();
        self.outbox.extend(r.encode());
    }

    fn handle(&mut self, command: Command, payload: &[u8]) {
        if self.oversized {
            self.outbox.extend(0u16.to_le_bytes());
            self.outbox.extend(OVERSIZED_WORDS.to_le_bytes());
            return;
        }

        let (status, body) = match command {
            Command::Discovery => (Status::Success, self.discovery(payload)),
            Command::AuthStart => (Status::Success, self.auth_start()),
            Command::AuthResponse => (self.auth_response(payload), Vec::new()),
            Command::LockDebug => {
                self.authenticated = false;
                (Status::Success, Vec::new())
            }
            Command::CloseSession => {
                self.challenge = None;
                self.authenticated = false;
                (Status::Success, Vec::new())
            }
            Command::LcsChange => (self.lcs_change(payload), Vec::new()),
            Command::Vendor(_) | Command::Unknown(_) => (Status::InvalidCommand, Vec::new()),
        };

        self.respond(status, &body);
    }

    fn discovery(&self, payload: &[u8]) -> Vec<u8> {
        let wanted: Vec<u16> = payload
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
            .filter(|t| *t != 0)
            .collect();

        let mut out = Vec::new();

        for t in &self.capabilities {
            // auth_version is always reported
            if wanted.is_empty() || wanted.contains(&t.type_id) || t.type_id == AUTH_VERSION {
                out.extend(t.encode().unwrap());
            }
        }

        out
    }

    fn auth_start(&mut self) -> Vec<u8> {
        let mut v = [0u8; CHALLENGE_SIZE];
        openssl::rand::rand_bytes(&mut v).unwrap();

        self.challenge = Some(v);
        self.challenges.push(v);
        self.certificates = 0;
        self.scope = 0;

        Challenge::new(v).encode().to_vec()
    }

    fn auth_response(&mut self, payload: &[u8]) -> Status {
        let Ok(record) = Tlv::decode(payload) else {
            return Status::InvalidParameters;
        };

        match record.type_id {
            PSA_BINARY_CRT => self.certificate(&record.value),
            PSA_BINARY_TOKEN => self.token(payload),
            _ => Status::InvalidParameters,
        }
    }

    fn certificate(&mut self, body: &[u8]) -> Status {
        if self.challenge.is_none() {
            return Status::Failure;
        }

        let Ok(h) = CertificateHeader::decode(body) else {
            return Status::Failure;
        };

        let root = h.role() == Some(CertificateRole::Root);

        if h.soc_class != 0 {
            if !root && self.scope != 0 && h.soc_class != self.scope {
                self.challenge = None;
                return Status::Failure;
            }
            self.scope = h.soc_class;
        }

        self.certificates += 1;

        Status::NeedMoreData
    }

    fn token(&mut self, fragment: &[u8]) -> Status {
        // whatever happens, a challenge is good for one attempt
        let Some(challenge) = self.challenge.take() else {
            return Status::Failure;
        };

        if self.certificates == 0 {
            return Status::Failure;
        }

        let Ok(t) = AuthToken::decode(fragment, self.key_type) else {
            return Status::Failure;
        };

        if t.challenge_vector() != &challenge || t.verify(&self.verifier).is_err() {
            return Status::Failure;
        }

        self.authenticated = true;

        Status::Success
    }

    fn lcs_change(&mut self, payload: &[u8]) -> Status {
        if !self.lcs_supported {
            return Status::InvalidCommand;
        }

        if payload.is_empty() {
            return Status::InvalidParameters;
        }

        match Tlv::decode(payload) {
            Ok(t) if t.type_id == PSA_LIFECYCLE && t.value.len() == 2 => {
                let v = u16::from_le_bytes([t.value[0], t.value[1]]);
                if !is_valid_lifecycle(v) {
                    return Status::InvalidParameters;
                }
                self.set_lifecycle(v);
                Status::Success
            }
            _ => Status::InvalidParameters,
        }
    }

    fn set_lifecycle(&mut self, v: u16) {
        self.lifecycle = v;

        for t in self.capabilities.iter_mut() {
            if t.type_id == PSA_LIFECYCLE {
                *t = Tlv::new(PSA_LIFECYCLE, &v.to_le_bytes());
            }
        }
    }

    // Serve every complete request sitting in the inbox
    fn pump(&mut self) {
        loop {
            let Ok((code, words)) = decode_header(&self.inbox) else {
                return;
            };

            let end = PACKET_HEADER_SIZE + 4 * words as usize;
            if self.inbox.len() < end {
                return;
            }

            let payload = self.inbox[PACKET_HEADER_SIZE..end].to_vec();
            self.inbox.drain(..end);

            self.handle(Command::from(code), &payload);
        }
    }
}

impl Transport for Target {
    fn send(&mut self, buf: &[u8]) -> Result<usize, transport::Error> {
        if self.link_down {
            return Err(transport::Error::Io("link down".to_string()));
        }

        self.inbox.extend_from_slice(buf);
        self.pump();
        Ok(buf.len())
    }

    fn receive(&mut self, buf: &mut [u8]) -> Result<usize, transport::Error> {
        let n = buf.len().min(self.outbox.len());
        for (dst, src) in buf.iter_mut().zip(self.outbox.drain(..n)) {
            *dst = src;
        }
        Ok(n)
    }
}

/// Describes one certificate of a test chain
#[derive(Debug, Clone, Copy)]
pub struct CertTemplate {
    pub role: CertificateRole,
    pub soc_class: u32,
}

pub const ROOT: CertTemplate = CertTemplate {
    role: CertificateRole::Root,
    soc_class: 0,
};

pub const INTERMEDIATE: CertTemplate = CertTemplate {
    role: CertificateRole::Intermediate,
    soc_class: 0x11,
};

pub const LEAF: CertTemplate = CertTemplate {
    role: CertificateRole::Leaf,
    soc_class: 0x11,
};

/// Encode a chain of binary certificates bound to `key_type`.  Bodies past
/// the header are filler: the simulated target does not check certificate
/// signatures.
pub fn build_chain(key_type: KeyType, certs: &[CertTemplate]) -> Vec<u8> {
    let mut out = Vec::new();

    for c in certs {
        let h = CertificateHeader {
            version_major: FORMAT_VERSION_MAJOR,
            version_minor: FORMAT_VERSION_MINOR,
            signature_type: key_type.code(),
            key_type: key_type.code(),
            role: c.role.code(),
            usage: 0,
            reserved: 0,
            lifecycle: 0,
            oem_constraint: 0,
            extensions_bytes: 0,
            soc_class: c.soc_class,
            soc_id: [0; 16],
            permissions_mask: [0xff; PERMISSIONS_SIZE],
        };

        let mut body = h.encode().to_vec();
        body.extend(std::iter::repeat(0xC5).take(key_type.signature_size()));

        tlv::encode_into(&mut out, PSA_BINARY_CRT, &body).unwrap();
    }

    out
}

/// A three level chain bound to `key_type`
pub fn standard_chain(key_type: KeyType) -> Vec<u8> {
    build_chain(key_type, &[ROOT, INTERMEDIATE, LEAF])
}
