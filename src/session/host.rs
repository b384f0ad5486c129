// Copyright 2023-2025 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use super::discovery::{discovery_request, Discovery};
use super::errors::Error;
use super::state::{SessionEvent, SessionFsm, SessionState};
use crate::cert::CertificateChain;
use crate::protocol::{Command, KeyType, Status, Tlv, PERMISSIONS_SIZE};
use crate::token::{self, construct_token, AuthToken, Challenge, TokenSigner};
use crate::transport::{BufferArbiter, PacketChannel, ResponsePacket, Transport};
use log::{debug, error, info, warn};

/// Verdict of the target on an authentication token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthOutcome {
    Granted,
    Denied(Status),
}

/// Verdict of the target on a lifecycle change request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LcsOutcome {
    /// The target applied the change
    Applied,
    /// The target does not implement lifecycle changes
    NotImplemented,
    /// The target implements lifecycle changes but refused this request
    /// (`Unsupported`, `InvalidParameters` or `Failure`)
    Rejected(Status),
}

/// Host side of an ADAC session with one target.
///
/// Every exchange goes through a single message buffer.  The session only
/// moves on the target's answers: a failed exchange leaves it where it was.
#[derive(Debug)]
pub struct Session<T> {
    channel: PacketChannel<T>,
    fsm: SessionFsm,
    discovery: Option<Discovery>,
    challenge: Option<Challenge>,
    challenges_issued: u64,
    requested_permissions: [u8; PERMISSIONS_SIZE],
}

impl<T: Transport> Session<T> {
    pub fn new(transport: T, buffer_size: usize) -> Result<Self, Error> {
        Ok(Self {
            channel: PacketChannel::new(transport, buffer_size)?,
            fsm: SessionFsm::new(),
            discovery: None,
            challenge: None,
            challenges_issued: 0,
            requested_permissions: [0xff; PERMISSIONS_SIZE],
        })
    }

    /// Permissions asked for in tokens built by [`Session::prepare_token`]
    pub fn with_permissions(mut self, permissions: [u8; PERMISSIONS_SIZE]) -> Self {
        self.requested_permissions = permissions;
        self
    }

    pub fn state(&self) -> SessionState {
        self.fsm.state()
    }

    pub fn arbiter(&self) -> &BufferArbiter {
        self.channel.arbiter()
    }

    /// The last successful discovery, if any
    pub fn discovery(&self) -> Option<&Discovery> {
        self.discovery.as_ref()
    }

    /// The outstanding challenge, if any
    pub fn challenge(&self) -> Option<&Challenge> {
        self.challenge.as_ref()
    }

    /// Number of challenges obtained in this session
    pub fn challenges_issued(&self) -> u64 {
        self.challenges_issued
    }

    pub fn transport_mut(&mut self) -> &mut T {
        self.channel.transport_mut()
    }

    /// Send `command` with `payload` and return the target's answer without
    /// touching the session state.  Codes outside the known set are sent as
    /// they are.
    pub fn issue(&mut self, command: Command, payload: &[u8]) -> Result<ResponsePacket, Error> {
        match command {
            Command::Discovery => info!(target: "host", "Sending discovery request"),
            Command::AuthStart => info!(target: "host", "Sending challenge request"),
            Command::AuthResponse => info!(target: "host", "Sending authentication response"),
            Command::CloseSession => info!(target: "host", "Sending close session command"),
            Command::LockDebug => info!(target: "host", "Sending lock debug request"),
            Command::LcsChange => info!(target: "host", "Sending LCS change command"),
            Command::Vendor(c) => {
                info!(target: "host", "Vendor specific command provided. ID=(0x{c:04x})")
            }
            Command::Unknown(c) => {
                warn!(target: "host", "Unrecognized command. ID=(0x{c:04x})")
            }
        }

        let r = self.channel.exchange(command, payload)?;

        debug!(target: "host", "{command}: {:?}", r.status);

        Ok(r)
    }

    /// Ask the target for its capabilities.  An empty `type_ids` asks for
    /// all of them.
    pub fn discover(&mut self, type_ids: &[u16]) -> Result<&Discovery, Error> {
        self.require(SessionEvent::Discovered)?;

        let r = self.issue(Command::Discovery, &discovery_request(type_ids))?;
        expect_status(Command::Discovery, &r, Status::Success)?;

        info!(target: "host", "Receiving discovery response...");

        let d = Discovery::decode(r.payload())?;

        self.fsm.apply(SessionEvent::Discovered)?;

        Ok(self.discovery.insert(d))
    }

    /// Check the last discovery lists `key_type`
    pub fn check_cryptosystem_support(&self, key_type: KeyType) -> Result<(), Error> {
        self.discovery
            .as_ref()
            .ok_or_else(|| Error::InvalidTransition("no discovery performed".to_string()))?
            .check_cryptosystem_support(key_type)
    }

    /// Obtain a fresh challenge.  Any previous challenge is superseded.
    pub fn auth_start(&mut self) -> Result<Challenge, Error> {
        self.require(SessionEvent::ChallengeIssued)?;

        let r = self.issue(Command::AuthStart, &[])?;
        expect_status(Command::AuthStart, &r, Status::Success)?;

        info!(target: "host", "Receiving challenge..");

        let c = Challenge::decode(r.payload())?;

        if self.challenge.as_ref() == Some(&c) {
            warn!(target: "host", "target repeated the previous challenge");
        }

        self.fsm.apply(SessionEvent::ChallengeIssued)?;

        self.challenges_issued += 1;
        self.challenge = Some(c.clone());

        Ok(c)
    }

    /// Send one certificate record as an AuthResponse.  `NeedMoreData`
    /// moves the session on, `Failure` rejects it; any other status is an
    /// error.
    pub fn send_certificate_record(&mut self, record: &[u8]) -> Result<Status, Error> {
        self.require(SessionEvent::CertificateAccepted)?;

        info!(target: "host", "Sending Certificate..");

        let r = self.issue(Command::AuthResponse, record)?;

        match r.status {
            Status::NeedMoreData => {
                self.fsm.apply(SessionEvent::CertificateAccepted)?;
            }
            Status::Failure => {
                warn!(target: "host", "certificate rejected by target");
                self.fsm.apply(SessionEvent::CertificateRejected)?;
            }
            s => {
                error!(target: "host", "Unexpected response status {:x}", s.code());
                return Err(unexpected(Command::AuthResponse, s));
            }
        }

        Ok(r.status)
    }

    /// Send every binary certificate of `chain`, in chain order.  Returns
    /// `NeedMoreData` when the target accepted all of them and waits for the
    /// token, or `Failure` as soon as it rejects one.  A chain without a leaf
    /// certificate is refused before anything is sent.
    pub fn send_certificates(&mut self, chain: &CertificateChain) -> Result<Status, Error> {
        chain.leaf()?;

        let mut last = None;

        for c in chain.certificates() {
            let c = c?;
            let status = self.send_certificate_record(&c.to_bytes()?)?;

            last = Some(status);

            if status == Status::Failure {
                break;
            }
        }

        last.ok_or_else(|| {
            Error::Certificate(crate::cert::Error::Sema(
                "no binary certificate in chain".to_string(),
            ))
        })
    }

    /// Build a token answering `challenge` for `chain`.  The chain must hold
    /// a leaf certificate, bound to the same cryptosystem as `signer`; both
    /// are checked before anything is signed.
    pub fn prepare_token(
        &self,
        chain: &CertificateChain,
        challenge: &Challenge,
        signer: &dyn TokenSigner,
        extensions: &[u8],
    ) -> Result<AuthToken, Error> {
        let leaf = chain.leaf()?;

        debug!(target: "host", "leaf certificate at position {}", leaf.index);

        let declared = chain.detect_cryptosystem()?;

        if declared != signer.key_type() {
            return Err(token::Error::KeyMismatch(format!(
                "chain uses {declared}, key is {}",
                signer.key_type()
            ))
            .into());
        }

        Ok(construct_token(
            challenge,
            extensions,
            &self.requested_permissions,
            signer,
        )?)
    }

    /// Submit `token`.  A token answering a superseded challenge is still
    /// sent; the target is expected to refuse it.
    pub fn authenticate(&mut self, token: &AuthToken) -> Result<AuthOutcome, Error> {
        self.require(SessionEvent::TokenAccepted)?;

        match &self.challenge {
            Some(c) if !token.is_bound_to(c) => {
                warn!(target: "host", "token does not answer the outstanding challenge")
            }
            None => warn!(target: "host", "no outstanding challenge"),
            _ => {}
        }

        let r = self.issue(Command::AuthResponse, &token.fragment()?)?;

        // a challenge is good for one token at most
        self.challenge = None;

        match r.status {
            Status::Success => {
                info!(target: "host", "debug access granted");
                self.fsm.apply(SessionEvent::TokenAccepted)?;
                Ok(AuthOutcome::Granted)
            }
            s @ (Status::Failure | Status::Unsupported | Status::InvalidParameters) => {
                warn!(target: "host", "token rejected by target: {s:?}");
                self.fsm.apply(SessionEvent::TokenRejected)?;
                Ok(AuthOutcome::Denied(s))
            }
            s => Err(unexpected(Command::AuthResponse, s)),
        }
    }

    /// Give up debug access
    pub fn lock_debug(&mut self) -> Result<Status, Error> {
        self.require(SessionEvent::DebugLocked)?;

        let r = self.issue(Command::LockDebug, &[])?;

        if r.status == Status::Success {
            self.fsm.apply(SessionEvent::DebugLocked)?;
        }

        Ok(r.status)
    }

    /// Tell the target the session is over (resume boot)
    pub fn close_session(&mut self) -> Result<Status, Error> {
        let r = self.issue(Command::CloseSession, &[])?;

        if r.status == Status::Success {
            self.fsm.apply(SessionEvent::SessionClosed)?;
            self.challenge = None;
        }

        Ok(r.status)
    }

    /// Request a lifecycle change.  `request` is the lifecycle record to
    /// send; `None` sends an empty request.  The session only moves once the
    /// target has answered.
    pub fn change_lifecycle(&mut self, request: Option<&Tlv>) -> Result<LcsOutcome, Error> {
        self.require(SessionEvent::LcsRequested)?;

        let payload = match request {
            Some(t) => t.encode()?,
            None => Vec::new(),
        };

        let r = self.issue(Command::LcsChange, &payload)?;

        let outcome = match r.status {
            Status::Success => LcsOutcome::Applied,
            Status::InvalidCommand => LcsOutcome::NotImplemented,
            s @ (Status::Unsupported | Status::InvalidParameters | Status::Failure) => {
                LcsOutcome::Rejected(s)
            }
            s => return Err(unexpected(Command::LcsChange, s)),
        };

        self.fsm.apply(SessionEvent::LcsRequested)?;

        if outcome == LcsOutcome::Applied {
            self.fsm.apply(SessionEvent::LcsApplied)?;
            self.discovery = None;
            self.challenge = None;
        } else {
            self.fsm.apply(SessionEvent::LcsRefused)?;
        }

        info!(target: "host", "LCS change: {outcome:?}");

        Ok(outcome)
    }

    /// End the session and hand the transport back.  Fails if the message
    /// buffer still holds a packet.
    pub fn close(self) -> Result<T, Error> {
        Ok(self.channel.into_transport()?)
    }

    fn require(&self, ev: SessionEvent) -> Result<(), Error> {
        if !self.fsm.allows(ev) {
            return Err(Error::InvalidTransition(format!(
                "{ev:?} not allowed in state {:?}",
                self.fsm.state()
            )));
        }
        Ok(())
    }
}

fn unexpected(command: Command, status: Status) -> Error {
    Error::UnexpectedStatus(format!(
        "{command}: status 0x{:04x} ({status:?})",
        status.code()
    ))
}

fn expect_status(command: Command, r: &ResponsePacket, status: Status) -> Result<(), Error> {
    if r.status != status {
        return Err(unexpected(command, r.status));
    }
    Ok(())
}
