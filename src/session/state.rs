// Copyright 2023-2025 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use super::errors::Error;

/// Where the host stands in the authentication sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Nothing known about the target yet
    Idle,
    /// Capabilities discovered
    Discovered,
    /// A challenge is outstanding
    Challenged,
    /// The target accepted the certificates and waits for the token
    CertSent,
    /// Debug access granted
    Authenticated,
    /// The target refused a certificate or the token
    Rejected,
    /// A lifecycle change request is in flight
    LcsPending,
}

/// Outcomes of exchanges that move the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    Discovered,
    ChallengeIssued,
    CertificateAccepted,
    CertificateRejected,
    TokenAccepted,
    TokenRejected,
    LcsRequested,
    LcsApplied,
    LcsRefused,
    DebugLocked,
    SessionClosed,
}

/// The transition table of the host session
#[derive(Debug)]
pub struct SessionFsm {
    state: SessionState,
    // state to return to when a lifecycle change is refused
    lcs_origin: SessionState,
}

impl Default for SessionFsm {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionFsm {
    pub fn new() -> Self {
        Self {
            state: SessionState::Idle,
            lcs_origin: SessionState::Idle,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether `ev` is acceptable in the current state
    pub fn allows(&self, ev: SessionEvent) -> bool {
        self.next(ev).is_some()
    }

    /// Advance on `ev`, returning the new state
    pub fn apply(&mut self, ev: SessionEvent) -> Result<SessionState, Error> {
        let new = self.next(ev).ok_or_else(|| {
            Error::InvalidTransition(format!("{ev:?} in state {:?}", self.state))
        })?;

        if ev == SessionEvent::LcsRequested {
            self.lcs_origin = self.state;
        }

        self.state = new;

        Ok(new)
    }

    fn next(&self, ev: SessionEvent) -> Option<SessionState> {
        use SessionEvent as E;
        use SessionState as S;

        let new = match (self.state, ev) {
            (S::Idle, E::Discovered) => S::Discovered,
            (S::LcsPending, E::Discovered) => return None,
            (s, E::Discovered) => s,

            (
                S::Discovered | S::Challenged | S::CertSent | S::Authenticated | S::Rejected,
                E::ChallengeIssued,
            ) => S::Challenged,

            (S::Challenged | S::CertSent, E::CertificateAccepted) => S::CertSent,
            (S::Challenged | S::CertSent, E::CertificateRejected) => S::Rejected,

            (S::CertSent, E::TokenAccepted) => S::Authenticated,
            (S::CertSent, E::TokenRejected) => S::Rejected,

            (S::Discovered | S::Authenticated, E::LcsRequested) => S::LcsPending,
            (S::LcsPending, E::LcsApplied) => S::Idle,
            (S::LcsPending, E::LcsRefused) => self.lcs_origin,

            (S::Authenticated, E::DebugLocked) => S::Discovered,
            (S::Idle | S::LcsPending, E::DebugLocked) => return None,
            (s, E::DebugLocked) => s,

            (_, E::SessionClosed) => S::Idle,

            _ => return None,
        };

        Some(new)
    }
}
