// Copyright 2023-2025 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use super::errors::Error;
use super::packet::PACKET_HEADER_SIZE;
use log::error;

/// Lifecycle of the message buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferState {
    Uninitialized,
    Empty,
    HoldingRequest,
    HoldingResponse,
}

/// Owner of the single message buffer shared by requests and responses.
///
/// At most one packet is in flight at any time: a lock can only be taken
/// from [`BufferState::Empty`] and must be released through the matching
/// release call before the next one.  [`BufferArbiter::lease_request`] and
/// [`BufferArbiter::lease_response`] wrap the pair in a guard that releases
/// on drop, so that every exit path returns the buffer to `Empty`.
#[derive(Debug)]
pub struct BufferArbiter {
    buf: Vec<u8>,
    state: BufferState,
}

impl Default for BufferArbiter {
    fn default() -> Self {
        Self::new()
    }
}

impl BufferArbiter {
    /// Returns an arbiter without backing storage
    pub fn new() -> Self {
        Self {
            buf: Vec::new(),
            state: BufferState::Uninitialized,
        }
    }

    /// Returns an arbiter already initialised with a zeroed buffer of `size`
    /// bytes
    pub fn with_size(size: usize) -> Result<Self, Error> {
        let mut a = Self::new();
        a.init(vec![0u8; size])?;
        Ok(a)
    }

    /// Hand the backing storage over to the arbiter.  The buffer must be word
    /// aligned in size and larger than a packet header.
    pub fn init(&mut self, buffer: Vec<u8>) -> Result<(), Error> {
        if self.state != BufferState::Uninitialized {
            return Err(Error::Contract(format!(
                "init called in state {:?}",
                self.state
            )));
        }

        let size = buffer.len();

        if size <= PACKET_HEADER_SIZE || size % 4 != 0 {
            return Err(Error::Contract(format!(
                "buffer of {size} bytes is unusable: must be a multiple of 4 larger than {PACKET_HEADER_SIZE}"
            )));
        }

        self.buf = buffer;
        self.state = BufferState::Empty;

        Ok(())
    }

    /// Take the storage back, returning the arbiter to `Uninitialized`.  Only
    /// allowed when no packet is held.
    pub fn teardown(&mut self) -> Result<Vec<u8>, Error> {
        if self.state != BufferState::Empty {
            return Err(Error::Contract(format!(
                "teardown called in state {:?}",
                self.state
            )));
        }

        self.state = BufferState::Uninitialized;

        Ok(std::mem::take(&mut self.buf))
    }

    pub fn state(&self) -> BufferState {
        self.state
    }

    /// Total size of the buffer, header included
    pub fn size(&self) -> usize {
        self.buf.len()
    }

    /// Largest payload a locked buffer can carry
    pub fn capacity(&self) -> usize {
        self.buf.len().saturating_sub(PACKET_HEADER_SIZE)
    }

    pub fn lock_for_request(&mut self) -> Result<usize, Error> {
        self.lock(BufferState::HoldingRequest)
    }

    pub fn lock_for_response(&mut self) -> Result<usize, Error> {
        self.lock(BufferState::HoldingResponse)
    }

    pub fn release_request(&mut self) -> Result<(), Error> {
        self.release(BufferState::HoldingRequest)
    }

    pub fn release_response(&mut self) -> Result<(), Error> {
        self.release(BufferState::HoldingResponse)
    }

    /// Lock the buffer for an outgoing packet; the lock is dropped with the
    /// returned guard
    pub fn lease_request(&mut self) -> Result<Lease<'_>, Error> {
        self.lease(BufferState::HoldingRequest)
    }

    /// Lock the buffer for an incoming packet; the lock is dropped with the
    /// returned guard
    pub fn lease_response(&mut self) -> Result<Lease<'_>, Error> {
        self.lease(BufferState::HoldingResponse)
    }

    fn lease(&mut self, holding: BufferState) -> Result<Lease<'_>, Error> {
        self.lock(holding)?;

        Ok(Lease {
            arbiter: self,
            holding,
            released: false,
        })
    }

    fn lock(&mut self, holding: BufferState) -> Result<usize, Error> {
        if self.state != BufferState::Empty {
            return Err(Error::Contract(format!(
                "cannot lock for {holding:?} in state {:?}",
                self.state
            )));
        }

        self.state = holding;

        Ok(self.capacity())
    }

    fn release(&mut self, holding: BufferState) -> Result<(), Error> {
        if self.state != holding {
            return Err(Error::Contract(format!(
                "cannot release {holding:?} in state {:?}",
                self.state
            )));
        }

        self.state = BufferState::Empty;

        Ok(())
    }
}

/// Scoped ownership of the locked message buffer
#[derive(Debug)]
pub struct Lease<'a> {
    arbiter: &'a mut BufferArbiter,
    holding: BufferState,
    released: bool,
}

impl<'a> Lease<'a> {
    /// Largest payload the buffer can carry
    pub fn capacity(&self) -> usize {
        self.arbiter.capacity()
    }

    /// Total size of the buffer, header included
    pub fn size(&self) -> usize {
        self.arbiter.size()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.arbiter.buf
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.arbiter.buf
    }

    /// Release the lock now rather than at the end of scope
    pub fn release(mut self) -> Result<(), Error> {
        self.released = true;
        self.arbiter.release(self.holding)
    }
}

impl Drop for Lease<'_> {
    fn drop(&mut self) {
        if self.released {
            return;
        }

        if let Err(e) = self.arbiter.release(self.holding) {
            error!(target: "transport", "releasing message buffer: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_once() {
        let mut a = BufferArbiter::new();
        assert_eq!(a.state(), BufferState::Uninitialized);

        a.init(vec![0; 64]).unwrap();
        assert_eq!(a.state(), BufferState::Empty);
        assert_eq!(a.capacity(), 60);

        assert!(matches!(a.init(vec![0; 64]), Err(Error::Contract(_))));
    }

    #[test]
    fn unusable_buffers() {
        assert!(BufferArbiter::with_size(4).is_err());
        assert!(BufferArbiter::with_size(10).is_err());
        assert!(BufferArbiter::with_size(8).is_ok());
    }

    #[test]
    fn lock_requires_init() {
        let mut a = BufferArbiter::new();

        assert!(a.lock_for_request().is_err());
        assert!(a.lock_for_response().is_err());
    }

    #[test]
    fn lock_after_lock_fails() {
        let mut a = BufferArbiter::with_size(32).unwrap();

        assert_eq!(a.lock_for_request().unwrap(), 28);
        assert!(matches!(a.lock_for_request(), Err(Error::Contract(_))));
        assert!(matches!(a.lock_for_response(), Err(Error::Contract(_))));
        assert_eq!(a.state(), BufferState::HoldingRequest);
    }

    #[test]
    fn release_without_lock_fails() {
        let mut a = BufferArbiter::with_size(32).unwrap();

        assert!(a.release_request().is_err());
        assert!(a.release_response().is_err());
        assert_eq!(a.state(), BufferState::Empty);
    }

    #[test]
    fn release_must_match() {
        let mut a = BufferArbiter::with_size(32).unwrap();

        a.lock_for_response().unwrap();
        assert!(a.release_request().is_err());
        assert_eq!(a.state(), BufferState::HoldingResponse);

        a.release_response().unwrap();
        assert_eq!(a.state(), BufferState::Empty);
    }

    #[test]
    fn lease_releases_on_drop() {
        let mut a = BufferArbiter::with_size(32).unwrap();

        {
            let mut l = a.lease_request().unwrap();
            l.bytes_mut()[0] = 0xAA;
        }
        assert_eq!(a.state(), BufferState::Empty);

        let l = a.lease_response().unwrap();
        l.release().unwrap();
        assert_eq!(a.state(), BufferState::Empty);
    }

    #[test]
    fn teardown_only_when_empty() {
        let mut a = BufferArbiter::with_size(16).unwrap();

        a.lock_for_request().unwrap();
        assert!(a.teardown().is_err());

        a.release_request().unwrap();
        assert_eq!(a.teardown().unwrap().len(), 16);
        assert_eq!(a.state(), BufferState::Uninitialized);
    }
}
