// Copyright 2023-2025 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use super::arbiter::{BufferArbiter, BufferState};
use super::errors::Error;
use super::link::Transport;
use crate::protocol::{round_to_word, Command, Status};
use log::{debug, error, log_enabled, trace, Level};

/// Size of the request and response packet headers
pub const PACKET_HEADER_SIZE: usize = 4;

/// Default size of the message buffer
pub const DEFAULT_BUFFER_SIZE: usize = 4096;

/// A framed host to target packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestPacket {
    pub command: Command,
    /// Payload length in 32-bit words
    pub word_count: u16,
    /// Payload, zero padded to `4 * word_count` bytes
    pub data: Vec<u8>,
}

impl RequestPacket {
    /// Frame `payload` behind `command`, padding it to a word boundary
    pub fn new(command: Command, payload: &[u8]) -> Result<Self, Error> {
        let padded = round_to_word(payload.len());
        let word_count = u16::try_from(padded / 4).map_err(|_| {
            Error::Overflow(format!(
                "{} payload bytes do not fit a packet",
                payload.len()
            ))
        })?;

        let mut data = payload.to_vec();
        data.resize(padded, 0);

        Ok(Self {
            command,
            word_count,
            data,
        })
    }

    /// Number of bytes on the wire
    pub fn wire_size(&self) -> usize {
        PACKET_HEADER_SIZE + 4 * self.word_count as usize
    }

    /// Serialise header and payload into the front of `buf`
    pub fn write_to(&self, buf: &mut [u8]) -> Result<usize, Error> {
        let n = self.wire_size();
        let len = buf.len();

        let out = buf
            .get_mut(..n)
            .ok_or_else(|| Error::Overflow(format!("{n} byte packet exceeds {len} byte buffer")))?;

        out[0..2].copy_from_slice(&self.command.code().to_le_bytes());
        out[2..4].copy_from_slice(&self.word_count.to_le_bytes());
        out[PACKET_HEADER_SIZE..].copy_from_slice(&self.data);

        Ok(n)
    }

    /// Parse a request as it appears on the wire
    pub fn decode(buf: &[u8]) -> Result<Self, Error> {
        let (code, word_count) = decode_header(buf)?;
        let body = body_of(buf, word_count)?;

        Ok(Self {
            command: Command::from(code),
            word_count,
            data: body.to_vec(),
        })
    }
}

/// A framed target to host packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponsePacket {
    pub status: Status,
    /// Payload length in 32-bit words
    pub word_count: u16,
    /// Payload, `4 * word_count` bytes
    pub data: Vec<u8>,
}

impl ResponsePacket {
    pub fn new(status: Status, payload: &[u8]) -> Result<Self, Error> {
        let r = RequestPacket::new(Command::Unknown(0), payload)?;

        Ok(Self {
            status,
            word_count: r.word_count,
            data: r.data,
        })
    }

    pub fn payload(&self) -> &[u8] {
        &self.data
    }

    /// Serialise as the target would put it on the wire
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(PACKET_HEADER_SIZE + self.data.len());
        out.extend_from_slice(&self.status.code().to_le_bytes());
        out.extend_from_slice(&self.word_count.to_le_bytes());
        out.extend_from_slice(&self.data);
        out
    }
}

/// Split a packet header into its code and word count
pub fn decode_header(buf: &[u8]) -> Result<(u16, u16), Error> {
    if buf.len() < PACKET_HEADER_SIZE {
        return Err(Error::Framing(format!(
            "{} bytes cannot hold a packet header",
            buf.len()
        )));
    }

    Ok((
        u16::from_le_bytes([buf[0], buf[1]]),
        u16::from_le_bytes([buf[2], buf[3]]),
    ))
}

fn body_of(buf: &[u8], word_count: u16) -> Result<&[u8], Error> {
    let end = PACKET_HEADER_SIZE + 4 * word_count as usize;

    buf.get(PACKET_HEADER_SIZE..end).ok_or_else(|| {
        Error::Framing(format!(
            "header announces {word_count} words, packet holds {} bytes",
            buf.len()
        ))
    })
}

/// The packet layer: the message buffer plus the transport it is exchanged
/// over.  Every call leaves the buffer `Empty` when it returns, whether it
/// succeeded or not.
#[derive(Debug)]
pub struct PacketChannel<T> {
    arbiter: BufferArbiter,
    transport: T,
}

impl<T: Transport> PacketChannel<T> {
    /// Bind `transport` to a freshly allocated message buffer of
    /// `buffer_size` bytes
    pub fn new(transport: T, buffer_size: usize) -> Result<Self, Error> {
        Ok(Self {
            arbiter: BufferArbiter::with_size(buffer_size)?,
            transport,
        })
    }

    pub fn arbiter(&self) -> &BufferArbiter {
        &self.arbiter
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Largest payload a single packet can carry
    pub fn capacity(&self) -> usize {
        self.arbiter.capacity()
    }

    /// Frame a request.  Fails if a packet is still held or if the payload
    /// does not fit the buffer.
    pub fn build_request(&self, command: Command, payload: &[u8]) -> Result<RequestPacket, Error> {
        if self.arbiter.state() != BufferState::Empty {
            return Err(Error::Contract(format!(
                "cannot build {command} request in state {:?}",
                self.arbiter.state()
            )));
        }

        let capacity = self.arbiter.capacity();

        if payload.len() > capacity {
            return Err(Error::Overflow(format!(
                "{command} payload of {} bytes exceeds buffer capacity {capacity}",
                payload.len()
            )));
        }

        RequestPacket::new(command, payload)
    }

    /// Transmit a request, returning the number of bytes sent
    pub fn send(&mut self, request: &RequestPacket) -> Result<usize, Error> {
        let mut lease = self.arbiter.lease_request()?;

        let n = request.write_to(lease.bytes_mut())?;

        if log_enabled!(target: "transport", Level::Trace) {
            trace!(target: "transport", "send {}", hex::encode(&lease.bytes()[..n]));
        }

        let sent = self.transport.send(&lease.bytes()[..n])?;

        if sent != n {
            error!(target: "transport", "short write: {sent} of {n} bytes");
            return Err(Error::Io(format!("short write: {sent} of {n} bytes")));
        }

        lease.release()?;

        Ok(sent)
    }

    /// Read one response.  The header is validated against the buffer
    /// capacity before any of the body is read.
    pub fn receive_response(&mut self) -> Result<ResponsePacket, Error> {
        let mut lease = self.arbiter.lease_response()?;
        let capacity = lease.capacity();

        let buf = lease.bytes_mut();

        let got = self.transport.receive(&mut buf[..PACKET_HEADER_SIZE])?;
        if got != PACKET_HEADER_SIZE {
            error!(target: "transport", "error receiving message header");
            return Err(Error::Io(format!(
                "short read on header: {got} of {PACKET_HEADER_SIZE} bytes"
            )));
        }

        let (status, word_count) = decode_header(buf)?;
        let body = 4 * word_count as usize;

        if PACKET_HEADER_SIZE + body > capacity {
            error!(
                target: "transport",
                "message would overflow buffer ({} > {capacity})",
                PACKET_HEADER_SIZE + body
            );
            return Err(Error::Overflow(format!(
                "response of {} bytes exceeds buffer capacity {capacity}",
                PACKET_HEADER_SIZE + body
            )));
        }

        if body > 0 {
            let window = &mut buf[PACKET_HEADER_SIZE..PACKET_HEADER_SIZE + body];
            let got = self.transport.receive(window)?;

            if got != body {
                error!(target: "transport", "error receiving message body");
                return Err(Error::Io(format!(
                    "short read on body: {got} of {body} bytes"
                )));
            }
        }

        let r = ResponsePacket {
            status: Status::from(status),
            word_count,
            data: buf[PACKET_HEADER_SIZE..PACKET_HEADER_SIZE + body].to_vec(),
        };

        if log_enabled!(target: "transport", Level::Trace) {
            trace!(
                target: "transport",
                "receive {}",
                hex::encode(&lease.bytes()[..PACKET_HEADER_SIZE + body])
            );
        }

        lease.release()?;

        debug!(
            target: "transport",
            "status = 0x{:04x}, data_count = {}",
            r.status.code(),
            r.word_count
        );

        Ok(r)
    }

    /// Send `payload` behind `command` and wait for the matching response
    pub fn exchange(&mut self, command: Command, payload: &[u8]) -> Result<ResponsePacket, Error> {
        let request = self.build_request(command, payload)?;
        self.send(&request)?;
        self.receive_response()
    }

    /// Tear the channel down, handing the transport back.  Fails if a packet
    /// is still held.
    pub fn into_transport(mut self) -> Result<T, Error> {
        self.arbiter.teardown()?;
        Ok(self.transport)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;
    use std::collections::VecDeque;

    // Records outgoing bytes, replays canned incoming bytes
    #[derive(Default)]
    struct Loopback {
        sent: Vec<u8>,
        incoming: VecDeque<u8>,
        reads: usize,
        // accept at most this many bytes per send
        send_limit: Option<usize>,
    }

    impl Transport for Loopback {
        fn send(&mut self, buf: &[u8]) -> Result<usize, Error> {
            let n = self.send_limit.map_or(buf.len(), |l| l.min(buf.len()));
            self.sent.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn receive(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
            self.reads += 1;
            let mut n = 0;
            for b in buf.iter_mut() {
                match self.incoming.pop_front() {
                    Some(x) => *b = x,
                    None => break,
                }
                n += 1;
            }
            Ok(n)
        }
    }

    fn channel(incoming: &[u8]) -> PacketChannel<Loopback> {
        let t = Loopback {
            incoming: incoming.iter().copied().collect(),
            ..Default::default()
        };
        PacketChannel::new(t, 64).unwrap()
    }

    #[test]
    fn request_framing() {
        let mut c = channel(&[]);

        let r = c.build_request(Command::Discovery, &hex!("0100 0200 03")).unwrap();
        assert_eq!(r.word_count, 2);

        assert_eq!(c.send(&r).unwrap(), 12);
        assert_eq!(
            c.transport_mut().sent,
            hex!("0100 0200 01000200 03000000").to_vec()
        );
        assert_eq!(c.arbiter().state(), BufferState::Empty);
    }

    #[test]
    fn empty_request() {
        let mut c = channel(&[]);

        let r = c.build_request(Command::Unknown(0xBAD), &[]).unwrap();
        assert_eq!(c.send(&r).unwrap(), 4);
        assert_eq!(c.transport_mut().sent, hex!("ad0b 0000").to_vec());
    }

    #[test]
    fn oversized_request() {
        let c = channel(&[]);

        assert!(c.build_request(Command::AuthResponse, &[0u8; 60]).is_ok());
        assert!(matches!(
            c.build_request(Command::AuthResponse, &[0u8; 61]),
            Err(Error::Overflow(_))
        ));
    }

    #[test]
    fn response_decoding() {
        let mut c = channel(&hex!("0200 0100 aabbccdd"));

        let r = c.receive_response().unwrap();
        assert_eq!(r.status, Status::NeedMoreData);
        assert_eq!(r.payload(), &hex!("aabbccdd"));
        assert_eq!(c.arbiter().state(), BufferState::Empty);
    }

    #[test]
    fn oversized_response_rejected_before_body() {
        // announces 0x20 words, i.e. 128 bytes, in a 64 byte buffer
        let mut c = channel(&hex!("0000 2000 00000000"));

        assert!(matches!(c.receive_response(), Err(Error::Overflow(_))));
        assert_eq!(c.transport_mut().reads, 1);
        assert_eq!(c.arbiter().state(), BufferState::Empty);
    }

    #[test]
    fn short_body_is_fatal() {
        let mut c = channel(&hex!("0000 0200 aabb"));

        assert!(matches!(c.receive_response(), Err(Error::Io(_))));
        assert_eq!(c.arbiter().state(), BufferState::Empty);
    }

    #[test]
    fn short_write_is_fatal() {
        let mut c = channel(&[]);
        c.transport_mut().send_limit = Some(6);

        let r = c.build_request(Command::Discovery, &hex!("0100 0800")).unwrap();

        assert!(matches!(c.send(&r), Err(Error::Io(_))));
        assert_eq!(c.transport_mut().sent, hex!("0100 0100 0100").to_vec());
        assert_eq!(c.arbiter().state(), BufferState::Empty);
    }

    #[test]
    fn short_header_is_fatal() {
        let mut c = channel(&hex!("00"));

        assert!(matches!(c.receive_response(), Err(Error::Io(_))));
        assert_eq!(c.arbiter().state(), BufferState::Empty);
    }

    #[test]
    fn wire_round_trip() {
        let r = RequestPacket::new(Command::LcsChange, &hex!("0102")).unwrap();
        let mut buf = [0u8; 16];
        let n = r.write_to(&mut buf).unwrap();

        assert_eq!(RequestPacket::decode(&buf[..n]).unwrap(), r);

        let p = ResponsePacket::new(Status::InvalidCommand, &[]).unwrap();
        assert_eq!(p.encode(), hex!("ff7f 0000").to_vec());
    }

    #[test]
    fn into_transport_requires_empty() {
        let c = channel(&[]);

        assert!(c.into_transport().is_ok());
    }
}
