// Copyright 2023-2025 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

//! The packet layer: a single message buffer guarded by a
//! [`BufferArbiter`], request/response framing, and the byte pipe to the
//! target.

pub use self::arbiter::{BufferArbiter, BufferState, Lease};
pub use self::errors::Error;
pub use self::link::{connect_tcp, StreamTransport, Transport};
#[cfg(unix)]
pub use self::link::connect_unix;
pub use self::packet::{
    decode_header, PacketChannel, RequestPacket, ResponsePacket, DEFAULT_BUFFER_SIZE,
    PACKET_HEADER_SIZE,
};

mod arbiter;
mod errors;
mod link;
mod packet;
