// Copyright 2023-2025 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use super::errors::Error;
use log::debug;
use std::io::{ErrorKind, Read, Write};
use std::net::TcpStream;
use std::time::Duration;

/// Byte pipe to the target.
///
/// Both calls block until the whole buffer has been transferred or the peer
/// goes away.  They return the number of bytes actually moved; anything short
/// of `buf.len()` is treated by the caller as fatal for the exchange.
pub trait Transport {
    fn send(&mut self, buf: &[u8]) -> Result<usize, Error>;

    fn receive(&mut self, buf: &mut [u8]) -> Result<usize, Error>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn send(&mut self, buf: &[u8]) -> Result<usize, Error> {
        (**self).send(buf)
    }

    fn receive(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
        (**self).receive(buf)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send(&mut self, buf: &[u8]) -> Result<usize, Error> {
        (**self).send(buf)
    }

    fn receive(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
        (**self).receive(buf)
    }
}

/// [`Transport`] over any blocking byte stream (Unix-domain or TCP socket,
/// serial port, pipe)
#[derive(Debug)]
pub struct StreamTransport<S> {
    stream: S,
}

impl<S: Read + Write> StreamTransport<S> {
    pub fn new(stream: S) -> Self {
        Self { stream }
    }

    pub fn into_inner(self) -> S {
        self.stream
    }
}

impl<S: Read + Write> Transport for StreamTransport<S> {
    fn send(&mut self, buf: &[u8]) -> Result<usize, Error> {
        let mut done = 0;

        while done < buf.len() {
            match self.stream.write(&buf[done..]) {
                Ok(0) => break,
                Ok(n) => done += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }

        self.stream.flush()?;

        Ok(done)
    }

    fn receive(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
        let mut done = 0;

        while done < buf.len() {
            match self.stream.read(&mut buf[done..]) {
                Ok(0) => break,
                Ok(n) => done += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }

        Ok(done)
    }
}

/// Connect to a target listening on a TCP endpoint (`host:port`)
pub fn connect_tcp(
    endpoint: &str,
    timeout: Option<Duration>,
) -> Result<StreamTransport<TcpStream>, Error> {
    debug!(target: "transport", "connecting to tcp:{endpoint}");

    let s = TcpStream::connect(endpoint)?;
    s.set_read_timeout(timeout)?;
    s.set_nodelay(true)?;

    Ok(StreamTransport::new(s))
}

/// Connect to a target listening on a Unix-domain socket
#[cfg(unix)]
pub fn connect_unix<P: AsRef<std::path::Path>>(
    path: P,
    timeout: Option<Duration>,
) -> Result<StreamTransport<std::os::unix::net::UnixStream>, Error> {
    let path = path.as_ref();

    debug!(target: "transport", "connecting to unix:{}", path.display());

    let s = std::os::unix::net::UnixStream::connect(path)?;
    s.set_read_timeout(timeout)?;

    Ok(StreamTransport::new(s))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    // Reads from a canned input and records whatever is written
    struct Pipe {
        input: Cursor<Vec<u8>>,
        output: Vec<u8>,
    }

    impl Read for Pipe {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            // hand out at most 3 bytes per call to exercise the loops
            let n = buf.len().min(3);
            self.input.read(&mut buf[..n])
        }
    }

    impl Write for Pipe {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            let n = buf.len().min(5);
            self.output.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn full_transfers() {
        let mut t = StreamTransport::new(Pipe {
            input: Cursor::new((0u8..16).collect()),
            output: Vec::new(),
        });

        assert_eq!(t.send(&[7u8; 12]).unwrap(), 12);

        let mut buf = [0u8; 10];
        assert_eq!(t.receive(&mut buf).unwrap(), 10);
        assert_eq!(buf[9], 9);

        assert_eq!(t.into_inner().output, vec![7u8; 12]);
    }

    #[test]
    fn short_read_on_eof() {
        let mut t = StreamTransport::new(Pipe {
            input: Cursor::new(vec![1, 2]),
            output: Vec::new(),
        });

        let mut buf = [0u8; 4];
        assert_eq!(t.receive(&mut buf).unwrap(), 2);
    }
}
