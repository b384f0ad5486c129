// Copyright 2023-2025 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

//! Host configuration, loaded from JSON.
//!
//! ```json
//! {
//!   "endpoint": "tcp:localhost:9000",
//!   "buffer_size": 4096,
//!   "max_extensions": 16,
//!   "chain": "chain.bin",
//!   "key": "leaf.pem",
//!   "requested_permissions": "ffffffffffffffffffffffffffffffff"
//! }
//! ```

use crate::protocol::{MAX_EXTENSIONS, PERMISSIONS_SIZE};
use crate::transport::{DEFAULT_BUFFER_SIZE, PACKET_HEADER_SIZE};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

#[derive(thiserror::Error, PartialEq, Eq)]
pub enum Error {
    #[error("Syntax error: {0}")]
    Syntax(String),
    #[error("Semantic error: {0}")]
    Sema(String),
}

impl std::fmt::Debug for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Syntax(e) | Error::Sema(e) => {
                write!(f, "{}", e)
            }
        }
    }
}

/// Where the target listens
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// `tcp:<host>:<port>`
    Tcp(String),
    /// `unix:<path>`
    Unix(PathBuf),
}

impl FromStr for Endpoint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(a) = s.strip_prefix("tcp:") {
            if a.is_empty() {
                return Err(Error::Syntax("empty tcp endpoint".to_string()));
            }
            return Ok(Endpoint::Tcp(a.to_string()));
        }

        if let Some(p) = s.strip_prefix("unix:") {
            if p.is_empty() {
                return Err(Error::Syntax("empty unix endpoint".to_string()));
            }
            return Ok(Endpoint::Unix(PathBuf::from(p)));
        }

        Err(Error::Syntax(format!(
            "endpoint {s:?}: expecting tcp:<host>:<port> or unix:<path>"
        )))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HostConfig {
    /// Size of the message buffer, header included
    pub buffer_size: usize,
    /// Maximum number of top-level records accepted in a chain
    pub max_extensions: usize,
    pub endpoint: Option<String>,
    /// Receive timeout in milliseconds; none blocks forever
    pub timeout_ms: Option<u64>,
    pub chain: Option<PathBuf>,
    pub key: Option<PathBuf>,
    #[serde(with = "hex")]
    pub requested_permissions: [u8; PERMISSIONS_SIZE],
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            max_extensions: MAX_EXTENSIONS,
            endpoint: None,
            timeout_ms: None,
            chain: None,
            key: None,
            requested_permissions: [0xff; PERMISSIONS_SIZE],
        }
    }
}

impl HostConfig {
    /// Load and check a configuration from its JSON form.  Missing fields
    /// take their default value.
    pub fn load_json(j: &str) -> Result<Self, Error> {
        let c: HostConfig = serde_json::from_str(j).map_err(|e| Error::Syntax(e.to_string()))?;

        c.validate()?;

        Ok(c)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.buffer_size <= PACKET_HEADER_SIZE || self.buffer_size % 4 != 0 {
            return Err(Error::Sema(format!(
                "buffer_size {}: must be a multiple of 4 larger than {PACKET_HEADER_SIZE}",
                self.buffer_size
            )));
        }

        if self.max_extensions == 0 {
            return Err(Error::Sema("max_extensions must be positive".to_string()));
        }

        if let Some(e) = &self.endpoint {
            e.parse::<Endpoint>()?;
        }

        Ok(())
    }

    pub fn endpoint(&self) -> Result<Option<Endpoint>, Error> {
        self.endpoint.as_deref().map(str::parse::<Endpoint>).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_CONFIG_OK: &str = include_str!("../testdata/host.json");

    #[test]
    fn load_full() {
        let c = HostConfig::load_json(TEST_CONFIG_OK).unwrap();

        assert_eq!(c.buffer_size, 1024);
        assert_eq!(c.max_extensions, 8);
        assert_eq!(
            c.endpoint().unwrap(),
            Some(Endpoint::Tcp("localhost:9000".to_string()))
        );
        assert_eq!(c.chain, Some(PathBuf::from("chain.bin")));
        assert_eq!(c.requested_permissions[0], 0x0f);
        assert_eq!(c.requested_permissions[15], 0x00);
    }

    #[test]
    fn defaults() {
        let c = HostConfig::load_json("{}").unwrap();

        assert_eq!(c, HostConfig::default());
        assert_eq!(c.buffer_size, 4096);
        assert_eq!(c.requested_permissions, [0xff; 16]);
    }

    #[test]
    fn bad_buffer_size() {
        assert!(matches!(
            HostConfig::load_json(r#"{"buffer_size": 1022}"#),
            Err(Error::Sema(_))
        ));
        assert!(HostConfig::load_json(r#"{"buffer_size": 4}"#).is_err());
    }

    #[test]
    fn bad_permissions() {
        assert!(matches!(
            HostConfig::load_json(r#"{"requested_permissions": "ff"}"#),
            Err(Error::Syntax(_))
        ));
    }

    #[test]
    fn unknown_field() {
        assert!(HostConfig::load_json(r#"{"bufer_size": 64}"#).is_err());
    }

    #[test]
    fn endpoints() {
        assert_eq!(
            "unix:/tmp/adac.sock".parse::<Endpoint>().unwrap(),
            Endpoint::Unix(PathBuf::from("/tmp/adac.sock"))
        );
        assert!("udp:1.2.3.4:5".parse::<Endpoint>().is_err());
        assert!("tcp:".parse::<Endpoint>().is_err());
    }
}
