//! Tablet server identity: address plus the fencing token of its session

use crate::common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A tablet server instance.
///
/// The session token is issued by the coordination service when the server
/// registers and is invalidated when its session ends, so a restarted server
/// on the same address is a different `ServerSession`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "SessionFields")]
pub struct ServerSession {
    address: String,
    session: u64,
}

#[derive(Deserialize)]
struct SessionFields {
    address: String,
    session: u64,
}

impl TryFrom<SessionFields> for ServerSession {
    type Error = Error;

    fn try_from(fields: SessionFields) -> Result<Self> {
        let session = ServerSession::new(fields.address, fields.session);
        session.validate()?;
        Ok(session)
    }
}

impl ServerSession {
    pub fn new(address: impl Into<String>, session: u64) -> Self {
        Self {
            address: address.into(),
            session,
        }
    }

    /// `host:port` of the server
    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn session(&self) -> u64 {
        self.session
    }

    /// Check that the address is `host:port` or `[v6-host]:port`.
    ///
    /// Stores call this before writing, so every recorded session decodes.
    pub fn validate(&self) -> Result<()> {
        if valid_address(&self.address) {
            Ok(())
        } else {
            Err(Error::MalformedRecord(format!(
                "bad server address: {:?}",
                self.address
            )))
        }
    }

    /// Column value form used in metadata rows
    pub fn encode(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }

    pub fn decode(value: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(value).map_err(|_| {
            Error::MalformedRecord(format!("server session is not UTF-8: {}", hex::encode(value)))
        })?;
        text.parse()
    }
}

/// `host:port[hex-session]`
impl fmt::Display for ServerSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{:x}]", self.address, self.session)
    }
}

impl FromStr for ServerSession {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let malformed = || Error::MalformedRecord(format!("bad server session: {:?}", s));

        let (address, rest) = s.rsplit_once('[').ok_or_else(malformed)?;
        let token = rest.strip_suffix(']').ok_or_else(malformed)?;
        if !valid_address(address) {
            return Err(malformed());
        }
        let session = u64::from_str_radix(token, 16).map_err(|_| malformed())?;

        Ok(Self::new(address, session))
    }
}

fn valid_address(address: &str) -> bool {
    let (host, port) = match address.strip_prefix('[') {
        Some(bracketed) => match bracketed.split_once("]:") {
            Some(parts) => parts,
            None => return false,
        },
        None => match address.rsplit_once(':') {
            Some((host, port)) if !host.contains(':') => (host, port),
            _ => return false,
        },
    };
    !host.is_empty() && !host.contains(['[', ']']) && port.parse::<u16>().is_ok()
}
