use std::{
    fmt::Display,
    net::{IpAddr, Ipv4Addr, SocketAddr, ToSocketAddrs},
};

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use strum::Display;
use thiserror::Error;
use url::Url;

#[derive(
    Serialize, Deserialize, Display, ValueEnum, Default, Debug, Copy, Clone, PartialEq, Eq, Hash,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ConnectionProtocol {
    #[default]
    Ws,
    Http,
}

#[derive(Error, Debug)]
pub enum ConnectionParseError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("address does not resolve to a host: {0}")]
    Resolution(String),
}

/// Host and port of the provisioning RPC server.
#[derive(Serialize, Deserialize, Copy, Clone, Debug, PartialEq, Eq)]
pub struct Connection {
    pub proto: Option<ConnectionProtocol>,
    pub host: IpAddr,
    pub port: u16,
}

impl Default for Connection {
    fn default() -> Self {
        Self {
            proto: None,
            host: IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)),
            port: 8080,
        }
    }
}

impl Connection {
    /// Parses `host:port`, optionally prefixed with `ws://` or `http://`.
    pub fn try_from_str(value: &str) -> Result<Self, ConnectionParseError> {
        let (proto, rest) = match value.split_once("://") {
            Some((scheme, rest)) => (ConnectionProtocol::from_str(scheme, true).ok(), rest),
            None => (None, value),
        };

        let addr = rest
            .trim_end_matches('/')
            .to_socket_addrs()?
            .last()
            .ok_or(ConnectionParseError::Resolution(value.to_string()))?;

        Ok(Connection {
            proto,
            host: addr.ip(),
            port: addr.port(),
        })
    }

    pub fn to_url(&self) -> Result<Url, url::ParseError> {
        Url::parse(&self.to_string())
    }
}

impl TryFrom<&str> for Connection {
    type Error = ConnectionParseError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Connection::try_from_str(value)
    }
}

impl From<Connection> for SocketAddr {
    fn from(value: Connection) -> Self {
        SocketAddr::new(value.host, value.port)
    }
}

impl From<SocketAddr> for Connection {
    fn from(value: SocketAddr) -> Self {
        Connection {
            proto: None,
            host: value.ip(),
            port: value.port(),
        }
    }
}

impl Display for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}://{}:{}",
            self.proto.unwrap_or_default(),
            self.host,
            self.port
        )
    }
}
