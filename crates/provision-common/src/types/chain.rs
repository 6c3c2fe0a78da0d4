use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};

/// Name of a target network, e.g. `ethereum` or `sepolia`.
///
/// Names are trimmed and lower-cased on construction so that store keys and
/// settings lookups agree regardless of how a caller spelled the chain.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(from = "String", into = "String")]
pub struct ChainName(String);

impl ChainName {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(name.as_ref().trim().to_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<String> for ChainName {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for ChainName {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<ChainName> for String {
    fn from(value: ChainName) -> Self {
        value.0
    }
}

impl FromStr for ChainName {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

impl AsRef<str> for ChainName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl AsRef<[u8]> for ChainName {
    fn as_ref(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl Display for ChainName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
