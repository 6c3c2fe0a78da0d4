use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use strum::Display;

#[derive(Serialize, Deserialize, Display, ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LogFormat {
    /// Human readable, one event per line.
    #[default]
    Pretty,
    /// Newline-delimited JSON, for log shippers.
    Json,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub format: LogFormat,
    /// Default directive, e.g. `info` or `provision_chain=debug`. `RUST_LOG` wins.
    pub filter: Option<String>,
}
