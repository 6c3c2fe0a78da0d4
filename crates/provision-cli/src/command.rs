use clap::{Args, Subcommand};
use provision_common::types::{network::Connection, ChainName};
use provision_rpc::{
    operation::{ChainParams, DeployParams, Operation},
    RpcConfig,
};

/// Where an operation runs.
#[derive(Args, Debug, Clone, Copy, Default)]
pub struct TargetArgs {
    /// Provision RPC server. The operation runs in-process when omitted.
    #[arg(long, value_parser = Connection::try_from_str)]
    pub rpc: Option<Connection>,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Write the built-in settings to the settings file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print effective settings and which secrets are set
    Show,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the JSON-RPC server
    Serve {
        #[command(flatten)]
        rpc: RpcConfig,
    },
    /// Deploy the contract set to a chain
    Deploy {
        /// Target chain, e.g. sepolia
        chain: ChainName,
        /// Preferred RPC url, tried after authenticated providers
        #[arg(long)]
        rpc_url: Option<String>,
        /// Additional RPC urls, tried after --rpc-url
        #[arg(long = "fallback-rpc")]
        fallback_rpcs: Vec<String>,
        #[command(flatten)]
        target: TargetArgs,
    },
    /// Show recorded contract addresses for a chain
    #[command(alias = "addr")]
    Addresses {
        chain: ChainName,
        #[command(flatten)]
        target: TargetArgs,
    },
    /// List every recorded deployment
    Status {
        #[command(flatten)]
        target: TargetArgs,
    },
    /// Mark a chain's deployment as verified
    Verify {
        chain: ChainName,
        #[command(flatten)]
        target: TargetArgs,
    },
    /// Check secrets, endpoints and deployer funds for a chain
    #[command(alias = "diag")]
    Diagnose {
        chain: ChainName,
        #[command(flatten)]
        target: TargetArgs,
    },
    /// Liveness and configured secrets
    Health {
        #[command(flatten)]
        target: TargetArgs,
    },
    /// Send a raw operation body, e.g. '{"operation": "get_status"}'
    Dispatch {
        body: String,
        #[command(flatten)]
        target: TargetArgs,
    },
    /// Settings file management
    #[command(alias = "cfg")]
    Config {
        #[command(subcommand)]
        configs: ConfigCommands,
    },
}

impl Commands {
    /// The operation a client command stands for.
    pub fn operation(&self) -> Option<(Operation, TargetArgs)> {
        let op = match self {
            Self::Deploy {
                chain,
                rpc_url,
                fallback_rpcs,
                target,
            } => {
                (
                    Operation::Deploy(DeployParams {
                        chain: chain.clone(),
                        rpc_url: rpc_url.clone(),
                        fallback_rpcs: fallback_rpcs.clone(),
                    }),
                    *target,
                )
            }
            Self::Addresses { chain, target } => {
                (
                    Operation::GetAddresses(ChainParams {
                        chain: chain.clone(),
                    }),
                    *target,
                )
            }
            Self::Status { target } => (Operation::GetStatus, *target),
            Self::Verify { chain, target } => {
                (
                    Operation::Verify(ChainParams {
                        chain: chain.clone(),
                    }),
                    *target,
                )
            }
            Self::Diagnose { chain, target } => {
                (
                    Operation::Diagnose(ChainParams {
                        chain: chain.clone(),
                    }),
                    *target,
                )
            }
            Self::Health { target } => (Operation::HealthCheck, *target),
            Self::Serve { .. } | Self::Dispatch { .. } | Self::Config { .. } => return None,
        };
        Some(op)
    }
}
