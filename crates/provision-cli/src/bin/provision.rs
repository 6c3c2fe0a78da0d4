use std::{path::PathBuf, process::ExitCode};

use clap::Parser;
use provision_cli::{
    command::{Commands, ConfigCommands},
    error::Error,
    output::{is_success, print_error, print_response, print_var},
    runtime,
};
use provision_config::{Secrets, Settings};
use provision_rpc::rpc_server::RpcServer;
use provision_telemetry::{
    config::{Config as TelemetryConfig, LogFormat},
    stdout::StdoutTelemetry,
    Telemetry,
};
use termion::color;
use tracing::{error, info, warn};

/// Contract deployment service
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Settings file, defaults to ~/.provision/settings.json
    #[arg(long, global = true)]
    pub settings: Option<PathBuf>,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t)]
    pub log_format: LogFormat,

    /// Log filter directive, RUST_LOG takes precedence
    #[arg(long, global = true)]
    pub log_filter: Option<String>,

    /// Commands
    #[command(subcommand)]
    pub command: Commands,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("CLI failed: {e}");
            print_error(&e);
            ExitCode::FAILURE
        }
    }
}

fn print_banner() {
    println!(
        "{}{} {}{}\n",
        color::Fg(color::LightGreen),
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        color::Fg(color::Reset),
    );
}

/// Returns whether the operation reported success.
async fn run() -> Result<bool, Error> {
    let cli = Cli::parse();
    let t = StdoutTelemetry::from_config(TelemetryConfig {
        format: cli.log_format,
        filter: cli.log_filter.clone(),
    });
    let settings_path = cli.settings.as_deref();

    match cli.command {
        Commands::Serve { rpc } => {
            print_banner();
            t.init();

            let router = runtime::build_router(settings_path).await?;
            let handle = RpcServer::new(rpc, router).spawn_and_run().await?;

            tokio::signal::ctrl_c().await?;
            info!("shutting down");
            if handle.stop().is_err() {
                warn!("server already stopped");
            }
            handle.stopped().await;
            Ok(true)
        }
        Commands::Dispatch { body, target } => {
            t.init();
            let response = runtime::execute_raw(&body, target, settings_path).await?;
            print_response(&response);
            Ok(is_success(&response))
        }
        Commands::Config { configs } => {
            match cli.log_filter {
                Some(_) => t.init(),
                None => t.with_filter("warn".parse().map_err(anyhow::Error::from)?).init(),
            }

            match configs {
                ConfigCommands::Init { force } => {
                    let path = match settings_path {
                        Some(path) => path.to_path_buf(),
                        None => Settings::default_path().await?,
                    };
                    if path.exists() && !force {
                        return Err(Error::FileExists(path));
                    }
                    Settings::default().save(&path).await?;
                    print_var("settings", path.display());
                }
                ConfigCommands::Show => {
                    let settings = Settings::load(settings_path).await?;
                    let secrets = Secrets::from_env(&settings);
                    print_var("settings", serde_json::to_string_pretty(&settings)?);
                    for (env, set) in secrets.presence(&settings) {
                        print_var(&env, if set { "set" } else { "missing" });
                    }
                }
            }
            Ok(true)
        }
        command => {
            let Some((operation, target)) = command.operation() else {
                return Ok(true);
            };
            t.init();
            let response = runtime::execute(operation, target, settings_path).await?;
            print_response(&response);
            Ok(is_success(&response))
        }
    }
}
