//! CLI command handling
//!
//! Turns parsed commands into a running host or a one-shot remote request.

use std::path::Path;
use std::time::Duration;

use crate::channel::ChannelManager;
use crate::commands::{Commands, StartupArgs};
use crate::common::{config::Config, logging, paths, Error, Result};
use crate::host::{self, HostOptions, Serve};
use crate::rpc::Value;
use crate::transport::{self, ListenAddress};

/// Dispatch a CLI command
pub async fn dispatch(command: Commands, config_path: Option<&Path>) -> Result<()> {
    match command {
        Commands::Embed { startup } => {
            logging::init_host();
            let options = host_options(startup, config_path)?;
            host::run(options, Serve::Stdio).await
        }

        Commands::Listen { address, startup } => {
            logging::init_host();
            let options = host_options(startup, config_path)?;
            let address = address
                .or_else(|| options.config.server.default_address.clone())
                .unwrap_or_else(paths::default_address);
            host::run(options, Serve::Listen(ListenAddress::parse(&address))).await
        }

        Commands::Remote {
            address,
            method,
            args,
            wait,
            timeout,
        } => {
            logging::init_cli();
            let args = parse_args(&args)?;
            let result = remote(&address, &method, args, wait, timeout).await?;
            println!("{}", serde_json::to_string_pretty(&serde_json::Value::from(result))?);
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
}

fn host_options(startup: StartupArgs, config_path: Option<&Path>) -> Result<HostOptions> {
    let config = load_config(config_path)?;
    let input = startup.input_fd.map(read_input).transpose()?;
    Ok(HostOptions {
        commands: startup.commands,
        input,
        config,
    })
}

#[cfg(unix)]
fn read_input(fd: i32) -> Result<String> {
    transport::inherited::read_fd_to_string(fd)
}

#[cfg(not(unix))]
fn read_input(_fd: i32) -> Result<String> {
    Err(Error::invalid_args("--input-fd is only supported on Unix"))
}

/// Parse a JSON array of arguments
fn parse_args(json: &str) -> Result<Vec<Value>> {
    match serde_json::from_str::<serde_json::Value>(json)? {
        serde_json::Value::Array(items) => Ok(items.into_iter().map(Value::from).collect()),
        other => Err(Error::invalid_args(format!(
            "Arguments must be a JSON array, got {}",
            other
        ))),
    }
}

/// Dial `address`, issue one request and close
async fn remote(
    address: &str,
    method: &str,
    args: Vec<Value>,
    wait_secs: u64,
    timeout_secs: u64,
) -> Result<Value> {
    if wait_secs > 0 {
        transport::wait_until_connectable(
            &ListenAddress::parse(address),
            Duration::from_secs(wait_secs),
        )
        .await?;
    }

    let (mut channels, _inbound) = ChannelManager::new();
    let id = channels.connect_channel(address).await?;
    let session = channels
        .channel_for(id)
        .ok_or(Error::ChannelNotFound(id))?;

    tracing::debug!(address, method, "Sending remote request");
    let result = tokio::time::timeout(
        Duration::from_secs(timeout_secs),
        session.request(method, args),
    )
    .await
    .map_err(|_| Error::Timeout(timeout_secs))?;

    channels.close(id);
    result
}
