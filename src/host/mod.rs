//! Editor host: serves the embedding protocol to attached UIs
//!
//! The host runs startup commands, marks the editor ready and then serves
//! channels, either one UI on stdin/stdout (`embed`) or any number of UIs
//! connecting to a listen address (`listen`).

pub mod editor;
mod handler;
pub mod screen;
pub mod script;
mod server;
pub mod startup;
pub mod ui;

pub use handler::METHODS;
pub use server::{ExitPolicy, Host, HostOptions, LifecycleEvent};

use crate::common::{paths, Result};
use crate::transport::{self, ListenAddress};

/// Where the host takes its channels from
#[derive(Debug, Clone)]
pub enum Serve {
    /// This process's stdin/stdout; exit when it closes
    Stdio,
    /// Accept UIs on an address until signalled
    Listen(ListenAddress),
}

/// Run the host until its channels are done
pub async fn run(options: HostOptions, serve: Serve) -> Result<()> {
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = std::process::id(),
        "Starting editor host"
    );

    let mut host = Host::new(options)?;

    match serve {
        Serve::Stdio => {
            let channel = host.serve_stdio();
            tracing::debug!(channel, "Serving stdio");
            host.run(None, ExitPolicy::WhenIdle).await
        }
        Serve::Listen(address) => {
            let listener = transport::bind(&address).await?;
            // Readiness line for whoever launched us; stdout is free here
            println!("{}", listener.address());

            let result = host.run(Some(listener), ExitPolicy::OnSignal).await;

            if let ListenAddress::Local(path) = &address {
                if let Err(e) = paths::remove_socket(path) {
                    tracing::warn!(error = %e, "Could not remove socket");
                }
            }
            tracing::info!("Host shutdown complete");
            result
        }
    }
}
