//! CLI command definitions
//!
//! Defines the clap commands for the embedhost CLI.

use clap::{Args, Subcommand};

#[derive(Subcommand)]
pub enum Commands {
    /// Serve one UI over stdin/stdout
    ///
    /// The host exits when the channel closes.
    Embed {
        #[command(flatten)]
        startup: StartupArgs,
    },

    /// Serve UIs connecting to an address
    Listen {
        /// host:port or local socket path (default: socket in the runtime dir)
        address: Option<String>,

        #[command(flatten)]
        startup: StartupArgs,
    },

    /// Send one request to a listening host and print the result
    Remote {
        /// Address the host listens on
        address: String,

        /// Method name, e.g. get_api_info
        method: String,

        /// Arguments as a JSON array
        #[arg(default_value = "[]")]
        args: String,

        /// Keep retrying the connection for up to this many seconds
        #[arg(long, default_value_t = 0)]
        wait: u64,

        /// Give up on the response after this many seconds
        #[arg(long, default_value_t = 10)]
        timeout: u64,
    },
}

/// Options shared by the serving commands
#[derive(Args, Debug, Default)]
pub struct StartupArgs {
    /// Startup command, run before the editor is ready
    /// Can be specified multiple times: --cmd 'echoerr oops' --cmd 'insert hi'
    #[arg(long = "cmd", value_name = "LINE")]
    pub commands: Vec<String>,

    /// Read the initial buffer text from this inherited descriptor
    #[arg(long, value_name = "FD")]
    pub input_fd: Option<i32>,
}
