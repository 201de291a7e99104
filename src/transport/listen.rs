//! Listen and connect transports
//!
//! An address is either a TCP `host:port` or a local socket path. Binding
//! creates the socket before any accept, so a peer that races the listener
//! can poll for the path with [`wait_until_connectable`].

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use interprocess::local_socket::traits::tokio::Listener as ListenerTrait;
use tokio::net::{TcpListener, TcpStream};

use crate::common::{paths, Error, Result};

use super::{ByteChannel, TransportKind};

// Platform-specific imports and type aliases
#[cfg(unix)]
pub mod platform {
    pub use interprocess::local_socket::tokio::{prelude::*, Listener, Stream};
    pub use interprocess::local_socket::{GenericFilePath, ListenerOptions};
}

#[cfg(windows)]
pub mod platform {
    pub use interprocess::local_socket::tokio::{prelude::*, Listener, Stream};
    pub use interprocess::local_socket::{GenericNamespaced, ListenerOptions};
}

use platform::*;

/// A parsed listen/connect address
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenAddress {
    /// Unix domain socket path (or pipe name on Windows)
    Local(PathBuf),
    /// TCP `host:port`
    Tcp(String),
}

impl ListenAddress {
    /// Classify an address string
    ///
    /// `host:port` (digits after the last ':' and no path separator) is TCP,
    /// anything else is a local socket path.
    pub fn parse(s: &str) -> Self {
        if let Some((host, port)) = s.rsplit_once(':') {
            let is_port = !port.is_empty() && port.chars().all(|c| c.is_ascii_digit());
            let has_separator = host.contains('/') || host.contains('\\');
            if is_port && !host.is_empty() && !has_separator {
                return Self::Tcp(s.to_string());
            }
        }
        Self::Local(PathBuf::from(s))
    }
}

impl std::fmt::Display for ListenAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local(path) => write!(f, "{}", path.display()),
            Self::Tcp(addr) => write!(f, "{}", addr),
        }
    }
}

/// A bound address waiting for peers
pub enum ChannelListener {
    Local { listener: Listener, path: PathBuf },
    Tcp(TcpListener),
}

impl ChannelListener {
    /// Wait for exactly one peer and yield its connection
    ///
    /// Blocks only the caller; other tasks keep running.
    pub async fn accept(&self) -> Result<ByteChannel> {
        match self {
            Self::Local { listener, .. } => {
                let stream = listener.accept().await?;
                Ok(ByteChannel::from_stream(stream, TransportKind::Listened))
            }
            Self::Tcp(listener) => {
                let (stream, peer) = listener.accept().await?;
                stream.set_nodelay(true)?;
                tracing::debug!(%peer, "Accepted TCP peer");
                Ok(ByteChannel::from_stream(stream, TransportKind::Listened))
            }
        }
    }

    /// The address peers should connect to (resolves port 0)
    pub fn address(&self) -> String {
        match self {
            Self::Local { path, .. } => path.display().to_string(),
            Self::Tcp(listener) => listener
                .local_addr()
                .map(|a| a.to_string())
                .unwrap_or_else(|_| "<unbound>".to_string()),
        }
    }
}

#[cfg(unix)]
fn local_listener(path: &std::path::Path) -> io::Result<Listener> {
    paths::ensure_socket_dir(path)?;
    paths::clear_stale_socket(path)?;

    let name = path.to_fs_name::<GenericFilePath>()?;
    let listener = ListenerOptions::new().name(name).create_tokio()?;

    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;

    Ok(listener)
}

#[cfg(windows)]
fn local_listener(path: &std::path::Path) -> io::Result<Listener> {
    let name = path.to_string_lossy().into_owned();
    let name = name.to_ns_name::<GenericNamespaced>()?;
    ListenerOptions::new().name(name).create_tokio()
}

/// Bind an address so peers can connect to it
pub async fn bind(address: &ListenAddress) -> Result<ChannelListener> {
    let shown = address.to_string();
    let listener = match address {
        ListenAddress::Local(path) => ChannelListener::Local {
            listener: local_listener(path).map_err(|e| Error::bind_failed(&shown, e))?,
            path: path.clone(),
        },
        ListenAddress::Tcp(addr) => ChannelListener::Tcp(
            TcpListener::bind(addr)
                .await
                .map_err(|e| Error::bind_failed(&shown, e))?,
        ),
    };

    tracing::info!(address = %listener.address(), "Listening for channels");
    Ok(listener)
}

/// Bind, then accept a single peer
pub async fn listen_once(address: &ListenAddress) -> Result<ByteChannel> {
    let listener = bind(address).await?;
    listener.accept().await
}

/// Dial a listening peer
pub async fn connect(address: &ListenAddress) -> Result<ByteChannel> {
    let shown = address.to_string();
    match address {
        ListenAddress::Local(path) => {
            let stream = connect_local(path)
                .await
                .map_err(|e| Error::connect_failed(&shown, e))?;
            Ok(ByteChannel::from_stream(stream, TransportKind::Connected))
        }
        ListenAddress::Tcp(addr) => {
            let stream = TcpStream::connect(addr)
                .await
                .map_err(|e| Error::connect_failed(&shown, e))?;
            stream.set_nodelay(true)?;
            Ok(ByteChannel::from_stream(stream, TransportKind::Connected))
        }
    }
}

#[cfg(unix)]
async fn connect_local(path: &std::path::Path) -> io::Result<Stream> {
    let name = path.to_fs_name::<GenericFilePath>()?;
    Stream::connect(name).await
}

#[cfg(windows)]
async fn connect_local(path: &std::path::Path) -> io::Result<Stream> {
    let name = path.to_string_lossy().into_owned();
    let name = name.to_ns_name::<GenericNamespaced>()?;
    Stream::connect(name).await
}

/// Poll until an address is ready for a peer or the timeout passes
///
/// A local socket is ready once its path exists; nothing connects to it, so
/// a single-accept listener still gets the real peer. A TCP address is
/// dialed and the connection dropped.
pub async fn wait_until_connectable(address: &ListenAddress, timeout: Duration) -> Result<()> {
    let deadline = tokio::time::Instant::now() + timeout;

    loop {
        let ready = match address {
            #[cfg(unix)]
            ListenAddress::Local(path) => path.exists(),
            #[cfg(not(unix))]
            ListenAddress::Local(_) => connect(address).await.is_ok(),
            ListenAddress::Tcp(addr) => TcpStream::connect(addr).await.is_ok(),
        };
        if ready {
            return Ok(());
        }

        if tokio::time::Instant::now() >= deadline {
            return Err(Error::Timeout(timeout.as_secs()));
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}
