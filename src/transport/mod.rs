//! Byte channels
//!
//! A [`ByteChannel`] is a bidirectional byte stream regardless of where it
//! came from: a spawned child's stdio, an inherited descriptor pair, or a
//! connection accepted on (or dialed to) a listen address. Local sockets
//! use Unix domain sockets on Unix/macOS and named pipes on Windows via
//! the interprocess crate.

pub mod inherited;
pub mod listen;
pub mod spawn;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::Child;

pub use listen::{bind, connect, listen_once, wait_until_connectable, ChannelListener, ListenAddress};
pub use spawn::{spawn, SpawnConfig};

/// Boxed read half of a byte channel
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// Boxed write half of a byte channel
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Where a channel's stream came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// Stdio of a child process we launched
    Spawned,
    /// Connection accepted on a listen address
    Listened,
    /// Descriptors already open in this process (stdio for `embed`)
    Inherited,
    /// Connection we dialed to someone else's listen address
    Connected,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Spawned => write!(f, "spawned"),
            Self::Listened => write!(f, "listened"),
            Self::Inherited => write!(f, "inherited"),
            Self::Connected => write!(f, "connected"),
        }
    }
}

/// A bidirectional byte stream plus whatever keeps it alive
pub struct ByteChannel {
    reader: BoxedReader,
    writer: BoxedWriter,
    kind: TransportKind,
    /// Child process behind a spawned channel; killed when the channel closes
    child: Option<Child>,
}

impl ByteChannel {
    /// Build a channel from separate read and write halves
    pub fn new(
        reader: impl AsyncRead + Send + Unpin + 'static,
        writer: impl AsyncWrite + Send + Unpin + 'static,
        kind: TransportKind,
    ) -> Self {
        Self {
            reader: Box::new(reader),
            writer: Box::new(writer),
            kind,
            child: None,
        }
    }

    /// Build a channel from a single duplex stream
    pub fn from_stream<S>(stream: S, kind: TransportKind) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        Self::new(reader, writer, kind)
    }

    /// Attach the child process owning the stream
    pub fn with_child(mut self, child: Child) -> Self {
        self.child = Some(child);
        self
    }

    pub fn kind(&self) -> TransportKind {
        self.kind
    }

    /// Split into reader, writer and the optional child handle
    pub fn into_parts(self) -> (BoxedReader, BoxedWriter, Option<Child>) {
        (self.reader, self.writer, self.child)
    }
}

impl std::fmt::Debug for ByteChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ByteChannel")
            .field("kind", &self.kind)
            .field("child", &self.child.as_ref().and_then(Child::id))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_closing_writer_is_eof_for_peer() {
        let (a, b) = tokio::io::duplex(64);
        let (_, mut a_writer, _) = ByteChannel::from_stream(a, TransportKind::Inherited).into_parts();
        let (mut b_reader, _, _) = ByteChannel::from_stream(b, TransportKind::Inherited).into_parts();

        a_writer.write_all(b"hi").await.unwrap();
        a_writer.shutdown().await.unwrap();

        let mut received = Vec::new();
        b_reader.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, b"hi");
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(TransportKind::Listened.to_string(), "listened");
    }
}
