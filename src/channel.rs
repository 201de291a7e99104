//! Channel manager
//!
//! Owns every live channel, assigns ids and tracks each channel's attach
//! state. Ids come from one strictly increasing counter shared by all
//! transports and are never reused, so "the UI that connected first" is
//! simply the smallest id.

use std::collections::BTreeMap;

use tokio::sync::mpsc;

use crate::common::{Error, Result};
use crate::rpc::codec::DEFAULT_MAX_FRAME_BYTES;
use crate::rpc::{ChannelId, Inbound, Session};
use crate::transport::{self, ByteChannel, ListenAddress, SpawnConfig, TransportKind};

/// Reserved for the host itself (origin of internally generated events)
pub const INTERNAL_CHANNEL_ID: ChannelId = 0;

/// First id handed to a real channel
pub const FIRST_CHANNEL_ID: ChannelId = INTERNAL_CHANNEL_ID + 1;

/// Where a channel is in the UI attach lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachState {
    Unattached,
    Attaching,
    Attached,
    Closed,
}

impl std::fmt::Display for AttachState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unattached => write!(f, "unattached"),
            Self::Attaching => write!(f, "attaching"),
            Self::Attached => write!(f, "attached"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// Snapshot of one channel record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelInfo {
    pub id: ChannelId,
    pub kind: TransportKind,
    pub state: AttachState,
}

struct ChannelRecord {
    session: Session,
    state: AttachState,
}

type CloseObserver = Box<dyn Fn(&ChannelInfo) + Send>;

/// Registry of live channels
pub struct ChannelManager {
    next_id: ChannelId,
    channels: BTreeMap<ChannelId, ChannelRecord>,
    inbound: mpsc::UnboundedSender<Inbound>,
    observers: Vec<CloseObserver>,
    max_frame: usize,
}

impl ChannelManager {
    /// Create a manager and the stream of inbound events its sessions produce
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Inbound>) {
        let (inbound, inbound_rx) = mpsc::unbounded_channel();
        let manager = Self {
            next_id: FIRST_CHANNEL_ID,
            channels: BTreeMap::new(),
            inbound,
            observers: Vec::new(),
            max_frame: DEFAULT_MAX_FRAME_BYTES,
        };
        (manager, inbound_rx)
    }

    /// Limit frame sizes for channels registered from now on
    pub fn with_max_frame(mut self, max_frame: usize) -> Self {
        self.max_frame = max_frame;
        self
    }

    /// Bind a session to an established byte channel and give it an id
    pub fn register(&mut self, stream: ByteChannel) -> ChannelId {
        let id = self.next_id;
        self.next_id += 1;

        let kind = stream.kind();
        let session = Session::start(id, stream, Some(self.inbound.clone()), self.max_frame);
        self.channels.insert(
            id,
            ChannelRecord {
                session,
                state: AttachState::Unattached,
            },
        );

        tracing::info!(channel = id, transport = %kind, "Channel opened");
        id
    }

    /// Launch a child process and talk to it over its stdio
    pub fn spawn_channel(&mut self, config: SpawnConfig) -> Result<ChannelId> {
        let stream = transport::spawn(config)?;
        Ok(self.register(stream))
    }

    /// Bind an address and wait for exactly one peer
    pub async fn listen_channel(&mut self, address: &str) -> Result<ChannelId> {
        let stream = transport::listen_once(&ListenAddress::parse(address)).await?;
        Ok(self.register(stream))
    }

    /// Dial a listening peer
    pub async fn connect_channel(&mut self, address: &str) -> Result<ChannelId> {
        let stream = transport::connect(&ListenAddress::parse(address)).await?;
        Ok(self.register(stream))
    }

    /// Wrap descriptors this process inherited (stdio by default)
    pub fn inherit_channel(&mut self, stream: Option<ByteChannel>) -> ChannelId {
        self.register(stream.unwrap_or_else(transport::inherited::stdio))
    }

    pub fn channel_for(&self, id: ChannelId) -> Option<Session> {
        self.channels.get(&id).map(|record| record.session.clone())
    }

    pub fn info(&self, id: ChannelId) -> Option<ChannelInfo> {
        self.channels.get(&id).map(|record| ChannelInfo {
            id,
            kind: record.session.kind(),
            state: record.state,
        })
    }

    /// All live channels in id order
    pub fn list(&self) -> Vec<ChannelInfo> {
        self.channels.keys().filter_map(|id| self.info(*id)).collect()
    }

    pub fn state(&self, id: ChannelId) -> Option<AttachState> {
        self.channels.get(&id).map(|record| record.state)
    }

    pub fn set_state(&mut self, id: ChannelId, state: AttachState) -> Result<()> {
        let record = self
            .channels
            .get_mut(&id)
            .ok_or(Error::ChannelNotFound(id))?;
        tracing::debug!(channel = id, from = %record.state, to = %state, "Attach state change");
        record.state = state;
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Register a callback fired once per channel teardown
    pub fn on_close<F>(&mut self, observer: F)
    where
        F: Fn(&ChannelInfo) + Send + 'static,
    {
        self.observers.push(Box::new(observer));
    }

    /// Close a channel's stream; the record goes away when its `Closed`
    /// event is processed by [`ChannelManager::mark_closed`]
    pub fn close(&mut self, id: ChannelId) {
        if let Some(record) = self.channels.get(&id) {
            record.session.close();
        }
    }

    /// Retire a channel whose stream ended
    ///
    /// Returns the final record, or `None` if it was already retired.
    pub fn mark_closed(&mut self, id: ChannelId) -> Option<ChannelInfo> {
        let record = self.channels.remove(&id)?;
        record.session.close();

        let info = ChannelInfo {
            id,
            kind: record.session.kind(),
            state: AttachState::Closed,
        };
        tracing::info!(channel = id, transport = %info.kind, "Channel closed");

        for observer in &self.observers {
            observer(&info);
        }
        Some(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn duplex_channel() -> (ByteChannel, tokio::io::DuplexStream) {
        let (ours, theirs) = tokio::io::duplex(4096);
        (ByteChannel::from_stream(ours, TransportKind::Inherited), theirs)
    }

    #[tokio::test]
    async fn test_ids_strictly_increase_across_transports() {
        let (mut manager, _inbound) = ChannelManager::new();
        let mut peers = Vec::new();
        let mut ids = Vec::new();

        let (stream, peer) = duplex_channel();
        peers.push(peer);
        ids.push(manager.inherit_channel(Some(stream)));

        // A TCP listener on an ephemeral port, dialed by a second manager
        let listener = transport::bind(&ListenAddress::parse("127.0.0.1:0")).await.unwrap();
        let address = listener.address();
        let (mut dialer, _dialer_inbound) = ChannelManager::new();
        let (accepted, dialed) =
            tokio::join!(listener.accept(), dialer.connect_channel(&address));
        ids.push(manager.register(accepted.unwrap()));
        assert_eq!(dialed.unwrap(), FIRST_CHANNEL_ID);

        #[cfg(unix)]
        ids.push(manager.spawn_channel(SpawnConfig::new("cat")).unwrap());

        let (stream, peer) = duplex_channel();
        peers.push(peer);
        ids.push(manager.register(stream));

        assert_eq!(ids[0], FIRST_CHANNEL_ID);
        assert!(ids.windows(2).all(|w| w[0] < w[1]), "ids not increasing: {ids:?}");
        assert!(ids.iter().all(|id| *id > INTERNAL_CHANNEL_ID));
    }

    #[tokio::test]
    async fn test_ids_are_never_reused() {
        let (mut manager, mut inbound) = ChannelManager::new();

        let (stream, peer) = duplex_channel();
        let first = manager.register(stream);
        drop(peer);

        assert_eq!(inbound.recv().await, Some(Inbound::Closed { channel: first }));
        assert!(manager.mark_closed(first).is_some());
        assert!(manager.is_empty());

        let (stream, _peer) = duplex_channel();
        let second = manager.register(stream);
        assert!(second > first);
    }

    #[tokio::test]
    async fn test_teardown_notifies_observers_once() {
        let (mut manager, mut inbound) = ChannelManager::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        manager.on_close({
            let seen = seen.clone();
            move |info| seen.lock().unwrap().push(info.clone())
        });

        let (stream, _peer) = duplex_channel();
        let id = manager.register(stream);
        manager.set_state(id, AttachState::Attached).unwrap();
        manager.close(id);

        assert_eq!(inbound.recv().await, Some(Inbound::Closed { channel: id }));
        manager.mark_closed(id);
        assert!(manager.mark_closed(id).is_none());

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].state, AttachState::Closed);
        assert!(manager.channel_for(id).is_none());
    }

    #[tokio::test]
    async fn test_set_state_on_unknown_channel() {
        let (mut manager, _inbound) = ChannelManager::new();
        assert!(matches!(
            manager.set_state(42, AttachState::Attaching),
            Err(Error::ChannelNotFound(42))
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_listen_channel_accepts_one_peer() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("one.sock");
        let address = path.to_string_lossy().into_owned();

        // The peer waits for the path, then dials for real
        let dial = tokio::spawn({
            let address = ListenAddress::parse(&address);
            async move {
                transport::wait_until_connectable(&address, std::time::Duration::from_secs(5))
                    .await
                    .unwrap();
                let stream = transport::connect(&address).await.unwrap();
                Session::start(0, stream, None, DEFAULT_MAX_FRAME_BYTES)
            }
        });

        let (mut manager, _inbound) = ChannelManager::new();
        let id = manager.listen_channel(&address).await.unwrap();
        assert_eq!(manager.info(id).unwrap().kind, TransportKind::Listened);
        assert_eq!(manager.state(id), Some(AttachState::Unattached));

        // A peer with no inbound sink answers every request MethodNotFound
        let peer = dial.await.unwrap();
        let session = manager.channel_for(id).unwrap();
        let err = session.request("ping", vec![]).await.unwrap_err();
        assert!(matches!(err, Error::MethodNotFound(ref m) if m == "ping"));
        assert!(!peer.is_closed());
    }
}
