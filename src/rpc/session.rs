//! RPC session over one byte channel
//!
//! A session owns a read loop and a write loop. Callers get
//! request/response, fire-and-forget notifications and a per-method
//! notification handler table. Incoming requests (and notifications nobody
//! registered a handler for) are forwarded to the owner as [`Inbound`]
//! events.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::{SinkExt, StreamExt};
use tokio::process::Child;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::codec::{FramedRead, FramedWrite};

use crate::common::{Error, Result, RpcError};
use crate::transport::{BoxedReader, BoxedWriter, ByteChannel, TransportKind};

use super::codec::MessageCodec;
use super::types::{ChannelId, Message, Value};

/// Something the owner of a session has to act on
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Request {
        channel: ChannelId,
        id: u64,
        method: String,
        args: Vec<Value>,
    },
    Notification {
        channel: ChannelId,
        method: String,
        args: Vec<Value>,
    },
    Closed {
        channel: ChannelId,
    },
}

type Handler = Arc<dyn Fn(Vec<Value>) + Send + Sync>;
type PendingReply = oneshot::Sender<Result<Value>>;

struct Shared {
    channel: ChannelId,
    kind: TransportKind,
    outgoing: mpsc::UnboundedSender<Message>,
    /// Requests waiting for a response, by request id
    pending: Mutex<HashMap<u64, PendingReply>>,
    handlers: Mutex<HashMap<String, Handler>>,
    next_id: AtomicU64,
    closed: watch::Sender<bool>,
    inbound: Option<mpsc::UnboundedSender<Inbound>>,
    child: Mutex<Option<Child>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Shared {
    fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Tear the session down; only the first call does anything
    fn shutdown(&self) {
        let first = self.closed.send_if_modified(|closed| {
            if *closed {
                false
            } else {
                *closed = true;
                true
            }
        });
        if !first {
            return;
        }

        let pending: Vec<PendingReply> = lock(&self.pending).drain().map(|(_, tx)| tx).collect();
        tracing::debug!(
            channel = self.channel,
            failed_requests = pending.len(),
            "Channel closed"
        );
        for tx in pending {
            let _ = tx.send(Err(Error::ChannelClosed(self.channel)));
        }

        if let Some(child) = lock(&self.child).as_mut() {
            let _ = child.start_kill();
        }

        if let Some(inbound) = &self.inbound {
            let _ = inbound.send(Inbound::Closed {
                channel: self.channel,
            });
        }
    }

    fn send(&self, message: Message) -> Result<()> {
        if self.is_closed() {
            return Err(Error::ChannelClosed(self.channel));
        }
        self.outgoing
            .send(message)
            .map_err(|_| Error::ChannelClosed(self.channel))
    }

    fn dispatch(&self, message: Message) {
        match message {
            Message::Response { id, result } => {
                match lock(&self.pending).remove(&id) {
                    Some(tx) => {
                        let _ = tx.send(result.map_err(Error::from));
                    }
                    None => {
                        tracing::warn!(channel = self.channel, id, "Response for unknown request");
                    }
                }
            }
            Message::Notification { method, args } => {
                let handler = lock(&self.handlers).get(&method).cloned();
                match (handler, &self.inbound) {
                    (Some(handler), _) => handler(args),
                    (None, Some(inbound)) => {
                        let _ = inbound.send(Inbound::Notification {
                            channel: self.channel,
                            method,
                            args,
                        });
                    }
                    (None, None) => {
                        tracing::trace!(channel = self.channel, %method, "Dropping unhandled notification");
                    }
                }
            }
            Message::Request { id, method, args } => match &self.inbound {
                Some(inbound) => {
                    let _ = inbound.send(Inbound::Request {
                        channel: self.channel,
                        id,
                        method,
                        args,
                    });
                }
                None => {
                    let _ = self.send(Message::Response {
                        id,
                        result: Err(RpcError::from(&Error::MethodNotFound(method))),
                    });
                }
            },
        }
    }
}

/// Handle to one channel's RPC session; clones share the same session
#[derive(Clone)]
pub struct Session {
    shared: Arc<Shared>,
}

impl Session {
    /// Bind a session to a byte channel and start its I/O loops
    ///
    /// Must be called inside a tokio runtime.
    pub fn start(
        channel: ChannelId,
        stream: ByteChannel,
        inbound: Option<mpsc::UnboundedSender<Inbound>>,
        max_frame: usize,
    ) -> Self {
        let kind = stream.kind();
        let (reader, writer, child) = stream.into_parts();
        let (outgoing, outgoing_rx) = mpsc::unbounded_channel();
        let (closed, _) = watch::channel(false);

        let shared = Arc::new(Shared {
            channel,
            kind,
            outgoing,
            pending: Mutex::new(HashMap::new()),
            handlers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            closed,
            inbound,
            child: Mutex::new(child),
        });

        tokio::spawn(write_loop(
            channel,
            FramedWrite::new(writer, MessageCodec::new(max_frame)),
            outgoing_rx,
            shared.closed.subscribe(),
        ));
        tokio::spawn(read_loop(
            shared.clone(),
            FramedRead::new(reader, MessageCodec::new(max_frame)),
            shared.closed.subscribe(),
        ));

        Self { shared }
    }

    pub fn channel_id(&self) -> ChannelId {
        self.shared.channel
    }

    pub fn kind(&self) -> TransportKind {
        self.shared.kind
    }

    /// Send a request and wait for its response
    ///
    /// Fails with `ChannelClosed` if the channel closes first.
    pub async fn request(&self, method: &str, args: Vec<Value>) -> Result<Value> {
        let id = self.shared.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();

        {
            let mut pending = lock(&self.shared.pending);
            // Checked under the lock so shutdown cannot miss this entry
            if self.shared.is_closed() {
                return Err(Error::ChannelClosed(self.shared.channel));
            }
            pending.insert(id, tx);
        }

        tracing::trace!(channel = self.shared.channel, id, method, "RPC request");
        if let Err(e) = self.shared.send(Message::Request {
            id,
            method: method.to_string(),
            args,
        }) {
            lock(&self.shared.pending).remove(&id);
            return Err(e);
        }

        rx.await
            .unwrap_or(Err(Error::ChannelClosed(self.shared.channel)))
    }

    /// Send a notification; does not wait for anything
    pub fn notify(&self, method: &str, args: Vec<Value>) -> Result<()> {
        self.shared.send(Message::Notification {
            method: method.to_string(),
            args,
        })
    }

    /// Answer an incoming request
    pub fn respond(&self, id: u64, result: Result<Value>) -> Result<()> {
        self.shared.send(Message::Response {
            id,
            result: result.map_err(|e| RpcError::from(&e)),
        })
    }

    /// Register the handler for a notification method; the last one wins
    ///
    /// Handlers run on the read loop, in arrival order.
    pub fn on_notification<F>(&self, method: &str, handler: F)
    where
        F: Fn(Vec<Value>) + Send + Sync + 'static,
    {
        let previous = lock(&self.shared.handlers).insert(method.to_string(), Arc::new(handler));
        if previous.is_some() {
            tracing::debug!(channel = self.shared.channel, method, "Replaced notification handler");
        }
    }

    /// Close the channel; idempotent
    ///
    /// Queued outgoing messages are still written before the stream ends.
    pub fn close(&self) {
        self.shared.shutdown();
    }

    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    /// Wait until the channel is closed
    pub async fn closed(&self) {
        let mut rx = self.shared.closed.subscribe();
        let _ = rx.wait_for(|closed| *closed).await;
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("channel", &self.shared.channel)
            .field("kind", &self.shared.kind)
            .field("closed", &self.is_closed())
            .finish()
    }
}

async fn read_loop(
    shared: Arc<Shared>,
    mut frames: FramedRead<BoxedReader, MessageCodec>,
    mut closed: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            frame = frames.next() => match frame {
                Some(Ok(message)) => {
                    tracing::trace!(channel = shared.channel, method = ?message.method(), "RPC message received");
                    shared.dispatch(message);
                }
                Some(Err(e)) => {
                    tracing::warn!(channel = shared.channel, error = %e, "Closing channel after read failure");
                    break;
                }
                None => {
                    tracing::debug!(channel = shared.channel, "Peer closed the stream");
                    break;
                }
            },
            _ = closed.changed() => break,
        }
    }

    shared.shutdown();
}

async fn write_loop(
    channel: ChannelId,
    mut sink: FramedWrite<BoxedWriter, MessageCodec>,
    mut outgoing: mpsc::UnboundedReceiver<Message>,
    mut closed: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            biased;
            message = outgoing.recv() => match message {
                Some(message) => {
                    if let Err(e) = sink.send(message).await {
                        tracing::warn!(channel, error = %e, "Write failed");
                        break;
                    }
                }
                None => break,
            },
            _ = closed.changed() => {
                // Flush whatever was queued before the close
                while let Ok(message) = outgoing.try_recv() {
                    if sink.send(message).await.is_err() {
                        break;
                    }
                }
                break;
            }
        }
    }

    let _ = sink.close().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::DuplexStream;

    fn pair() -> (DuplexStream, DuplexStream) {
        tokio::io::duplex(64 * 1024)
    }

    fn session(
        id: ChannelId,
        stream: DuplexStream,
        inbound: Option<mpsc::UnboundedSender<Inbound>>,
    ) -> Session {
        Session::start(
            id,
            ByteChannel::from_stream(stream, TransportKind::Inherited),
            inbound,
            crate::rpc::codec::DEFAULT_MAX_FRAME_BYTES,
        )
    }

    #[tokio::test]
    async fn test_out_of_order_responses_are_demultiplexed() {
        let (a, b) = pair();
        let client = session(1, a, None);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let server = session(2, b, Some(tx));

        let first = tokio::spawn({
            let client = client.clone();
            async move { client.request("first", vec![]).await }
        });
        let second = tokio::spawn({
            let client = client.clone();
            async move { client.request("second", vec![]).await }
        });

        let mut requests = Vec::new();
        for _ in 0..2 {
            match rx.recv().await.unwrap() {
                Inbound::Request { id, method, .. } => requests.push((id, method)),
                other => panic!("unexpected inbound {other:?}"),
            }
        }
        assert_ne!(requests[0].0, requests[1].0);

        // Answer in reverse order of arrival
        for (id, method) in requests.iter().rev() {
            server.respond(*id, Ok(Value::from(method.as_str()))).unwrap();
        }

        assert_eq!(first.await.unwrap().unwrap(), Value::from("first"));
        assert_eq!(second.await.unwrap().unwrap(), Value::from("second"));
    }

    #[tokio::test]
    async fn test_error_response() {
        let (a, b) = pair();
        let client = session(1, a, None);
        let _server = session(2, b, None);

        // No inbound sink on the server: requests are answered MethodNotFound
        let err = client.request("nvim_nonsense", vec![]).await.unwrap_err();
        assert!(matches!(err, Error::MethodNotFound(ref m) if m == "nvim_nonsense"));
    }

    #[tokio::test]
    async fn test_close_fails_outstanding_requests() {
        let (a, b) = pair();
        let client = session(1, a, None);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _server = session(2, b, Some(tx));

        let pending: Vec<_> = (0..3)
            .map(|i| {
                let client = client.clone();
                tokio::spawn(async move { client.request(&format!("m{i}"), vec![]).await })
            })
            .collect();

        // Make sure all three reached the server before closing
        for _ in 0..3 {
            assert!(matches!(rx.recv().await, Some(Inbound::Request { .. })));
        }

        client.close();
        client.close();

        for handle in pending {
            let result = tokio::time::timeout(Duration::from_secs(5), handle)
                .await
                .expect("request hung after close")
                .unwrap();
            assert!(matches!(result, Err(Error::ChannelClosed(1))));
        }

        assert!(matches!(
            client.request("late", vec![]).await,
            Err(Error::ChannelClosed(1))
        ));
        assert!(client.notify("late", vec![]).is_err());
    }

    #[tokio::test]
    async fn test_peer_eof_closes_and_reports() {
        let (a, b) = pair();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let server = session(5, b, Some(tx));

        let waiter = tokio::spawn({
            let server = server.clone();
            async move { server.request("never-answered", vec![]).await }
        });

        drop(a);

        assert_eq!(rx.recv().await, Some(Inbound::Closed { channel: 5 }));
        assert!(server.is_closed());
        assert!(matches!(waiter.await.unwrap(), Err(Error::ChannelClosed(5))));
    }

    #[tokio::test]
    async fn test_malformed_frame_closes_channel() {
        use tokio::io::AsyncWriteExt;

        let (mut a, b) = pair();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _server = session(9, b, Some(tx));

        a.write_all(&[0, 0, 0, 2, 0xff, 0xff]).await.unwrap();

        assert_eq!(rx.recv().await, Some(Inbound::Closed { channel: 9 }));
    }

    #[tokio::test]
    async fn test_last_notification_handler_wins() {
        let (a, b) = pair();
        let client = session(1, a, None);
        let server = session(2, b, None);

        let (first_tx, mut first_rx) = mpsc::unbounded_channel::<Vec<Value>>();
        let (second_tx, mut second_rx) = mpsc::unbounded_channel::<Vec<Value>>();
        client.on_notification("redraw", move |args| {
            let _ = first_tx.send(args);
        });
        client.on_notification("redraw", move |args| {
            let _ = second_tx.send(args);
        });

        for n in 0..3i64 {
            server.notify("redraw", vec![Value::from(n)]).unwrap();
        }

        for n in 0..3i64 {
            assert_eq!(second_rx.recv().await.unwrap(), vec![Value::from(n)]);
        }
        assert!(first_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unhandled_notifications_reach_inbound() {
        let (a, b) = pair();
        let client = session(1, a, None);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _server = session(2, b, Some(tx));

        client.notify("input", vec![Value::from("<CR>")]).unwrap();

        assert_eq!(
            rx.recv().await,
            Some(Inbound::Notification {
                channel: 2,
                method: "input".to_string(),
                args: vec![Value::from("<CR>")],
            })
        );
    }

    #[tokio::test]
    async fn test_queued_messages_are_flushed_before_close() {
        let (a, b) = pair();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let receiver = session(1, a, Some(tx));
        let sender = session(2, b, None);

        sender.notify("last-words", vec![]).unwrap();
        sender.close();

        assert!(matches!(
            rx.recv().await,
            Some(Inbound::Notification { ref method, .. }) if method == "last-words"
        ));
        assert_eq!(rx.recv().await, Some(Inbound::Closed { channel: 1 }));
        receiver.closed().await;
    }
}
