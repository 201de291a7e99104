//! Host core loop
//!
//! One task owns the channel manager, the startup buffer, the editor and
//! every UI's state. Session loops and the accept loop only feed it events,
//! so each request is handled start to finish in a single turn.

use std::collections::{BTreeMap, HashMap, HashSet};

use tokio::sync::mpsc;

use crate::channel::{AttachState, ChannelManager, INTERNAL_CHANNEL_ID};
use crate::common::{config::Config, Error, Result};
use crate::rpc::{ChannelId, Inbound, Value};
use crate::transport::{ByteChannel, ChannelListener};

use super::editor::{Editor, LineBuffer};
use super::handler::{self, Followup};
use super::screen::{DefaultColors, Frame, StatusMessage, HL_ERROR_MSG, HL_NORMAL};
use super::script::{self, Effect};
use super::startup::StartupBuffer;
use super::ui::{UiPhase, UiState};

/// Startup inputs for a host
#[derive(Debug, Default)]
pub struct HostOptions {
    /// Startup commands, run in order before the editor is ready
    pub commands: Vec<String>,
    /// Initial buffer text
    pub input: Option<String>,
    pub config: Config,
}

/// When [`Host::run`] returns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitPolicy {
    /// Once the last channel has closed
    WhenIdle,
    /// On SIGTERM/SIGINT (Ctrl+C on Windows)
    OnSignal,
}

/// A phase boundary observable by clients
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    EditorReady,
    UiEnter(ChannelId),
}

impl LifecycleEvent {
    pub const NAMES: [&'static str; 2] = ["editor_ready", "ui_enter"];

    pub fn name(&self) -> &'static str {
        match self {
            Self::EditorReady => "editor_ready",
            Self::UiEnter(_) => "ui_enter",
        }
    }

    /// Notification arguments
    pub fn args(&self) -> Vec<Value> {
        match self {
            Self::EditorReady => Vec::new(),
            Self::UiEnter(channel) => vec![Value::from(*channel)],
        }
    }

    /// `[name, args...]` as reported by `get_lifecycle_log`
    pub fn to_value(&self) -> Value {
        let mut item = vec![Value::from(self.name())];
        item.extend(self.args());
        Value::Array(item)
    }
}

/// The editor core
pub struct Host {
    pub(super) config: Config,
    pub(super) channels: ChannelManager,
    inbound: mpsc::UnboundedReceiver<Inbound>,
    accepted_tx: mpsc::UnboundedSender<ByteChannel>,
    accepted_rx: mpsc::UnboundedReceiver<ByteChannel>,
    shutdown_tx: mpsc::UnboundedSender<&'static str>,
    shutdown_rx: mpsc::UnboundedReceiver<&'static str>,
    pub(super) editor: Box<dyn Editor>,
    pub(super) startup: StartupBuffer,
    pub(super) colors: DefaultColors,
    pub(super) message: Option<StatusMessage>,
    pub(super) uis: BTreeMap<ChannelId, UiState>,
    pub(super) lifecycle: Vec<LifecycleEvent>,
    pub(super) subscriptions: HashMap<ChannelId, HashSet<String>>,
    /// Whether any channel was ever registered
    served: bool,
}

impl Host {
    /// Build the core and run startup to completion
    ///
    /// `editor-ready` is recorded here, before any channel can exist.
    pub fn new(options: HostOptions) -> Result<Self> {
        let HostOptions {
            commands,
            input,
            config,
        } = options;

        let colors = initial_colors(&config)?;
        let (channels, inbound) = ChannelManager::new();
        let channels = channels.with_max_frame(config.rpc.max_frame_bytes);
        let (accepted_tx, accepted_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = mpsc::unbounded_channel();

        let mut host = Self {
            config,
            channels,
            inbound,
            accepted_tx,
            accepted_rx,
            shutdown_tx,
            shutdown_rx,
            editor: Box::new(LineBuffer::new()),
            startup: StartupBuffer::new(),
            colors,
            message: None,
            uis: BTreeMap::new(),
            lifecycle: Vec::new(),
            subscriptions: HashMap::new(),
            served: false,
        };

        if let Some(text) = input {
            host.editor.load(&text);
        }
        for line in &commands {
            tracing::debug!(command = %line, "Running startup command");
            host.run_command(line);
        }

        host.record(LifecycleEvent::EditorReady);
        tracing::info!(
            buffered = host.startup.is_collecting(),
            lines = host.editor.lines().len(),
            "Editor ready"
        );
        Ok(host)
    }

    /// Sender for streams accepted outside the core turn
    pub fn connector(&self) -> mpsc::UnboundedSender<ByteChannel> {
        self.accepted_tx.clone()
    }

    /// Give a stream a channel id and start serving it
    pub fn register(&mut self, stream: ByteChannel) -> ChannelId {
        self.served = true;
        self.channels.register(stream)
    }

    /// Serve this process's stdin/stdout
    pub fn serve_stdio(&mut self) -> ChannelId {
        self.served = true;
        self.channels.inherit_channel(None)
    }

    pub fn lifecycle(&self) -> &[LifecycleEvent] {
        &self.lifecycle
    }

    /// Run the core loop until the exit policy is met
    pub async fn run(mut self, listener: Option<ChannelListener>, exit: ExitPolicy) -> Result<()> {
        if let Some(listener) = listener {
            tokio::spawn(accept_loop(listener, self.accepted_tx.clone()));
        }
        if exit == ExitPolicy::OnSignal {
            let signals = Signals::install()?;
            let shutdown = self.shutdown_tx.clone();
            tokio::spawn(async move {
                let name = signals.recv().await;
                let _ = shutdown.send(name);
            });
        }

        loop {
            tokio::select! {
                Some(event) = self.inbound.recv() => self.handle_inbound(event),
                Some(stream) = self.accepted_rx.recv() => {
                    self.register(stream);
                }
                Some(signal) = self.shutdown_rx.recv() => {
                    tracing::info!(signal, "Shutting down");
                    break;
                }
            }

            if exit == ExitPolicy::WhenIdle && self.served && self.channels.is_empty() {
                tracing::info!("Last channel closed, exiting");
                break;
            }
        }

        for info in self.channels.list() {
            self.channels.close(info.id);
        }
        Ok(())
    }

    fn handle_inbound(&mut self, event: Inbound) {
        match event {
            Inbound::Request {
                channel,
                id,
                method,
                args,
            } => {
                let reply = handler::handle_request(self, channel, &method, args);
                // The response is queued before anything the request caused
                if let Some(session) = self.channels.channel_for(channel) {
                    if let Err(e) = session.respond(id, reply.result) {
                        tracing::debug!(channel, error = %e, "Could not send response");
                    }
                }
                self.run_followups(reply.followups);
            }
            Inbound::Notification {
                channel,
                method,
                args,
            } => {
                let followups = handler::handle_notification(self, channel, &method, args);
                self.run_followups(followups);
            }
            Inbound::Closed { channel } => self.retire(channel),
        }
        self.redraw_all();
    }

    fn run_followups(&mut self, followups: Vec<Followup>) {
        for followup in followups {
            match followup {
                Followup::EnterUi(channel) => self.enter_ui(channel),
                Followup::Close(channel) => self.channels.close(channel),
                Followup::Notify(channel, event) => {
                    if let Some(session) = self.channels.channel_for(channel) {
                        let _ = session.notify(event.name(), event.args());
                    }
                }
            }
        }
    }

    /// `attaching -> attached`: record `ui_enter` and start live streaming
    fn enter_ui(&mut self, channel: ChannelId) {
        let Some(ui) = self.uis.get_mut(&channel) else {
            return;
        };
        ui.go_live();
        if let Err(e) = self.channels.set_state(channel, AttachState::Attached) {
            tracing::warn!(channel, error = %e, "Attach finished on a vanished channel");
            return;
        }
        tracing::info!(channel, "UI entered");
        self.record(LifecycleEvent::UiEnter(channel));
    }

    /// Append to the lifecycle log and notify subscribers
    pub(super) fn record(&mut self, event: LifecycleEvent) {
        self.lifecycle.push(event);

        let name = event.name();
        for (channel, events) in &self.subscriptions {
            if !events.contains(name) {
                continue;
            }
            if let Some(session) = self.channels.channel_for(*channel) {
                let _ = session.notify(name, event.args());
            }
        }
    }

    fn retire(&mut self, channel: ChannelId) {
        self.uis.remove(&channel);
        self.subscriptions.remove(&channel);
        self.channels.mark_closed(channel);
    }

    /// Run a command line against the editor; shared by startup and the
    /// `command` method
    pub(super) fn run_command(&mut self, line: &str) {
        for effect in script::execute(line) {
            self.apply(effect);
        }
    }

    fn apply(&mut self, effect: Effect) {
        match effect {
            Effect::Diagnostic(text) => {
                if self.startup.push_diagnostic(text.clone()) {
                    tracing::debug!(diagnostic = %text, "Buffered startup diagnostic");
                    return;
                }
                tracing::debug!(diagnostic = %text, origin = INTERNAL_CHANNEL_ID, "Live diagnostic");
                for ui in self.uis.values_mut() {
                    ui.push_pager_line(&text);
                }
                self.message = Some(StatusMessage {
                    text,
                    hl: HL_ERROR_MSG,
                });
            }
            Effect::Message(text) => {
                self.message = Some(StatusMessage {
                    text,
                    hl: HL_NORMAL,
                });
            }
            Effect::Colors(change) => {
                if !self.startup.push_colors(change) {
                    self.colors.apply(&change);
                }
            }
            Effect::AppendLine(text) => self.editor.append_line(&text),
        }
    }

    /// Bring every UI up to date with the current state
    pub(super) fn redraw_all(&mut self) {
        let prompt = &self.config.ui.pager_prompt;
        for (channel, ui) in self.uis.iter_mut() {
            let frame = match ui.phase() {
                UiPhase::Pager { lines } => Frame::pager(lines, prompt, ui.width, ui.height),
                UiPhase::Live => Frame::editor(
                    self.editor.lines(),
                    self.editor.cursor(),
                    self.message.as_ref(),
                    ui.width,
                    ui.height,
                ),
            };
            let Some(batch) = ui.render(frame, self.colors) else {
                continue;
            };
            if let Some(session) = self.channels.channel_for(*channel) {
                if let Err(e) = session.notify("redraw", batch) {
                    tracing::debug!(channel, error = %e, "Dropping redraw for closed channel");
                }
            }
        }
    }
}

fn initial_colors(config: &Config) -> Result<DefaultColors> {
    let parse = |name: &str, value: &Option<String>, default: i64| match value {
        Some(text) => script::parse_color(text)
            .ok_or_else(|| Error::Config(format!("ui.{} is not a color: {}", name, text))),
        None => Ok(default),
    };
    let unset = DefaultColors::default();
    Ok(DefaultColors {
        fg: parse("default_fg", &config.ui.default_fg, unset.fg)?,
        bg: parse("default_bg", &config.ui.default_bg, unset.bg)?,
        sp: parse("default_sp", &config.ui.default_sp, unset.sp)?,
    })
}

/// Accept peers forever, handing each to the core
async fn accept_loop(listener: ChannelListener, accepted: mpsc::UnboundedSender<ByteChannel>) {
    loop {
        match listener.accept().await {
            Ok(stream) => {
                if accepted.send(stream).is_err() {
                    break;
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "Accept error");
                tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            }
        }
    }
}

#[cfg(unix)]
struct Signals {
    term: tokio::signal::unix::Signal,
    int: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl Signals {
    fn install() -> Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};
        Ok(Self {
            term: signal(SignalKind::terminate())?,
            int: signal(SignalKind::interrupt())?,
        })
    }

    async fn recv(mut self) -> &'static str {
        tokio::select! {
            _ = self.term.recv() => "SIGTERM",
            _ = self.int.recv() => "SIGINT",
        }
    }
}

#[cfg(not(unix))]
struct Signals;

#[cfg(not(unix))]
impl Signals {
    fn install() -> Result<Self> {
        Ok(Self)
    }

    async fn recv(self) -> &'static str {
        let _ = tokio::signal::ctrl_c().await;
        "Ctrl+C"
    }
}
