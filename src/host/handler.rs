//! Request handler
//!
//! Maps RPC methods onto core operations. Anything that must be observed
//! after the response (entering a UI, closing a channel) is returned as a
//! [`Followup`] instead of being done here.

use crate::channel::AttachState;
use crate::common::{Error, Result};
use crate::rpc::{ChannelId, Value};

use super::editor::parse_keys;
use super::server::{Host, LifecycleEvent};
use super::ui::{self, Capabilities, UiState, CAPABILITIES_VERSION};

/// Methods served to every channel
pub const METHODS: [&str; 11] = [
    "ui_attach",
    "ui_detach",
    "ui_try_resize",
    "input",
    "get_api_info",
    "subscribe",
    "unsubscribe",
    "get_lifecycle_log",
    "command",
    "buf_get_lines",
    "list_chans",
];

/// Work that runs once the response has been queued
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Followup {
    EnterUi(ChannelId),
    Close(ChannelId),
    /// Deliver an already recorded one-shot event to a late subscriber
    Notify(ChannelId, LifecycleEvent),
}

pub struct Reply {
    pub result: Result<Value>,
    pub followups: Vec<Followup>,
}

/// Handle a request from `channel`
pub fn handle_request(host: &mut Host, channel: ChannelId, method: &str, args: Vec<Value>) -> Reply {
    tracing::debug!(channel, method, "Handling request");
    let mut followups = Vec::new();
    let result = dispatch(host, channel, method, args, &mut followups);
    if let Err(e) = &result {
        tracing::debug!(channel, method, error = %e, "Request failed");
    }
    Reply { result, followups }
}

/// Handle a notification from `channel`; only `input` means anything
pub fn handle_notification(
    host: &mut Host,
    channel: ChannelId,
    method: &str,
    args: Vec<Value>,
) -> Vec<Followup> {
    let mut followups = Vec::new();
    match method {
        "input" => {
            if let Err(e) = input(host, channel, &args, &mut followups) {
                tracing::warn!(channel, error = %e, "Bad input notification");
            }
        }
        other => tracing::debug!(channel, method = other, "Ignoring notification"),
    }
    followups
}

fn dispatch(
    host: &mut Host,
    channel: ChannelId,
    method: &str,
    args: Vec<Value>,
    followups: &mut Vec<Followup>,
) -> Result<Value> {
    match method {
        "ui_attach" => attach(host, channel, &args, followups),

        "ui_detach" => {
            if host.uis.remove(&channel).is_none() {
                return Err(Error::attach("UI not attached"));
            }
            host.channels.set_state(channel, AttachState::Closed)?;
            tracing::info!(channel, "UI detached");
            followups.push(Followup::Close(channel));
            Ok(Value::Nil)
        }

        "ui_try_resize" => {
            let [width, height] = args.as_slice() else {
                return Err(Error::invalid_args("ui_try_resize expects width and height"));
            };
            let (width, height) = ui::parse_dimensions(width, height).map_err(Error::InvalidArgs)?;
            let ui = host
                .uis
                .get_mut(&channel)
                .ok_or_else(|| Error::attach("UI not attached"))?;
            ui.resize(width, height);
            Ok(Value::Nil)
        }

        "input" => input(host, channel, &args, followups).map(Value::from),

        "get_api_info" => Ok(Value::Array(vec![
            Value::from(channel),
            Value::map([
                ("version", Value::from(CAPABILITIES_VERSION)),
                (
                    "capabilities",
                    Value::Array(Capabilities::NAMES.iter().map(|n| Value::from(*n)).collect()),
                ),
                (
                    "methods",
                    Value::Array(METHODS.iter().map(|m| Value::from(*m)).collect()),
                ),
            ]),
        ])),

        "subscribe" | "unsubscribe" => {
            let event = string_arg(&args, method)?;
            if !LifecycleEvent::NAMES.iter().any(|name| *name == event) {
                return Err(Error::invalid_args(format!("Unknown event: {}", event)));
            }
            let events = host.subscriptions.entry(channel).or_default();
            if method == "unsubscribe" {
                events.remove(event);
                return Ok(Value::Nil);
            }
            if events.insert(event.to_string()) && event == LifecycleEvent::EditorReady.name() {
                if let Some(ready) = host.lifecycle.iter().find(|e| e.name() == event) {
                    followups.push(Followup::Notify(channel, *ready));
                }
            }
            Ok(Value::Nil)
        }

        "get_lifecycle_log" => Ok(Value::Array(
            host.lifecycle.iter().map(LifecycleEvent::to_value).collect(),
        )),

        "command" => {
            let line = string_arg(&args, method)?;
            host.run_command(line);
            Ok(Value::Nil)
        }

        "buf_get_lines" => Ok(Value::Array(
            host.editor
                .lines()
                .iter()
                .map(|line| Value::from(line.as_str()))
                .collect(),
        )),

        "list_chans" => Ok(Value::Array(
            host.channels
                .list()
                .into_iter()
                .map(|info| {
                    Value::map([
                        ("id", Value::from(info.id)),
                        ("transport", Value::from(info.kind.to_string())),
                        ("state", Value::from(info.state.to_string())),
                    ])
                })
                .collect(),
        )),

        other => Err(Error::MethodNotFound(other.to_string())),
    }
}

fn string_arg<'a>(args: &'a [Value], method: &str) -> Result<&'a str> {
    match args {
        [value] => value.as_str().ok_or_else(|| {
            Error::invalid_args(format!("{} expects a string, got {}", method, value.kind()))
        }),
        _ => Err(Error::invalid_args(format!(
            "{} expects 1 argument, got {}",
            method,
            args.len()
        ))),
    }
}

/// `ui_attach(width, height, options)`
///
/// The first attach takes the startup buffer. With diagnostics in it this
/// channel gets the pager and stays attaching; otherwise it enters right
/// after the response.
fn attach(
    host: &mut Host,
    channel: ChannelId,
    args: &[Value],
    followups: &mut Vec<Followup>,
) -> Result<Value> {
    if host.uis.contains_key(&channel) {
        return Err(Error::attach("UI already attached to channel"));
    }
    let request = ui::parse_attach(args)?;
    host.channels.set_state(channel, AttachState::Attaching)?;

    let mut state = UiState::new(channel, request);
    match host.startup.take() {
        Some(drain) => {
            host.colors = drain.final_colors(host.colors);
            if drain.has_diagnostics() {
                let lines = drain.lines();
                tracing::info!(channel, lines = lines.len(), "Replaying startup diagnostics");
                state.enter_pager(lines);
            } else {
                tracing::debug!(channel, entries = drain.entries().len(), "Startup buffer retired");
                followups.push(Followup::EnterUi(channel));
            }
        }
        None => followups.push(Followup::EnterUi(channel)),
    }

    tracing::info!(
        channel,
        width = request.width,
        height = request.height,
        linegrid = request.caps.ext_linegrid,
        rgb = request.caps.rgb,
        "UI attaching"
    );
    host.uis.insert(channel, state);
    Ok(Value::Nil)
}

/// Feed keys from `channel`; returns how many keys were consumed
///
/// Only attaching or attached UIs may send input. A channel in the pager
/// swallows keys until a continue key, and whatever follows it goes to the
/// editor.
fn input(
    host: &mut Host,
    channel: ChannelId,
    args: &[Value],
    followups: &mut Vec<Followup>,
) -> Result<usize> {
    let Some(ui) = host.uis.get(&channel) else {
        return Err(Error::attach("UI not attached"));
    };
    let mut in_pager = ui.in_pager();
    let keys = parse_keys(string_arg(args, "input")?);

    for key in &keys {
        if in_pager {
            if key.is_continue() {
                in_pager = false;
                followups.push(Followup::EnterUi(channel));
            }
            continue;
        }
        host.editor.feed(key);
    }
    Ok(keys.len())
}
