//! Attach protocol: capability negotiation and per-UI render state

use crate::common::{Error, Result};
use crate::rpc::{ChannelId, Value};

use super::screen::{self, DefaultColors, EventEncoder, Frame, ScreenEvent};

/// Version of the capability set below
pub const CAPABILITIES_VERSION: i64 = 1;

/// Capabilities a UI negotiates at attach time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// Colors are 24-bit RGB; otherwise they are sent as -1
    pub rgb: bool,
    /// Cell-grid events instead of the legacy line encoding
    pub ext_linegrid: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            rgb: true,
            ext_linegrid: false,
        }
    }
}

impl Capabilities {
    pub const NAMES: [&'static str; 2] = ["rgb", "ext_linegrid"];

    /// Parse the options map of `ui_attach`
    ///
    /// Unknown names and non-boolean values are rejected.
    pub fn from_options(options: &Value) -> Result<Self> {
        let entries = options.as_map().ok_or_else(|| {
            Error::attach(format!("options must be a map, got {}", options.kind()))
        })?;

        let mut caps = Self::default();
        for (name, value) in entries {
            let flag = match name.as_str() {
                "rgb" => &mut caps.rgb,
                "ext_linegrid" => &mut caps.ext_linegrid,
                other => return Err(Error::attach(format!("No such UI option: {}", other))),
            };
            *flag = value.as_bool().ok_or_else(|| {
                Error::attach(format!(
                    "UI option '{}' must be a boolean, got {}",
                    name,
                    value.kind()
                ))
            })?;
        }
        Ok(caps)
    }

    pub fn to_value(&self) -> Value {
        Value::map([
            ("rgb", Value::from(self.rgb)),
            ("ext_linegrid", Value::from(self.ext_linegrid)),
        ])
    }
}

/// A validated `ui_attach` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttachRequest {
    pub width: usize,
    pub height: usize,
    pub caps: Capabilities,
}

/// Largest width or height a UI may ask for
pub const MAX_DIMENSION: usize = 1000;

/// Validate `width, height`; the message is used by attach and resize alike
pub fn parse_dimensions(width: &Value, height: &Value) -> std::result::Result<(usize, usize), String> {
    let dimension = |name: &str, value: &Value| match value.as_i64() {
        Some(n) if n > 0 => usize::try_from(n)
            .ok()
            .filter(|n| *n <= MAX_DIMENSION)
            .ok_or_else(|| format!("{} = {} exceeds the maximum of {}", name, n, MAX_DIMENSION)),
        Some(n) => Err(format!("Expected width > 0 and height > 0, got {} = {}", name, n)),
        None => Err(format!("{} must be an integer, got {}", name, value.kind())),
    };
    Ok((dimension("width", width)?, dimension("height", height)?))
}

/// Validate `ui_attach(width, height, options)` arguments
pub fn parse_attach(args: &[Value]) -> Result<AttachRequest> {
    let [width, height, options] = args else {
        return Err(Error::attach(format!(
            "ui_attach expects 3 arguments (width, height, options), got {}",
            args.len()
        )));
    };
    let (width, height) = parse_dimensions(width, height).map_err(Error::attach)?;
    let caps = Capabilities::from_options(options)?;
    Ok(AttachRequest {
        width,
        height,
        caps,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiPhase {
    /// Showing startup diagnostics until the user continues
    Pager { lines: Vec<String> },
    Live,
}

/// Render state of one attached (or attaching) UI
#[derive(Debug)]
pub struct UiState {
    pub channel: ChannelId,
    pub width: usize,
    pub height: usize,
    pub caps: Capabilities,
    phase: UiPhase,
    /// Last frame this UI was sent; `None` forces a full redraw
    screen: Option<Frame>,
    sent_colors: Option<DefaultColors>,
    highlights_sent: bool,
    encoder: EventEncoder,
}

impl UiState {
    pub fn new(channel: ChannelId, request: AttachRequest) -> Self {
        Self {
            channel,
            width: request.width,
            height: request.height,
            caps: request.caps,
            phase: UiPhase::Live,
            screen: None,
            sent_colors: None,
            highlights_sent: false,
            encoder: EventEncoder::new(request.caps.ext_linegrid, request.caps.rgb),
        }
    }

    pub fn phase(&self) -> &UiPhase {
        &self.phase
    }

    pub fn in_pager(&self) -> bool {
        matches!(self.phase, UiPhase::Pager { .. })
    }

    pub fn enter_pager(&mut self, lines: Vec<String>) {
        self.phase = UiPhase::Pager { lines };
    }

    /// Add a diagnostic that arrived while the pager is up
    pub fn push_pager_line(&mut self, line: &str) {
        if let UiPhase::Pager { lines } = &mut self.phase {
            lines.push(line.to_string());
        }
    }

    /// Leave the pager (if any); the next render is a full redraw
    pub fn go_live(&mut self) {
        self.phase = UiPhase::Live;
        self.screen = None;
    }

    pub fn resize(&mut self, width: usize, height: usize) {
        self.width = width;
        self.height = height;
        self.screen = None;
    }

    /// Bring the UI up to date with `frame`
    ///
    /// Returns the `redraw` arguments, or `None` if nothing changed.
    /// Default colors are only sent when they differ from what the UI has;
    /// a pager keeps its first colors until the UI goes live.
    pub fn render(&mut self, frame: Frame, colors: DefaultColors) -> Option<Vec<Value>> {
        let mut events = Vec::new();

        let held = self.in_pager() && self.sent_colors.is_some();
        if !held && self.sent_colors != Some(colors) {
            events.push(ScreenEvent::DefaultColors(colors));
            self.sent_colors = Some(colors);
        }
        if !self.highlights_sent {
            events.extend(
                screen::highlight_groups()
                    .into_iter()
                    .map(|(id, attr)| ScreenEvent::HlAttrDefine { id, attr }),
            );
            self.highlights_sent = true;
        }

        match &self.screen {
            Some(old) if old.width == frame.width && old.height == frame.height => {
                events.extend(screen::diff(old, &frame));
            }
            _ => events.extend(screen::full(&frame)),
        }
        self.screen = Some(frame);

        if events.is_empty() {
            return None;
        }
        events.push(ScreenEvent::Flush);
        Some(self.encoder.encode(&events))
    }
}
