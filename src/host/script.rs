//! Startup command language
//!
//! Just enough of a command line to produce the things the embedding layer
//! carries: diagnostics, messages, default colors and buffer text.

use super::screen::{ColorChange, UNSET_COLOR};

/// What running one command asks the host to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// An error line (buffered before the first attach)
    Diagnostic(String),
    /// Plain text for the message row
    Message(String),
    Colors(ColorChange),
    AppendLine(String),
}

/// Run one command line
pub fn execute(line: &str) -> Vec<Effect> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('"') {
        return Vec::new();
    }

    let (name, rest) = match line.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim_start()),
        None => (line, ""),
    };

    match name {
        "echoerr" => vec![Effect::Diagnostic(unquote(rest).to_string())],
        "echo" => vec![Effect::Message(unquote(rest).to_string())],
        "insert" => vec![Effect::AppendLine(rest.to_string())],
        "hi" | "highlight" => highlight(rest),
        _ => vec![Effect::Diagnostic(format!(
            "E492: Not an editor command: {}",
            line
        ))],
    }
}

fn unquote(text: &str) -> &str {
    for quote in ['"', '\''] {
        if let Some(inner) = text
            .strip_prefix(quote)
            .and_then(|t| t.strip_suffix(quote))
        {
            return inner;
        }
    }
    text
}

/// `highlight Normal fg=#RRGGBB bg=#RRGGBB sp=#RRGGBB`
///
/// Only the Normal group maps to default colors; other groups are accepted
/// and ignored.
fn highlight(args: &str) -> Vec<Effect> {
    let mut words = args.split_whitespace();
    let Some(group) = words.next() else {
        return Vec::new();
    };
    if !group.eq_ignore_ascii_case("normal") {
        tracing::debug!(group, "Ignoring highlight for non-default group");
        return Vec::new();
    }

    let mut effects = Vec::new();
    let mut change = ColorChange::default();
    for arg in words {
        let Some((key, value)) = arg.split_once('=') else {
            effects.push(Effect::Diagnostic(format!("E416: Missing equal sign: {}", arg)));
            continue;
        };
        let slot = match key.to_ascii_lowercase().as_str() {
            "fg" | "guifg" => &mut change.fg,
            "bg" | "guibg" => &mut change.bg,
            "sp" | "guisp" => &mut change.sp,
            _ => {
                effects.push(Effect::Diagnostic(format!("E423: Illegal argument: {}", arg)));
                continue;
            }
        };
        match parse_color(value) {
            Some(color) => *slot = Some(color),
            None => effects.push(Effect::Diagnostic(format!(
                "E254: Cannot allocate color {}",
                value
            ))),
        }
    }

    if !change.is_empty() {
        effects.push(Effect::Colors(change));
    }
    effects
}

/// `#RRGGBB` to a 24-bit integer; `NONE` resets to the terminal default
pub fn parse_color(value: &str) -> Option<i64> {
    if value.eq_ignore_ascii_case("none") {
        return Some(UNSET_COLOR);
    }
    let hex = value.strip_prefix('#')?;
    if hex.len() != 6 {
        return None;
    }
    i64::from_str_radix(hex, 16).ok()
}
