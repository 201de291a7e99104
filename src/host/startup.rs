//! Startup buffer
//!
//! Diagnostics and default-color changes produced before any UI exists are
//! held here and handed, once, to the first channel that attaches. After
//! the hand-off the buffer refuses new entries and callers route them live.

use super::screen::{ColorChange, DefaultColors};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartupEntry {
    Diagnostic(String),
    Colors(ColorChange),
}

#[derive(Debug)]
enum Phase {
    Collecting(Vec<StartupEntry>),
    Drained,
}

#[derive(Debug)]
pub struct StartupBuffer {
    phase: Phase,
}

impl Default for StartupBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl StartupBuffer {
    pub fn new() -> Self {
        Self {
            phase: Phase::Collecting(Vec::new()),
        }
    }

    pub fn is_collecting(&self) -> bool {
        matches!(self.phase, Phase::Collecting(_))
    }

    /// Append a diagnostic line; `false` once drained
    pub fn push_diagnostic(&mut self, line: impl Into<String>) -> bool {
        self.push(StartupEntry::Diagnostic(line.into()))
    }

    /// Append a color assignment; `false` once drained
    pub fn push_colors(&mut self, change: ColorChange) -> bool {
        self.push(StartupEntry::Colors(change))
    }

    fn push(&mut self, entry: StartupEntry) -> bool {
        match &mut self.phase {
            Phase::Collecting(entries) => {
                entries.push(entry);
                true
            }
            Phase::Drained => false,
        }
    }

    /// Move to `Drained` and hand over everything collected
    ///
    /// Returns `Some` exactly once.
    pub fn take(&mut self) -> Option<Drain> {
        match std::mem::replace(&mut self.phase, Phase::Drained) {
            Phase::Collecting(entries) => Some(Drain { entries }),
            Phase::Drained => None,
        }
    }
}

/// The entries collected before the first attach, in arrival order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Drain {
    entries: Vec<StartupEntry>,
}

impl Drain {
    pub fn entries(&self) -> &[StartupEntry] {
        &self.entries
    }

    pub fn has_diagnostics(&self) -> bool {
        self.entries
            .iter()
            .any(|e| matches!(e, StartupEntry::Diagnostic(_)))
    }

    pub fn lines(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter_map(|e| match e {
                StartupEntry::Diagnostic(line) => Some(line.clone()),
                StartupEntry::Colors(_) => None,
            })
            .collect()
    }

    /// Fold every color entry onto `base`; intermediate values are never
    /// observable
    pub fn final_colors(&self, base: DefaultColors) -> DefaultColors {
        self.entries.iter().fold(base, |mut colors, entry| {
            if let StartupEntry::Colors(change) = entry {
                colors.apply(change);
            }
            colors
        })
    }
}
