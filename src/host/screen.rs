//! Screen model, diffing and wire encoding
//!
//! The host renders a [`Frame`] per UI, diffs it against the last frame
//! that UI saw and encodes the resulting [`ScreenEvent`]s in whichever
//! dialect the UI negotiated.

use std::collections::HashMap;

use crate::rpc::Value;

/// Highlight attribute id; 0 is always the default (Normal) attribute
pub type HlId = u32;

pub const HL_NORMAL: HlId = 0;
pub const HL_ERROR_MSG: HlId = 1;
pub const HL_MORE_MSG: HlId = 2;
pub const HL_NON_TEXT: HlId = 3;

/// Color value meaning "terminal default"
pub const UNSET_COLOR: i64 = -1;

/// Grid id used for the single grid this host draws
const GRID: i64 = 1;

/// Resolved default foreground, background and special colors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DefaultColors {
    pub fg: i64,
    pub bg: i64,
    pub sp: i64,
}

impl Default for DefaultColors {
    fn default() -> Self {
        Self {
            fg: UNSET_COLOR,
            bg: UNSET_COLOR,
            sp: UNSET_COLOR,
        }
    }
}

impl DefaultColors {
    pub fn apply(&mut self, change: &ColorChange) {
        if let Some(fg) = change.fg {
            self.fg = fg;
        }
        if let Some(bg) = change.bg {
            self.bg = bg;
        }
        if let Some(sp) = change.sp {
            self.sp = sp;
        }
    }
}

/// A partial default-color assignment; `None` leaves a color alone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ColorChange {
    pub fg: Option<i64>,
    pub bg: Option<i64>,
    pub sp: Option<i64>,
}

impl ColorChange {
    pub fn is_empty(&self) -> bool {
        self.fg.is_none() && self.bg.is_none() && self.sp.is_none()
    }
}

/// Highlight attributes of one group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HlAttr {
    pub foreground: Option<i64>,
    pub background: Option<i64>,
    pub bold: bool,
}

/// The fixed highlight groups every UI receives
pub fn highlight_groups() -> [(HlId, HlAttr); 4] {
    [
        (HL_NORMAL, HlAttr::default()),
        (
            HL_ERROR_MSG,
            HlAttr {
                foreground: Some(0xffffff),
                background: Some(0xff0000),
                bold: false,
            },
        ),
        (
            HL_MORE_MSG,
            HlAttr {
                foreground: Some(0x2e8b57),
                background: None,
                bold: true,
            },
        ),
        (
            HL_NON_TEXT,
            HlAttr {
                foreground: Some(0x0000ff),
                background: None,
                bold: true,
            },
        ),
    ]
}

/// Text shown on the message row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusMessage {
    pub text: String,
    pub hl: HlId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cell {
    pub ch: char,
    pub hl: HlId,
}

impl Cell {
    pub const BLANK: Cell = Cell { ch: ' ', hl: HL_NORMAL };
}

/// A complete screen: one grid of cells plus the cursor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub width: usize,
    pub height: usize,
    pub rows: Vec<Vec<Cell>>,
    pub cursor: (usize, usize),
}

impl Frame {
    pub fn blank(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            rows: vec![vec![Cell::BLANK; width]; height],
            cursor: (0, 0),
        }
    }

    /// Write text starting at `col`; anything past the right edge is cut
    fn put_text(&mut self, row: usize, col: usize, text: &str, hl: HlId) -> usize {
        let Some(cells) = self.rows.get_mut(row) else {
            return col;
        };
        let mut end = col;
        for (cell, ch) in cells.iter_mut().skip(col).zip(text.chars()) {
            let ch = if ch.is_control() { '?' } else { ch };
            *cell = Cell { ch, hl };
            end += 1;
        }
        end
    }

    /// The editing view: buffer lines, `~` filler past the end of the
    /// buffer, and a message row at the bottom
    pub fn editor(
        lines: &[String],
        cursor: (usize, usize),
        message: Option<&StatusMessage>,
        width: usize,
        height: usize,
    ) -> Self {
        let mut frame = Self::blank(width, height);
        let text_rows = height.saturating_sub(1);

        // Scroll so the cursor line stays visible
        let top = if text_rows > 0 && cursor.0 >= text_rows {
            cursor.0 + 1 - text_rows
        } else {
            0
        };

        for row in 0..text_rows {
            match lines.get(top + row) {
                Some(line) => {
                    frame.put_text(row, 0, line, HL_NORMAL);
                }
                None => {
                    frame.put_text(row, 0, "~", HL_NON_TEXT);
                }
            }
        }

        if let (Some(message), Some(last)) = (message, height.checked_sub(1)) {
            frame.put_text(last, 0, &message.text, message.hl);
        }

        let max_col = width.saturating_sub(1);
        frame.cursor = (
            (cursor.0 - top).min(text_rows.saturating_sub(1)),
            cursor.1.min(max_col),
        );
        frame
    }

    /// The startup pager: diagnostics top-aligned, the prompt after them
    ///
    /// Long lines wrap. When the block is taller than the screen the
    /// oldest rows scroll off the top.
    pub fn pager(lines: &[String], prompt: &str, width: usize, height: usize) -> Self {
        let mut block: Vec<(String, HlId)> = Vec::new();
        for line in lines {
            block.extend(wrap(line, width).into_iter().map(|row| (row, HL_ERROR_MSG)));
        }
        block.push((prompt.to_string(), HL_MORE_MSG));

        let skip = block.len().saturating_sub(height);
        let mut frame = Self::blank(width, height);
        let mut cursor = (0, 0);
        for (row, (text, hl)) in block.iter().skip(skip).enumerate() {
            let end = frame.put_text(row, 0, text, *hl);
            cursor = (row, end.min(width.saturating_sub(1)));
        }
        frame.cursor = cursor;
        frame
    }

    /// Row contents with trailing blanks removed
    pub fn row_text(&self, row: usize) -> String {
        self.rows
            .get(row)
            .map(|cells| cells.iter().map(|c| c.ch).collect::<String>())
            .unwrap_or_default()
            .trim_end()
            .to_string()
    }
}

fn wrap(line: &str, width: usize) -> Vec<String> {
    let chars: Vec<char> = line.chars().collect();
    if chars.is_empty() || width == 0 {
        return vec![String::new()];
    }
    chars.chunks(width).map(|chunk| chunk.iter().collect()).collect()
}

/// One incremental change to a UI's screen
#[derive(Debug, Clone, PartialEq)]
pub enum ScreenEvent {
    Resize { width: usize, height: usize },
    Clear,
    /// Overwrite `cells.len()` cells of `row` starting at `col`
    Line { row: usize, col: usize, cells: Vec<Cell> },
    Cursor { row: usize, col: usize },
    /// Shift rows `top..bot` (columns `left..right`) up by `rows`
    Scroll {
        top: usize,
        bot: usize,
        left: usize,
        right: usize,
        rows: usize,
    },
    HlAttrDefine { id: HlId, attr: HlAttr },
    DefaultColors(DefaultColors),
    Flush,
}

/// Events that paint `frame` onto a cleared grid of its size
pub fn full(frame: &Frame) -> Vec<ScreenEvent> {
    let mut events = vec![
        ScreenEvent::Resize {
            width: frame.width,
            height: frame.height,
        },
        ScreenEvent::Clear,
    ];
    let blank = Frame::blank(frame.width, frame.height);
    line_diffs(&blank.rows, frame, &mut events);
    events.push(ScreenEvent::Cursor {
        row: frame.cursor.0,
        col: frame.cursor.1,
    });
    events
}

/// Events that turn `old` into `new`; both must have the same size
pub fn diff(old: &Frame, new: &Frame) -> Vec<ScreenEvent> {
    let mut events = Vec::new();
    let mut base = old.rows.clone();

    // Everything but the message row may scroll
    let bot = new.height.saturating_sub(1);
    if let Some(rows) = best_scroll(&old.rows, &new.rows, bot) {
        events.push(ScreenEvent::Scroll {
            top: 0,
            bot,
            left: 0,
            right: new.width,
            rows,
        });
        base = scrolled(&old.rows, bot, rows, new.width);
    }

    line_diffs(&base, new, &mut events);
    if !events.is_empty() || old.cursor != new.cursor {
        events.push(ScreenEvent::Cursor {
            row: new.cursor.0,
            col: new.cursor.1,
        });
    }
    events
}

fn line_diffs(base: &[Vec<Cell>], new: &Frame, events: &mut Vec<ScreenEvent>) {
    for (row, (before, after)) in base.iter().zip(&new.rows).enumerate() {
        let first = before.iter().zip(after).position(|(a, b)| a != b);
        let last = before.iter().zip(after).rposition(|(a, b)| a != b);
        if let (Some(first), Some(last)) = (first, last) {
            events.push(ScreenEvent::Line {
                row,
                col: first,
                cells: after[first..=last].to_vec(),
            });
        }
    }
}

fn changed_rows(base: &[Vec<Cell>], new: &[Vec<Cell>]) -> usize {
    base.iter().zip(new).filter(|(a, b)| a != b).count()
}

fn scrolled(rows: &[Vec<Cell>], bot: usize, by: usize, width: usize) -> Vec<Vec<Cell>> {
    let mut out = rows.to_vec();
    for row in 0..bot {
        out[row] = match rows.get(row + by) {
            Some(src) if row + by < bot => src.clone(),
            _ => vec![Cell::BLANK; width],
        };
    }
    out
}

/// Pick the upward shift of rows `0..bot` that leaves the fewest rows to
/// rewrite, if any shift beats rewriting in place
fn best_scroll(old: &[Vec<Cell>], new: &[Vec<Cell>], bot: usize) -> Option<usize> {
    if bot < 2 {
        return None;
    }
    let width = new.first().map(Vec::len).unwrap_or(0);
    let in_place = changed_rows(&old[..bot], &new[..bot]);
    if in_place < 2 {
        return None;
    }

    (1..bot)
        .map(|by| {
            let base = scrolled(old, bot, by, width);
            (changed_rows(&base[..bot], &new[..bot]), by)
        })
        // One row for the scroll itself
        .filter(|(cost, _)| cost + 1 < in_place)
        .min()
        .map(|(_, by)| by)
}

/// Turns screen events into `redraw` batches for one UI
///
/// Stateful: the legacy dialect has no attribute table on the wire, so
/// the encoder remembers definitions and the current highlight.
#[derive(Debug)]
pub struct EventEncoder {
    linegrid: bool,
    rgb: bool,
    width: usize,
    attrs: HashMap<HlId, HlAttr>,
    current_hl: Option<HlId>,
}

impl EventEncoder {
    pub fn new(linegrid: bool, rgb: bool) -> Self {
        Self {
            linegrid,
            rgb,
            width: 0,
            attrs: HashMap::new(),
            current_hl: None,
        }
    }

    fn color(&self, value: i64) -> Value {
        Value::from(if self.rgb { value } else { UNSET_COLOR })
    }

    fn attr_map(&self, attr: &HlAttr) -> Value {
        let mut entries = Vec::new();
        if let Some(fg) = attr.foreground {
            entries.push(("foreground", self.color(fg)));
        }
        if let Some(bg) = attr.background {
            entries.push(("background", self.color(bg)));
        }
        if attr.bold {
            entries.push(("bold", Value::from(true)));
        }
        Value::map(entries)
    }

    /// Encode events as the argument list of one `redraw` notification
    pub fn encode(&mut self, events: &[ScreenEvent]) -> Vec<Value> {
        let mut batch = Batch::default();
        for event in events {
            if self.linegrid {
                self.encode_linegrid(event, &mut batch);
            } else {
                self.encode_legacy(event, &mut batch);
            }
        }
        batch.finish()
    }

    fn encode_linegrid(&mut self, event: &ScreenEvent, batch: &mut Batch) {
        match event {
            ScreenEvent::Resize { width, height } => {
                self.width = *width;
                batch.push("grid_resize", vec![GRID.into(), (*width).into(), (*height).into()]);
            }
            ScreenEvent::Clear => batch.push("grid_clear", vec![GRID.into()]),
            ScreenEvent::Line { row, col, cells } => batch.push(
                "grid_line",
                vec![GRID.into(), (*row).into(), (*col).into(), encode_cells(cells)],
            ),
            ScreenEvent::Cursor { row, col } => {
                batch.push("grid_cursor_goto", vec![GRID.into(), (*row).into(), (*col).into()])
            }
            ScreenEvent::Scroll {
                top,
                bot,
                left,
                right,
                rows,
            } => batch.push(
                "grid_scroll",
                vec![
                    GRID.into(),
                    (*top).into(),
                    (*bot).into(),
                    (*left).into(),
                    (*right).into(),
                    (*rows).into(),
                    Value::from(0i64),
                ],
            ),
            ScreenEvent::HlAttrDefine { id, attr } => {
                self.attrs.insert(*id, *attr);
                batch.push(
                    "hl_attr_define",
                    vec![
                        i64::from(*id).into(),
                        self.attr_map(attr),
                        Value::map(Vec::<(String, Value)>::new()),
                        Value::Array(Vec::new()),
                    ],
                );
            }
            ScreenEvent::DefaultColors(colors) => batch.push(
                "default_colors_set",
                vec![
                    self.color(colors.fg),
                    self.color(colors.bg),
                    self.color(colors.sp),
                    UNSET_COLOR.into(),
                    UNSET_COLOR.into(),
                ],
            ),
            ScreenEvent::Flush => batch.push("flush", Vec::new()),
        }
    }

    fn encode_legacy(&mut self, event: &ScreenEvent, batch: &mut Batch) {
        match event {
            ScreenEvent::Resize { width, height } => {
                self.width = *width;
                batch.push("resize", vec![(*width).into(), (*height).into()]);
            }
            ScreenEvent::Clear => batch.push("clear", Vec::new()),
            ScreenEvent::Line { row, col, cells } => {
                batch.push("cursor_goto", vec![(*row).into(), (*col).into()]);

                // A span reaching the right edge ends with eol_clear instead
                // of explicit blanks
                let mut text_cells = cells.as_slice();
                let reaches_edge = col + cells.len() >= self.width;
                if reaches_edge {
                    let keep = cells
                        .iter()
                        .rposition(|c| *c != Cell::BLANK)
                        .map_or(0, |i| i + 1);
                    text_cells = &cells[..keep];
                }

                for run in text_cells.chunk_by(|a, b| a.hl == b.hl) {
                    self.set_legacy_hl(run[0].hl, batch);
                    let text: String = run.iter().map(|c| c.ch).collect();
                    batch.push("put", vec![text.into()]);
                }

                if reaches_edge && text_cells.len() < cells.len() {
                    self.set_legacy_hl(HL_NORMAL, batch);
                    batch.push("eol_clear", Vec::new());
                }
            }
            ScreenEvent::Cursor { row, col } => {
                batch.push("cursor_goto", vec![(*row).into(), (*col).into()])
            }
            ScreenEvent::Scroll {
                top,
                bot,
                left,
                right,
                rows,
            } => {
                batch.push(
                    "set_scroll_region",
                    vec![
                        (*top).into(),
                        (bot - 1).into(),
                        (*left).into(),
                        (right - 1).into(),
                    ],
                );
                batch.push("scroll", vec![(*rows).into()]);
            }
            ScreenEvent::HlAttrDefine { id, attr } => {
                self.attrs.insert(*id, *attr);
            }
            ScreenEvent::DefaultColors(colors) => {
                batch.push("update_fg", vec![self.color(colors.fg)]);
                batch.push("update_bg", vec![self.color(colors.bg)]);
                batch.push("update_sp", vec![self.color(colors.sp)]);
            }
            ScreenEvent::Flush => batch.push("flush", Vec::new()),
        }
    }

    fn set_legacy_hl(&mut self, hl: HlId, batch: &mut Batch) {
        if self.current_hl == Some(hl) {
            return;
        }
        self.current_hl = Some(hl);
        let attr = self.attrs.get(&hl).copied().unwrap_or_default();
        batch.push("highlight_set", vec![self.attr_map(&attr)]);
    }
}

/// `grid_line` cell list: `[text]`, `[text, hl]` or `[text, hl, repeat]`;
/// an omitted hl means "same as the previous cell"
fn encode_cells(cells: &[Cell]) -> Value {
    let mut out = Vec::new();
    let mut last_hl = None;
    for run in cells.chunk_by(|a, b| a == b) {
        let cell = run[0];
        let text = Value::from(cell.ch.to_string());
        let item = if run.len() > 1 {
            vec![text, i64::from(cell.hl).into(), run.len().into()]
        } else if last_hl != Some(cell.hl) {
            vec![text, i64::from(cell.hl).into()]
        } else {
            vec![text]
        };
        last_hl = Some(cell.hl);
        out.push(Value::Array(item));
    }
    Value::Array(out)
}

/// Groups consecutive events of the same name: `[name, params, params...]`
#[derive(Default)]
struct Batch {
    groups: Vec<(&'static str, Vec<Value>)>,
}

impl Batch {
    fn push(&mut self, name: &'static str, params: Vec<Value>) {
        match self.groups.last_mut() {
            Some((last, calls)) if *last == name => calls.push(Value::Array(params)),
            _ => self.groups.push((name, vec![Value::Array(params)])),
        }
    }

    fn finish(self) -> Vec<Value> {
        self.groups
            .into_iter()
            .map(|(name, calls)| {
                let mut item = vec![Value::from(name)];
                item.extend(calls);
                Value::Array(item)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(batch: &[Value]) -> Vec<String> {
        batch
            .iter()
            .map(|item| item.as_array().unwrap()[0].as_str().unwrap().to_string())
            .collect()
    }

    fn lines(texts: &[&str]) -> Vec<String> {
        texts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_editor_frame_layout() {
        let message = StatusMessage {
            text: "E492: Not an editor command: foo".to_string(),
            hl: HL_ERROR_MSG,
        };
        let frame = Frame::editor(&lines(&["alpha", "beta"]), (1, 2), Some(&message), 40, 5);

        assert_eq!(frame.row_text(0), "alpha");
        assert_eq!(frame.row_text(1), "beta");
        assert_eq!(frame.row_text(2), "~");
        assert_eq!(frame.rows[2][0].hl, HL_NON_TEXT);
        assert_eq!(frame.row_text(4), "E492: Not an editor command: foo");
        assert_eq!(frame.rows[4][0].hl, HL_ERROR_MSG);
        assert_eq!(frame.cursor, (1, 2));
    }

    #[test]
    fn test_editor_frame_scrolls_to_cursor() {
        let buffer: Vec<String> = (0..10).map(|n| format!("line {n}")).collect();
        let frame = Frame::editor(&buffer, (9, 0), None, 20, 4);
        assert_eq!(frame.row_text(0), "line 7");
        assert_eq!(frame.row_text(2), "line 9");
        assert_eq!(frame.cursor, (2, 0));
    }

    #[test]
    fn test_pager_frame() {
        let frame = Frame::pager(&lines(&["first", "second"]), "Press ENTER", 30, 8);
        assert_eq!(frame.row_text(0), "first");
        assert_eq!(frame.row_text(1), "second");
        assert_eq!(frame.row_text(2), "Press ENTER");
        assert_eq!(frame.rows[0][0].hl, HL_ERROR_MSG);
        assert_eq!(frame.rows[2][0].hl, HL_MORE_MSG);
        assert_eq!(frame.cursor, (2, 11));
    }

    #[test]
    fn test_pager_overflow_keeps_newest_lines() {
        let diagnostics: Vec<String> = (0..6).map(|n| format!("err {n}")).collect();
        let frame = Frame::pager(&diagnostics, "more", 10, 4);
        assert_eq!(frame.row_text(0), "err 3");
        assert_eq!(frame.row_text(2), "err 5");
        assert_eq!(frame.row_text(3), "more");
    }

    #[test]
    fn test_pager_wraps_long_lines() {
        let frame = Frame::pager(&lines(&["abcdefgh"]), "ok", 5, 4);
        assert_eq!(frame.row_text(0), "abcde");
        assert_eq!(frame.row_text(1), "fgh");
        assert_eq!(frame.row_text(2), "ok");
    }

    #[test]
    fn test_diff_writes_only_changed_span() {
        let old = Frame::editor(&lines(&["hello"]), (0, 5), None, 20, 3);
        let new = Frame::editor(&lines(&["help!"]), (0, 5), None, 20, 3);

        assert_eq!(
            diff(&old, &new),
            vec![
                ScreenEvent::Line {
                    row: 0,
                    col: 3,
                    cells: vec![
                        Cell { ch: 'p', hl: HL_NORMAL },
                        Cell { ch: '!', hl: HL_NORMAL },
                    ],
                },
                ScreenEvent::Cursor { row: 0, col: 5 },
            ]
        );
    }

    #[test]
    fn test_diff_of_identical_frames_is_empty() {
        let frame = Frame::editor(&lines(&["same"]), (0, 0), None, 10, 3);
        assert!(diff(&frame, &frame.clone()).is_empty());
    }

    #[test]
    fn test_diff_detects_scroll() {
        let before: Vec<String> = (0..6).map(|n| format!("err {n}")).collect();
        let after: Vec<String> = (0..7).map(|n| format!("err {n}")).collect();
        let old = Frame::pager(&before, "more", 10, 6);
        let new = Frame::pager(&after, "more", 10, 6);

        let events = diff(&old, &new);
        assert_eq!(
            events[0],
            ScreenEvent::Scroll {
                top: 0,
                bot: 5,
                left: 0,
                right: 10,
                rows: 1,
            }
        );
        // Only the row scrolled in needs writing
        let written: Vec<usize> = events
            .iter()
            .filter_map(|e| match e {
                ScreenEvent::Line { row, .. } => Some(*row),
                _ => None,
            })
            .collect();
        assert_eq!(written, vec![4]);
    }

    #[test]
    fn test_linegrid_encoding() {
        let frame = Frame::pager(&lines(&["ab"]), "go", 4, 2);
        let mut encoder = EventEncoder::new(true, true);
        let batch = encoder.encode(&full(&frame));

        assert_eq!(
            names(&batch),
            vec!["grid_resize", "grid_clear", "grid_line", "grid_cursor_goto"]
        );
        // Both rows land in one grid_line group
        let grid_lines = batch[2].as_array().unwrap();
        assert_eq!(grid_lines.len(), 3);
        assert_eq!(
            grid_lines[1],
            Value::Array(vec![
                Value::from(1i64),
                Value::from(0i64),
                Value::from(0i64),
                Value::Array(vec![
                    Value::Array(vec![Value::from("a"), Value::from(1i64)]),
                    Value::Array(vec![Value::from("b")]),
                ]),
            ])
        );
    }

    #[test]
    fn test_linegrid_repeats_runs() {
        let cells = vec![Cell { ch: '~', hl: 3 }, Cell::BLANK, Cell::BLANK, Cell::BLANK];
        assert_eq!(
            encode_cells(&cells),
            Value::Array(vec![
                Value::Array(vec![Value::from("~"), Value::from(3i64)]),
                Value::Array(vec![Value::from(" "), Value::from(0i64), Value::from(3usize)]),
            ])
        );
    }

    #[test]
    fn test_legacy_encoding() {
        let mut encoder = EventEncoder::new(false, true);
        let mut events = vec![ScreenEvent::HlAttrDefine {
            id: HL_ERROR_MSG,
            attr: highlight_groups()[1].1,
        }];
        events.extend(full(&Frame::pager(&lines(&["bad"]), "ok", 6, 2)));
        events.push(ScreenEvent::DefaultColors(DefaultColors {
            fg: 0x112233,
            bg: 0,
            sp: UNSET_COLOR,
        }));
        let batch = encoder.encode(&events);

        assert_eq!(
            names(&batch),
            vec![
                "resize",
                "clear",
                "cursor_goto",
                "highlight_set",
                "put",
                "cursor_goto",
                "highlight_set",
                "put",
                "cursor_goto",
                "update_fg",
                "update_bg",
                "update_sp",
            ]
        );
        let put = batch[4].as_array().unwrap();
        assert_eq!(put[1], Value::Array(vec![Value::from("bad")]));
    }

    #[test]
    fn test_legacy_eol_clear() {
        let mut encoder = EventEncoder::new(false, true);
        encoder.encode(&[ScreenEvent::Resize { width: 5, height: 2 }]);
        let batch = encoder.encode(&[ScreenEvent::Line {
            row: 0,
            col: 0,
            cells: vec![
                Cell { ch: 'x', hl: HL_NORMAL },
                Cell::BLANK,
                Cell::BLANK,
                Cell::BLANK,
                Cell::BLANK,
            ],
        }]);
        assert_eq!(
            names(&batch),
            vec!["cursor_goto", "highlight_set", "put", "eol_clear"]
        );
    }

    #[test]
    fn test_colors_without_rgb_are_unset() {
        let mut encoder = EventEncoder::new(true, false);
        let batch = encoder.encode(&[ScreenEvent::DefaultColors(DefaultColors {
            fg: 0xffffff,
            bg: 0x000000,
            sp: 0xff0000,
        })]);
        let call = batch[0].as_array().unwrap()[1].as_array().unwrap().to_vec();
        assert!(call.iter().all(|v| *v == Value::from(UNSET_COLOR)));
    }

    #[test]
    fn test_color_change_apply() {
        let mut colors = DefaultColors::default();
        colors.apply(&ColorChange {
            fg: Some(0x00ff00),
            ..Default::default()
        });
        colors.apply(&ColorChange {
            bg: Some(0x101010),
            ..Default::default()
        });
        assert_eq!(
            colors,
            DefaultColors {
                fg: 0x00ff00,
                bg: 0x101010,
                sp: UNSET_COLOR,
            }
        );
    }
}
