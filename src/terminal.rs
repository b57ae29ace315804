//! The terminal engine facade.
//!
//! [`Terminal`] wires the sequence decoder, the screen buffer, the match
//! engine and text extraction together behind the surface an embedder
//! talks to: feed bytes in, read events and text back out. It owns no
//! I/O; child-bound bytes queue in an egress buffer the embedder drains.

use tracing::debug;

use crate::action::Action;
use crate::caps::{self, EmulationError};
use crate::cell::Row;
use crate::decoder::SequenceDecoder;
use crate::extract::{self, ExtractedText, WordChars};
use crate::matcher::{LineBuffer, MatchEngine, MatchError, Tag};
use crate::screen::{Cursor, Screen};
use crate::scrollback::{MemoryStream, ScrollbackStream, StreamError};

pub const DEFAULT_EMULATION: &str = "xterm";

/// Scrollback rows retained unless the embedder chooses otherwise.
pub const DEFAULT_SCROLLBACK_LINES: usize = 512;

/// State changes an embedder reacts to, drained via
/// [`Terminal::take_events`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TerminalEvent {
    /// Cell contents changed; the payload is the set of dirty visible
    /// rows, or `None` when everything must be redrawn.
    ContentsChanged(Option<Vec<usize>>),
    CursorMoved { row: u16, col: u16 },
    TitleChanged(String),
    Bell,
    /// The application asked for a new size. The embedder decides
    /// whether to honor it with [`Terminal::set_size`].
    ResizeRequested { cols: u16, rows: u16 },
}

pub struct Terminal {
    screen: Screen,
    decoder: SequenceDecoder,
    matcher: MatchEngine,
    word_chars: WordChars,
    emulation: String,
    events: Vec<TerminalEvent>,
    egress: Vec<u8>,
    actions: Vec<Action>,
    last_cursor: (u16, u16),
}

impl Terminal {
    pub fn new(cols: u16, rows: u16) -> Self {
        Self::with_stream(cols, rows, Box::new(MemoryStream::new()))
    }

    /// Build a terminal over a caller-supplied scrollback store.
    pub fn with_stream(
        cols: u16,
        rows: u16,
        stream: Box<dyn ScrollbackStream + Send>,
    ) -> Self {
        let table = caps::profile(DEFAULT_EMULATION)
            .unwrap_or_else(|_| caps::xterm());
        let mut screen = Screen::new(cols, rows, stream);
        screen.set_scrollback_limit(DEFAULT_SCROLLBACK_LINES);
        let last_cursor = (screen.cursor().row, screen.cursor().col);
        Self {
            screen,
            decoder: SequenceDecoder::new(table),
            matcher: MatchEngine::new(),
            word_chars: WordChars::default(),
            emulation: DEFAULT_EMULATION.to_string(),
            events: Vec::new(),
            egress: Vec::new(),
            actions: Vec::new(),
            last_cursor,
        }
    }

    /// Decode and apply a chunk of output from the child process. Chunks
    /// may split escape sequences and multi-byte characters anywhere;
    /// decoder state carries across calls.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.actions.clear();
        self.decoder.feed(bytes, &mut self.actions);
        for action in &self.actions {
            self.screen.apply(action);
        }
        self.collect_events();
    }

    /// Queue bytes for the child process (keystrokes, paste data).
    pub fn feed_child(&mut self, bytes: &[u8]) {
        if self.screen.modes().bracketed_paste {
            debug!(len = bytes.len(), "queueing child input (bracketed paste active)");
        }
        self.egress.extend_from_slice(bytes);
    }

    /// Drain the bytes queued for the child since the last call.
    pub fn take_child_output(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.egress)
    }

    pub fn take_events(&mut self) -> Vec<TerminalEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn screen(&self) -> &Screen {
        &self.screen
    }

    pub fn cursor(&self) -> &Cursor {
        self.screen.cursor()
    }

    pub fn emulation(&self) -> &str {
        &self.emulation
    }

    /// Extract visible text selected by `predicate(col, row)`, with one
    /// attribute record per output byte when `want_attributes` is set.
    pub fn get_text<F>(&self, predicate: F, want_attributes: bool) -> ExtractedText
    where
        F: FnMut(usize, usize) -> bool,
    {
        extract::get_text(&self.screen, predicate, want_attributes)
    }

    /// Extract a range of absolute rows, reaching into scrollback.
    pub fn get_text_range<F>(
        &self,
        rows: std::ops::Range<usize>,
        predicate: F,
        want_attributes: bool,
    ) -> Result<ExtractedText, StreamError>
    where
        F: FnMut(usize, usize) -> bool,
    {
        extract::get_text_range(&self.screen, rows, predicate, want_attributes)
    }

    /// Register a match pattern; returns its tag. Tags are stable for
    /// the lifetime of the pattern and never reused after
    /// [`Terminal::match_clear_all`].
    pub fn match_add(&mut self, pattern: &str) -> Result<Tag, MatchError> {
        self.matcher.add(pattern)
    }

    pub fn match_clear_all(&mut self) {
        self.matcher.clear_all();
    }

    /// Check whether any registered pattern matches at a visible cell.
    /// The logical line under the cell is materialized by joining
    /// soft-wrapped rows in both directions, so a match spanning a wrap
    /// is still found.
    pub fn match_check(&self, col: u16, row: u16) -> Option<(String, Tag)> {
        if self.matcher.is_empty() || row >= self.screen.rows() {
            return None;
        }
        let first = self.screen.history_len();
        let abs = first + row as usize;
        let (line_rows, offset) = self.logical_line(abs)?;
        let line = LineBuffer::from_rows(&line_rows);
        let col = offset * self.screen.cols() as usize + col as usize;
        self.matcher.check(&line, col)
    }

    /// Rows of the logical line containing `abs`, and the index of `abs`
    /// within them. Wrapped runs reaching into discarded history give up
    /// rather than match against a partial line.
    fn logical_line(&self, abs: usize) -> Option<(Vec<Row>, usize)> {
        let mut start = abs;
        while start > 0 {
            match self.screen.fetch_row(start - 1) {
                Ok(prev) if prev.wrapped => start -= 1,
                Ok(_) => break,
                Err(_) => return None,
            }
        }
        let mut rows = Vec::new();
        let mut cur = start;
        loop {
            let row = self.screen.fetch_row(cur).ok()?;
            let wrapped = row.wrapped;
            rows.push(row);
            cur += 1;
            if !wrapped || cur >= self.screen.total_rows() {
                break;
            }
        }
        Some((rows, abs - start))
    }

    /// Resize the grid, reflowing soft-wrapped text on the primary
    /// buffer. Zero dimensions are ignored.
    pub fn set_size(&mut self, cols: u16, rows: u16) {
        self.screen.resize(cols, rows);
        self.collect_events();
    }

    pub fn size(&self) -> (u16, u16) {
        (self.screen.cols(), self.screen.rows())
    }

    /// Cap retained scrollback. Shrinking takes effect on the next
    /// eviction; rows already retained beyond the new cap are dropped.
    pub fn set_scrollback_lines(&mut self, lines: usize) {
        self.screen.set_scrollback_limit(lines);
    }

    /// Switch the capability table. Any partially decoded sequence is
    /// discarded; screen contents are untouched.
    pub fn set_emulation(&mut self, name: &str) -> Result<(), EmulationError> {
        let table = caps::profile(name)?;
        self.decoder.set_table(table);
        self.emulation = name.to_string();
        Ok(())
    }

    pub fn set_word_chars(&mut self, spec: &str) {
        self.word_chars = WordChars::parse(spec);
    }

    /// The word under a visible cell, honoring the word-character spec.
    pub fn word_at(&self, col: u16, row: u16) -> Option<String> {
        let rows = self.screen.grid().rows();
        let row = rows.get(row as usize)?;
        let (start, end) = extract::word_extent(row, col as usize, &self.word_chars)?;
        Some(
            row.cells[start..end]
                .iter()
                .filter(|c| !c.is_continuation())
                .map(|c| c.ch)
                .collect(),
        )
    }

    /// Reset emulation state. `full` also clears the grid; `clear_history`
    /// additionally drops scrollback.
    pub fn reset(&mut self, full: bool, clear_history: bool) {
        self.screen.apply(&Action::Reset { full });
        if clear_history {
            self.screen.clear_history();
        }
        self.decoder.set_table(
            caps::profile(&self.emulation).unwrap_or_else(|_| caps::xterm()),
        );
        self.collect_events();
    }

    fn collect_events(&mut self) {
        let damage = self.screen.take_damage();
        if damage.contents {
            let (dirty, full) = self.screen.take_dirty();
            let rows = if full {
                None
            } else {
                let mut rows: Vec<usize> = dirty.into_iter().collect();
                rows.sort_unstable();
                Some(rows)
            };
            self.events.push(TerminalEvent::ContentsChanged(rows));
        }
        let cursor = (self.screen.cursor().row, self.screen.cursor().col);
        if damage.cursor || cursor != self.last_cursor {
            self.last_cursor = cursor;
            self.events.push(TerminalEvent::CursorMoved {
                row: cursor.0,
                col: cursor.1,
            });
        }
        if let Some(title) = damage.title {
            self.events.push(TerminalEvent::TitleChanged(title));
        }
        if damage.bell {
            self.events.push(TerminalEvent::Bell);
        }
        if let Some((cols, rows)) = damage.resize_request {
            self.events.push(TerminalEvent::ResizeRequested { cols, rows });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row_text(term: &Terminal, row: usize) -> String {
        term.screen().grid().rows()[row].text().trim_end().to_string()
    }

    #[test]
    fn feed_prints_and_reports_damage() {
        let mut t = Terminal::new(20, 5);
        t.feed(b"hi");
        assert_eq!(row_text(&t, 0), "hi");
        let events = t.take_events();
        assert!(events
            .iter()
            .any(|e| matches!(e, TerminalEvent::ContentsChanged(_))));
        assert!(events
            .iter()
            .any(|e| matches!(e, TerminalEvent::CursorMoved { row: 0, col: 2 })));
    }

    #[test]
    fn split_sequence_across_feeds() {
        let mut t = Terminal::new(20, 5);
        t.feed(b"\x1b[1");
        t.feed(b"mB\x1b[0mn");
        let cells = &t.screen().grid().rows()[0].cells;
        assert!(cells[0].pen.flags.contains(crate::cell::StyleFlags::BOLD));
        assert!(!cells[1].pen.flags.contains(crate::cell::StyleFlags::BOLD));
    }

    #[test]
    fn title_and_bell_events() {
        let mut t = Terminal::new(20, 5);
        t.feed(b"\x1b]0;my title\x07\x07");
        let events = t.take_events();
        assert!(events.contains(&TerminalEvent::TitleChanged("my title".into())));
        assert!(events.contains(&TerminalEvent::Bell));
    }

    #[test]
    fn child_output_round_trip() {
        let mut t = Terminal::new(20, 5);
        t.feed_child(b"ls -l\r");
        t.feed_child(b"\x03");
        assert_eq!(t.take_child_output(), b"ls -l\r\x03");
        assert!(t.take_child_output().is_empty());
    }

    #[test]
    fn match_spans_wrapped_rows() {
        let mut t = Terminal::new(10, 4);
        t.match_add(r"https?://[^\s]+").unwrap();
        t.feed(b"x https://example.com y");
        // "https://example.com" wraps across rows 0 and 1.
        let (text, _) = t.match_check(4, 0).expect("match on first row");
        assert_eq!(text, "https://example.com");
        let (text, _) = t.match_check(2, 1).expect("match on wrapped row");
        assert_eq!(text, "https://example.com");
        assert!(t.match_check(0, 0).is_none());
    }

    #[test]
    fn set_emulation_rejects_unknown() {
        let mut t = Terminal::new(20, 5);
        assert!(t.set_emulation("vt102").is_ok());
        assert_eq!(t.emulation(), "vt102");
        assert!(t.set_emulation("nope").is_err());
        assert_eq!(t.emulation(), "vt102");
    }

    #[test]
    fn set_emulation_discards_partial_sequence() {
        let mut t = Terminal::new(20, 5);
        t.feed(b"\x1b[3");
        t.set_emulation("xterm").unwrap();
        t.feed(b"echo");
        assert_eq!(row_text(&t, 0), "echo");
    }

    #[test]
    fn word_at_uses_word_chars() {
        let mut t = Terminal::new(40, 5);
        t.feed(b"path/to/file.rs next");
        assert_eq!(t.word_at(6, 0).as_deref(), Some("to"));
        t.set_word_chars("-A-Za-z0-9_./");
        assert_eq!(t.word_at(6, 0).as_deref(), Some("path/to/file.rs"));
        assert!(t.word_at(15, 0).is_none());
    }

    #[test]
    fn reset_clears_history_when_asked() {
        let mut t = Terminal::new(10, 3);
        t.set_scrollback_lines(50);
        for i in 0..10 {
            t.feed(format!("line{i}\r\n").as_bytes());
        }
        assert!(t.screen().history_len() > 0);
        t.reset(true, false);
        assert!(t.screen().history_len() > 0);
        t.reset(true, true);
        assert_eq!(t.screen().history_len(), 0);
    }

    #[test]
    fn resize_request_surfaces_as_event() {
        let mut t = Terminal::new(80, 24);
        t.feed(b"\x1b[8;40;100t");
        let events = t.take_events();
        assert!(events.contains(&TerminalEvent::ResizeRequested { cols: 100, rows: 40 }));
        // The grid itself is untouched until the embedder acts.
        assert_eq!(t.size(), (80, 24));
    }
}
