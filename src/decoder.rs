//! Streaming VT sequence decoder.
//!
//! Consumes raw byte chunks of any size and emits an ordered [`Action`]
//! stream. Sequences may be split at arbitrary chunk boundaries: partial
//! escape-sequence and partial character state is retained between calls.
//!
//! Bytes outside an active sequence go through a pluggable byte-to-codepoint
//! decoder (UTF-8 by default; invalid input becomes U+FFFD). A byte that can
//! begin a registered sequence switches the decoder into accumulation mode,
//! where every byte is answered by the capability table with matched, still
//! extending, or dead end. Dead ends discard the accumulated bytes, emit
//! nothing, and resume text mode; the decoder never fails.

use tracing::debug;

use crate::action::{Action, EraseExtent, Mode, Motion, TitleKind};
use crate::caps::{Cap, CapabilityTable, EdgeKind, Step, WalkState};
use crate::cell::{Color, ColorSlot, StyleFlags};

/// Byte-to-codepoint decoder for text outside control sequences.
pub trait CharsetDecoder {
    /// Feed one byte; any completed codepoints are pushed to `out`.
    /// Invalid input yields U+FFFD, never an error.
    fn push(&mut self, byte: u8, out: &mut Vec<char>);

    /// Give up on any partially accumulated character, emitting U+FFFD
    /// if one was pending.
    fn flush(&mut self, out: &mut Vec<char>);
}

/// Streaming UTF-8 decoder.
#[derive(Default)]
pub struct Utf8Decoder {
    buf: [u8; 4],
    len: usize,
    need: usize,
}

impl Utf8Decoder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CharsetDecoder for Utf8Decoder {
    fn push(&mut self, byte: u8, out: &mut Vec<char>) {
        if self.need == 0 {
            match byte {
                0x00..=0x7f => out.push(byte as char),
                0xc2..=0xdf => {
                    self.buf[0] = byte;
                    self.len = 1;
                    self.need = 2;
                }
                0xe0..=0xef => {
                    self.buf[0] = byte;
                    self.len = 1;
                    self.need = 3;
                }
                0xf0..=0xf4 => {
                    self.buf[0] = byte;
                    self.len = 1;
                    self.need = 4;
                }
                _ => out.push(char::REPLACEMENT_CHARACTER),
            }
            return;
        }

        if (0x80..=0xbf).contains(&byte) {
            self.buf[self.len] = byte;
            self.len += 1;
            if self.len == self.need {
                match std::str::from_utf8(&self.buf[..self.len]) {
                    Ok(s) => out.extend(s.chars()),
                    Err(_) => out.push(char::REPLACEMENT_CHARACTER),
                }
                self.len = 0;
                self.need = 0;
            }
        } else {
            // Sequence cut short; the new byte starts over.
            self.len = 0;
            self.need = 0;
            out.push(char::REPLACEMENT_CHARACTER);
            self.push(byte, out);
        }
    }

    fn flush(&mut self, out: &mut Vec<char>) {
        if self.need != 0 {
            self.len = 0;
            self.need = 0;
            out.push(char::REPLACEMENT_CHARACTER);
        }
    }
}

/// Sequence decoder: bytes in, actions out.
pub struct SequenceDecoder {
    table: CapabilityTable,
    charset: Box<dyn CharsetDecoder + Send>,
    /// Position in the trie while a sequence is being accumulated.
    walk: Option<WalkState>,
    params: Vec<u16>,
    current: Option<u16>,
    payload: Vec<u8>,
    seq_len: usize,
    scratch: Vec<char>,
}

impl SequenceDecoder {
    pub fn new(table: CapabilityTable) -> Self {
        Self::with_charset(table, Box::new(Utf8Decoder::new()))
    }

    pub fn with_charset(table: CapabilityTable, charset: Box<dyn CharsetDecoder + Send>) -> Self {
        Self {
            table,
            charset,
            walk: None,
            params: Vec::with_capacity(16),
            current: None,
            payload: Vec::new(),
            seq_len: 0,
            scratch: Vec::new(),
        }
    }

    /// Swap the active capability table (emulation change). Any partial
    /// sequence is discarded.
    pub fn set_table(&mut self, table: CapabilityTable) {
        self.table = table;
        self.abort_sequence();
    }

    pub fn table(&self) -> &CapabilityTable {
        &self.table
    }

    /// Decode a chunk, appending the resulting actions to `out`.
    pub fn feed(&mut self, bytes: &[u8], out: &mut Vec<Action>) {
        for &byte in bytes {
            self.feed_byte(byte, out);
        }
    }

    fn feed_byte(&mut self, byte: u8, out: &mut Vec<Action>) {
        if let Some(state) = self.walk {
            self.seq_len += 1;
            match self.table.step(state, byte) {
                Step::Matched(cap) => {
                    self.walk = None;
                    self.dispatch(cap, out);
                    self.clear_sequence();
                }
                Step::Pending(next, kind) => {
                    self.walk = Some(next);
                    match kind {
                        EdgeKind::Param => self.push_param_byte(byte),
                        EdgeKind::Payload => self.payload.push(byte),
                        EdgeKind::Literal => {}
                    }
                }
                Step::Rejected => {
                    debug!(len = self.seq_len, byte, "discarding unrecognized sequence");
                    self.abort_sequence();
                }
            }
            return;
        }

        if self.table.is_introducer(byte) {
            // A pending multi-byte character can't complete once a control
            // sequence starts.
            self.scratch.clear();
            self.charset.flush(&mut self.scratch);
            for &ch in &self.scratch {
                out.push(Action::Print(ch));
            }

            self.seq_len = 1;
            match self.table.step(self.table.root(), byte) {
                Step::Matched(cap) => {
                    self.dispatch(cap, out);
                    self.clear_sequence();
                }
                Step::Pending(next, _) => self.walk = Some(next),
                Step::Rejected => self.abort_sequence(),
            }
            return;
        }

        if byte < 0x20 || byte == 0x7f {
            // Unregistered control byte; ignore.
            return;
        }

        self.scratch.clear();
        self.charset.push(byte, &mut self.scratch);
        for &ch in &self.scratch {
            out.push(Action::Print(ch));
        }
    }

    fn push_param_byte(&mut self, byte: u8) {
        match byte {
            b'0'..=b'9' => {
                let digit = (byte - b'0') as u16;
                self.current = Some(
                    self.current
                        .unwrap_or(0)
                        .saturating_mul(10)
                        .saturating_add(digit),
                );
            }
            // Subparameter separators are treated as regular separators.
            b';' | b':' => {
                self.params.push(self.current.take().unwrap_or(0));
            }
            _ => {}
        }
    }

    fn clear_sequence(&mut self) {
        self.params.clear();
        self.current = None;
        self.payload.clear();
        self.seq_len = 0;
    }

    fn abort_sequence(&mut self) {
        self.walk = None;
        self.clear_sequence();
    }

    /// Parameter `i`, or `default` when absent or zero.
    fn arg(&self, i: usize, default: u16) -> u16 {
        let raw = if i < self.params.len() {
            self.params[i]
        } else if i == self.params.len() {
            self.current.unwrap_or(0)
        } else {
            0
        };
        if raw == 0 {
            default
        } else {
            raw
        }
    }

    fn finished_params(&mut self) -> Vec<u16> {
        let mut params = std::mem::take(&mut self.params);
        if let Some(p) = self.current.take() {
            params.push(p);
        }
        params
    }

    fn dispatch(&mut self, cap: Cap, out: &mut Vec<Action>) {
        match cap {
            Cap::Bell => out.push(Action::Bell),
            Cap::Backspace => out.push(Action::MoveCursor(Motion::Backspace)),
            Cap::Tab => out.push(Action::MoveCursor(Motion::Tab)),
            Cap::LineFeed => out.push(Action::MoveCursor(Motion::LineFeed)),
            Cap::CarriageReturn => out.push(Action::MoveCursor(Motion::CarriageReturn)),

            Cap::SaveCursor | Cap::AnsiSaveCursor => out.push(Action::SaveCursor),
            Cap::RestoreCursor | Cap::AnsiRestoreCursor => out.push(Action::RestoreCursor),
            Cap::Index => out.push(Action::MoveCursor(Motion::LineFeed)),
            Cap::NextLine => out.push(Action::MoveCursor(Motion::NextLine)),
            Cap::ReverseIndex => out.push(Action::MoveCursor(Motion::ReverseIndex)),
            Cap::FullReset => out.push(Action::Reset { full: true }),
            Cap::SoftReset => out.push(Action::Reset { full: false }),

            Cap::CursorUp => out.push(Action::MoveCursor(Motion::Up(self.arg(0, 1)))),
            Cap::CursorDown => out.push(Action::MoveCursor(Motion::Down(self.arg(0, 1)))),
            Cap::CursorForward => out.push(Action::MoveCursor(Motion::Right(self.arg(0, 1)))),
            Cap::CursorBackward => out.push(Action::MoveCursor(Motion::Left(self.arg(0, 1)))),
            Cap::CursorNextLine => {
                out.push(Action::MoveCursor(Motion::Down(self.arg(0, 1))));
                out.push(Action::MoveCursor(Motion::CarriageReturn));
            }
            Cap::CursorPrevLine => {
                out.push(Action::MoveCursor(Motion::Up(self.arg(0, 1))));
                out.push(Action::MoveCursor(Motion::CarriageReturn));
            }
            Cap::CursorColumn => {
                out.push(Action::MoveCursor(Motion::Column(self.arg(0, 1) - 1)));
            }
            Cap::CursorRow => {
                out.push(Action::MoveCursor(Motion::Row(self.arg(0, 1) - 1)));
            }
            Cap::CursorPosition => {
                let row = self.arg(0, 1) - 1;
                let col = self.arg(1, 1) - 1;
                out.push(Action::MoveCursor(Motion::To { row, col }));
            }

            Cap::EraseInDisplay => match self.extent() {
                Some(extent) => out.push(Action::EraseInDisplay(extent)),
                None => debug!("unsupported erase-in-display parameter"),
            },
            Cap::EraseInLine => match self.extent() {
                Some(extent) => out.push(Action::EraseInLine(extent)),
                None => debug!("unsupported erase-in-line parameter"),
            },

            Cap::InsertLines => out.push(Action::InsertLines(self.arg(0, 1))),
            Cap::DeleteLines => out.push(Action::DeleteLines(self.arg(0, 1))),
            Cap::InsertChars => out.push(Action::InsertChars(self.arg(0, 1))),
            Cap::DeleteChars => out.push(Action::DeleteChars(self.arg(0, 1))),
            Cap::EraseChars => out.push(Action::EraseChars(self.arg(0, 1))),
            Cap::ScrollUp => out.push(Action::ScrollUp(self.arg(0, 1))),
            Cap::ScrollDown => out.push(Action::ScrollDown(self.arg(0, 1))),

            Cap::SetScrollRegion => {
                let top = self.arg(0, 1) - 1;
                // Missing or zero bottom means the last row; the screen clamps.
                let bottom = self.arg(1, u16::MAX).saturating_sub(1);
                out.push(Action::SetScrollRegion { top, bottom });
                out.push(Action::MoveCursor(Motion::To { row: 0, col: 0 }));
            }

            Cap::SelectGraphicRendition => self.dispatch_sgr(out),

            Cap::SetMode => self.dispatch_modes(false, true, out),
            Cap::ResetMode => self.dispatch_modes(false, false, out),
            Cap::SetPrivateMode => self.dispatch_modes(true, true, out),
            Cap::ResetPrivateMode => self.dispatch_modes(true, false, out),

            Cap::WindowOps => {
                let params = self.finished_params();
                if params.first() == Some(&8) {
                    let rows = params.get(1).copied().unwrap_or(0);
                    let cols = params.get(2).copied().unwrap_or(0);
                    if rows > 0 && cols > 0 {
                        out.push(Action::ResizeRequest { cols, rows });
                    }
                } else {
                    debug!(op = ?params.first(), "ignoring window op");
                }
            }

            Cap::SetTextParam => {
                let payload = std::mem::take(&mut self.payload);
                let text = String::from_utf8_lossy(&payload);
                if let Some((code, body)) = text.split_once(';') {
                    let kind = match code {
                        "0" => Some(TitleKind::IconAndWindow),
                        "1" => Some(TitleKind::Icon),
                        "2" => Some(TitleKind::Window),
                        _ => None,
                    };
                    match kind {
                        Some(kind) => out.push(Action::SetTitle(kind, body.to_string())),
                        None => debug!(code, "ignoring OSC text parameter"),
                    }
                }
            }
        }
    }

    fn extent(&self) -> Option<EraseExtent> {
        match self.arg(0, u16::MAX) {
            u16::MAX => Some(EraseExtent::Below), // parameter absent or 0
            1 => Some(EraseExtent::Above),
            2 | 3 => Some(EraseExtent::All),
            _ => None,
        }
    }

    fn dispatch_sgr(&mut self, out: &mut Vec<Action>) {
        let params = self.finished_params();
        if params.is_empty() {
            out.push(Action::ResetPen);
            return;
        }

        let mut iter = params.iter().copied().peekable();
        while let Some(param) = iter.next() {
            match param {
                0 => out.push(Action::ResetPen),
                1 => out.push(Action::SetAttribute(StyleFlags::BOLD, true)),
                4 => out.push(Action::SetAttribute(StyleFlags::UNDERLINE, true)),
                5 => out.push(Action::SetAttribute(StyleFlags::BLINK, true)),
                7 => out.push(Action::SetAttribute(StyleFlags::INVERSE, true)),
                8 => out.push(Action::SetAttribute(StyleFlags::INVISIBLE, true)),

                22 => out.push(Action::SetAttribute(StyleFlags::BOLD, false)),
                24 => out.push(Action::SetAttribute(StyleFlags::UNDERLINE, false)),
                25 => out.push(Action::SetAttribute(StyleFlags::BLINK, false)),
                27 => out.push(Action::SetAttribute(StyleFlags::INVERSE, false)),
                28 => out.push(Action::SetAttribute(StyleFlags::INVISIBLE, false)),

                30..=37 => out.push(Action::SetColor(
                    ColorSlot::Foreground,
                    Color::Indexed((param - 30) as u8),
                )),
                38 => {
                    if let Some(color) = extended_color(&mut iter) {
                        out.push(Action::SetColor(ColorSlot::Foreground, color));
                    }
                }
                39 => out.push(Action::SetColor(ColorSlot::Foreground, Color::Default)),

                40..=47 => out.push(Action::SetColor(
                    ColorSlot::Background,
                    Color::Indexed((param - 40) as u8),
                )),
                48 => {
                    if let Some(color) = extended_color(&mut iter) {
                        out.push(Action::SetColor(ColorSlot::Background, color));
                    }
                }
                49 => out.push(Action::SetColor(ColorSlot::Background, Color::Default)),

                // Bright variants
                90..=97 => out.push(Action::SetColor(
                    ColorSlot::Foreground,
                    Color::Indexed((param - 90 + 8) as u8),
                )),
                100..=107 => out.push(Action::SetColor(
                    ColorSlot::Background,
                    Color::Indexed((param - 100 + 8) as u8),
                )),

                other => debug!(param = other, "ignoring SGR parameter"),
            }
        }
    }

    fn dispatch_modes(&mut self, private: bool, enable: bool, out: &mut Vec<Action>) {
        let params = self.finished_params();
        for param in params {
            let mode = if private {
                match param {
                    1 => Some(Mode::ApplicationCursor),
                    6 => Some(Mode::Origin),
                    7 => Some(Mode::AutoWrap),
                    25 => Some(Mode::CursorVisible),
                    47 | 1047 => Some(Mode::AlternateScreen),
                    1048 => {
                        out.push(if enable {
                            Action::SaveCursor
                        } else {
                            Action::RestoreCursor
                        });
                        continue;
                    }
                    1049 => Some(Mode::AlternateScreenSaveCursor),
                    2004 => Some(Mode::BracketedPaste),
                    _ => None,
                }
            } else {
                match param {
                    4 => Some(Mode::Insert),
                    20 => Some(Mode::LinefeedNewline),
                    _ => None,
                }
            };
            match mode {
                Some(mode) => out.push(Action::SetMode(mode, enable)),
                None => debug!(param, private, "ignoring unknown mode"),
            }
        }
    }
}

/// Extended SGR color forms: `5;n` indexed, `2;r;g;b` direct. A truncated
/// or unknown form consumes what it peeked and yields nothing.
fn extended_color(iter: &mut impl Iterator<Item = u16>) -> Option<Color> {
    match iter.next()? {
        5 => Some(Color::Indexed(iter.next()?.min(255) as u8)),
        2 => {
            let r = iter.next()?.min(255) as u8;
            let g = iter.next()?.min(255) as u8;
            let b = iter.next()?.min(255) as u8;
            Some(Color::Rgb(r, g, b))
        }
        other => {
            debug!(form = other, "ignoring unknown extended color form");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caps::profile;

    fn decoder() -> SequenceDecoder {
        SequenceDecoder::new(profile("xterm").unwrap())
    }

    fn decode(d: &mut SequenceDecoder, bytes: &[u8]) -> Vec<Action> {
        let mut out = Vec::new();
        d.feed(bytes, &mut out);
        out
    }

    fn printed(actions: &[Action]) -> String {
        actions
            .iter()
            .filter_map(|a| match a {
                Action::Print(c) => Some(*c),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn plain_text_prints() {
        let mut d = decoder();
        let actions = decode(&mut d, b"hi");
        assert_eq!(
            actions,
            vec![Action::Print('h'), Action::Print('i')]
        );
    }

    #[test]
    fn cursor_position_with_params() {
        let mut d = decoder();
        let actions = decode(&mut d, b"\x1b[5;10H");
        assert_eq!(
            actions,
            vec![Action::MoveCursor(Motion::To { row: 4, col: 9 })]
        );
    }

    #[test]
    fn sequence_split_across_chunks() {
        let mut d = decoder();
        assert!(decode(&mut d, b"\x1b[1").is_empty());
        assert!(decode(&mut d, b";3").is_empty());
        let actions = decode(&mut d, b"4m");
        assert_eq!(
            actions,
            vec![
                Action::SetAttribute(StyleFlags::BOLD, true),
                Action::SetColor(ColorSlot::Foreground, Color::Indexed(4)),
            ]
        );
    }

    #[test]
    fn utf8_split_across_chunks() {
        let mut d = decoder();
        let bytes = "漢".as_bytes();
        assert!(decode(&mut d, &bytes[..1]).is_empty());
        assert!(decode(&mut d, &bytes[1..2]).is_empty());
        assert_eq!(decode(&mut d, &bytes[2..]), vec![Action::Print('漢')]);
    }

    #[test]
    fn invalid_utf8_becomes_replacement() {
        let mut d = decoder();
        let actions = decode(&mut d, &[0xff, b'a']);
        assert_eq!(printed(&actions), "\u{fffd}a");
    }

    #[test]
    fn truncated_utf8_before_escape_becomes_replacement() {
        let mut d = decoder();
        let actions = decode(&mut d, &[0xe6, 0xbc, 0x1b, b'[', b'A']);
        assert_eq!(
            actions,
            vec![
                Action::Print('\u{fffd}'),
                Action::MoveCursor(Motion::Up(1)),
            ]
        );
    }

    #[test]
    fn unknown_sequence_discarded_silently() {
        let mut d = decoder();
        let actions = decode(&mut d, b"\x1b[99Zafter");
        assert_eq!(printed(&actions), "after");
    }

    #[test]
    fn sgr_extended_colors() {
        let mut d = decoder();
        let actions = decode(&mut d, b"\x1b[38;5;196m\x1b[48;2;1;2;3m");
        assert_eq!(
            actions,
            vec![
                Action::SetColor(ColorSlot::Foreground, Color::Indexed(196)),
                Action::SetColor(ColorSlot::Background, Color::Rgb(1, 2, 3)),
            ]
        );
    }

    #[test]
    fn sgr_extended_color_truncated() {
        let mut d = decoder();
        // Indexed form missing its index, RGB form missing a channel.
        assert!(decode(&mut d, b"\x1b[38;5m").is_empty());
        assert!(decode(&mut d, b"\x1b[48;2;1;2m").is_empty());
        // The pen still works afterwards.
        assert_eq!(
            decode(&mut d, b"\x1b[38;5;7m"),
            vec![Action::SetColor(ColorSlot::Foreground, Color::Indexed(7))]
        );
    }

    #[test]
    fn sgr_reset_forms() {
        let mut d = decoder();
        assert_eq!(decode(&mut d, b"\x1b[m"), vec![Action::ResetPen]);
        assert_eq!(decode(&mut d, b"\x1b[0m"), vec![Action::ResetPen]);
    }

    #[test]
    fn osc_title_both_terminators() {
        let mut d = decoder();
        assert_eq!(
            decode(&mut d, b"\x1b]2;my title\x07"),
            vec![Action::SetTitle(TitleKind::Window, "my title".into())]
        );
        assert_eq!(
            decode(&mut d, b"\x1b]0;other\x1b\\"),
            vec![Action::SetTitle(TitleKind::IconAndWindow, "other".into())]
        );
    }

    #[test]
    fn private_modes() {
        let mut d = decoder();
        assert_eq!(
            decode(&mut d, b"\x1b[?1049h"),
            vec![Action::SetMode(Mode::AlternateScreenSaveCursor, true)]
        );
        assert_eq!(
            decode(&mut d, b"\x1b[?7l"),
            vec![Action::SetMode(Mode::AutoWrap, false)]
        );
    }

    #[test]
    fn resize_request_window_op() {
        let mut d = decoder();
        assert_eq!(
            decode(&mut d, b"\x1b[8;30;100t"),
            vec![Action::ResizeRequest { cols: 100, rows: 30 }]
        );
    }

    #[test]
    fn control_bytes_inside_text() {
        let mut d = decoder();
        let actions = decode(&mut d, b"a\rb\nc");
        assert_eq!(
            actions,
            vec![
                Action::Print('a'),
                Action::MoveCursor(Motion::CarriageReturn),
                Action::Print('b'),
                Action::MoveCursor(Motion::LineFeed),
                Action::Print('c'),
            ]
        );
    }

    #[test]
    fn set_table_discards_partial_sequence() {
        let mut d = decoder();
        assert!(decode(&mut d, b"\x1b[12").is_empty());
        d.set_table(profile("vt102").unwrap());
        // The dangling "H" is plain text now, not a sequence tail.
        assert_eq!(decode(&mut d, b"H"), vec![Action::Print('H')]);
    }

    #[test]
    fn scroll_region_emits_home_move() {
        let mut d = decoder();
        let actions = decode(&mut d, b"\x1b[2;10r");
        assert_eq!(
            actions,
            vec![
                Action::SetScrollRegion { top: 1, bottom: 9 },
                Action::MoveCursor(Motion::To { row: 0, col: 0 }),
            ]
        );
    }
}
