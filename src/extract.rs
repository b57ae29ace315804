//! Text extraction: predicate-selected cell contents with per-byte
//! attribute metadata, and word-boundary support.
//!
//! Extraction walks rows cell by cell. Every byte of output text gets
//! exactly one attribute record, so the two stay index-aligned; a
//! multi-byte character replicates its single cell's attributes across all
//! of its bytes. Soft-wrapped rows join with no separator, hard breaks
//! become `\n`.

use crate::cell::{Color, Row, StyleFlags};
use crate::scrollback::StreamError;
use crate::screen::Screen;

/// Attributes of one output byte.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attribute {
    /// Absolute row the byte came from.
    pub row: usize,
    /// Visual column the byte came from.
    pub col: usize,
    pub fg: Color,
    pub bg: Color,
    pub flags: StyleFlags,
}

/// Result of an extraction: text plus, when requested, one attribute
/// record per byte of that text.
#[derive(Debug, Default)]
pub struct ExtractedText {
    pub text: String,
    pub attributes: Vec<Attribute>,
}

/// Extract text from the visible grid. `predicate(col, row)` decides cell
/// inclusion; `row` here is the absolute buffer row of the visible line.
pub fn get_text<F>(
    screen: &Screen,
    mut predicate: F,
    want_attributes: bool,
) -> ExtractedText
where
    F: FnMut(usize, usize) -> bool,
{
    let first = screen.history_len();
    let mut out = ExtractedText::default();
    for (idx, row) in screen.grid().rows().iter().enumerate() {
        extract_row(row, first + idx, &mut predicate, want_attributes, &mut out);
    }
    trim_trailing(&mut out);
    out
}

/// Extract text from a range of absolute rows, which may span scrollback
/// and the visible grid. Fails if a scrollback row was discarded.
pub fn get_text_range<F>(
    screen: &Screen,
    rows: std::ops::Range<usize>,
    mut predicate: F,
    want_attributes: bool,
) -> Result<ExtractedText, StreamError>
where
    F: FnMut(usize, usize) -> bool,
{
    let mut out = ExtractedText::default();
    let end = rows.end.min(screen.total_rows());
    for abs in rows.start..end {
        let row = screen.fetch_row(abs)?;
        extract_row(&row, abs, &mut predicate, want_attributes, &mut out);
    }
    trim_trailing(&mut out);
    Ok(out)
}

fn extract_row<F>(
    row: &Row,
    abs: usize,
    predicate: &mut F,
    want_attributes: bool,
    out: &mut ExtractedText,
) where
    F: FnMut(usize, usize) -> bool,
{
    // Trailing blanks on hard-broken rows are padding, not content.
    let used = if row.wrapped {
        row.cells.len()
    } else {
        row.last_used().map_or(0, |i| i + 1)
    };

    let mut last_included: Option<&crate::cell::Cell> = None;
    for (col, cell) in row.cells[..used].iter().enumerate() {
        if cell.is_continuation() || !predicate(col, abs) {
            continue;
        }
        let start = out.text.len();
        out.text.push(cell.ch);
        if want_attributes {
            for _ in start..out.text.len() {
                out.attributes.push(Attribute {
                    row: abs,
                    col,
                    fg: cell.pen.fg,
                    bg: cell.pen.bg,
                    flags: cell.pen.flags,
                });
            }
        }
        last_included = Some(cell);
    }

    if !row.wrapped {
        out.text.push('\n');
        if want_attributes {
            let (fg, bg, flags) = match last_included {
                Some(cell) => (cell.pen.fg, cell.pen.bg, cell.pen.flags),
                None => (Color::Default, Color::Default, StyleFlags::empty()),
            };
            out.attributes.push(Attribute {
                row: abs,
                col: used,
                fg,
                bg,
                flags,
            });
        }
    }
}

fn trim_trailing(out: &mut ExtractedText) {
    while out.text.ends_with('\n') {
        out.text.pop();
        out.attributes.pop();
    }
}

/// Characters considered part of a word, beyond alphanumerics.
///
/// The spec string is a list of literal characters and `a-z` style ranges,
/// e.g. `"-A-Za-z0-9,./?%&#"`.
#[derive(Clone, Debug, Default)]
pub struct WordChars {
    singles: Vec<char>,
    ranges: Vec<(char, char)>,
}

impl WordChars {
    pub fn parse(spec: &str) -> Self {
        let mut singles = Vec::new();
        let mut ranges = Vec::new();
        let chars: Vec<char> = spec.chars().collect();
        let mut i = 0;
        while i < chars.len() {
            if i + 2 < chars.len() && chars[i + 1] == '-' {
                ranges.push((chars[i], chars[i + 2]));
                i += 3;
            } else {
                singles.push(chars[i]);
                i += 1;
            }
        }
        Self { singles, ranges }
    }

    pub fn is_word_char(&self, ch: char) -> bool {
        ch.is_alphanumeric()
            || self.singles.contains(&ch)
            || self.ranges.iter().any(|&(lo, hi)| ch >= lo && ch <= hi)
    }
}

/// The contiguous run of word characters around `col` in a row, as
/// `(start, end)` columns, end exclusive.
pub fn word_extent(row: &Row, col: usize, words: &WordChars) -> Option<(usize, usize)> {
    let cell_word = |c: usize| -> bool {
        row.cells
            .get(c)
            .map(|cell| !cell.is_continuation() && words.is_word_char(cell.ch))
            .unwrap_or(false)
    };
    let hit = |c: usize| cell_word(c) || row.cells.get(c).is_some_and(|x| x.is_continuation() && c > 0 && cell_word(c - 1));
    if !hit(col) {
        return None;
    }
    let mut start = col;
    while start > 0 && hit(start - 1) {
        start -= 1;
    }
    let mut end = col + 1;
    while end < row.cells.len() && hit(end) {
        end += 1;
    }
    Some((start, end))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{Action, Motion};
    use crate::cell::ColorSlot;
    use crate::scrollback::MemoryStream;

    fn screen_with(text_rows: &[&str]) -> Screen {
        let mut s = Screen::new(20, text_rows.len().max(2) as u16, Box::new(MemoryStream::new()));
        for (i, line) in text_rows.iter().enumerate() {
            s.apply(&Action::MoveCursor(Motion::To { row: i as u16, col: 0 }));
            for ch in line.chars() {
                s.apply(&Action::Print(ch));
            }
        }
        s
    }

    #[test]
    fn round_trips_printed_text() {
        let s = screen_with(&["hello", "world"]);
        let got = get_text(&s, |_, _| true, false);
        assert_eq!(got.text, "hello\nworld");
    }

    #[test]
    fn attributes_align_with_bytes() {
        let mut s = screen_with(&[]);
        s.apply(&Action::SetColor(ColorSlot::Foreground, Color::Indexed(1)));
        for ch in "a漢b".chars() {
            s.apply(&Action::Print(ch));
        }
        let got = get_text(&s, |_, _| true, true);
        assert_eq!(got.text, "a漢b");
        assert_eq!(got.attributes.len(), got.text.len());
        // All three bytes of the wide character carry its cell's attributes.
        let wide_bytes = '漢'.len_utf8();
        for i in 1..1 + wide_bytes {
            assert_eq!(got.attributes[i].col, 1);
            assert_eq!(got.attributes[i].fg, Color::Indexed(1));
        }
        assert_eq!(got.attributes[1 + wide_bytes].col, 3);
    }

    #[test]
    fn soft_wrap_joins_without_separator() {
        let mut s = Screen::new(5, 3, Box::new(MemoryStream::new()));
        for ch in "abcdefg".chars() {
            s.apply(&Action::Print(ch));
        }
        let got = get_text(&s, |_, _| true, false);
        assert_eq!(got.text, "abcdefg");
    }

    #[test]
    fn predicate_limits_columns() {
        let s = screen_with(&["0123456789"]);
        let got = get_text(&s, |col, _| (2..5).contains(&col), false);
        assert_eq!(got.text, "234");
    }

    #[test]
    fn range_extraction_reads_history() {
        let mut s = Screen::new(10, 2, Box::new(MemoryStream::new()));
        s.set_scrollback_limit(10);
        for i in 0..4 {
            for ch in format!("row{i}").chars() {
                s.apply(&Action::Print(ch));
            }
            s.apply(&Action::MoveCursor(Motion::NextLine));
        }
        assert!(s.history_len() > 0);
        let got = get_text_range(&s, 0..s.total_rows(), |_, _| true, false).unwrap();
        assert!(got.text.starts_with("row0\nrow1"));
    }

    #[test]
    fn word_chars_parse_ranges_and_singles() {
        let w = WordChars::parse("-A-Za-z0-9,");
        assert!(w.is_word_char('-'));
        assert!(w.is_word_char('Q'));
        assert!(w.is_word_char(','));
        assert!(!w.is_word_char(' '));
        assert!(!w.is_word_char('!'));
    }

    #[test]
    fn word_extent_stops_at_boundaries() {
        let s = screen_with(&["foo bar-baz qux"]);
        let words = WordChars::parse("-");
        let row = &s.grid().rows()[0];
        assert_eq!(word_extent(row, 5, &words), Some((4, 11)));
        assert_eq!(word_extent(row, 3, &words), None);
        assert_eq!(word_extent(row, 0, &words), Some((0, 3)));
    }
}
