//! Tagged match expressions evaluated lazily against row text.
//!
//! Patterns are compiled once at registration and assigned integer tags in
//! order; tag values are never reused while the set is alive. Nothing is
//! pre-indexed: a check materializes the text of the one logical line that
//! contains the queried cell and scans the active patterns in registration
//! order.

use regex::Regex;
use thiserror::Error;

use crate::cell::Row;

#[derive(Error, Debug)]
pub enum MatchError {
    #[error("invalid match pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Identifier handed out by [`MatchEngine::add`].
pub type Tag = u32;

struct PatternEntry {
    tag: Tag,
    regex: Regex,
}

/// The text of one logical line plus a per-visual-column byte map.
///
/// Wrapped continuation rows are joined without separators, so a match can
/// cross a soft wrap. Continuation cells of wide characters map to the same
/// byte span as their character.
pub struct LineBuffer {
    text: String,
    /// Byte range in `text` for each visual column.
    spans: Vec<(usize, usize)>,
}

impl LineBuffer {
    /// Build from the rows of one logical line, in order. Trailing blanks
    /// of the final row are not part of the text.
    pub fn from_rows(rows: &[Row]) -> Self {
        let mut text = String::new();
        let mut spans = Vec::new();
        for (idx, row) in rows.iter().enumerate() {
            let last = idx == rows.len() - 1;
            let used = if row.wrapped || !last {
                row.cells.len()
            } else {
                row.last_used().map_or(0, |i| i + 1)
            };
            for cell in &row.cells[..used] {
                if cell.is_continuation() {
                    let span = spans.last().copied().unwrap_or((0, 0));
                    spans.push(span);
                } else {
                    let start = text.len();
                    text.push(cell.ch);
                    spans.push((start, text.len()));
                }
            }
        }
        Self { text, spans }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Byte span of a visual column, if the column holds content.
    pub fn span(&self, col: usize) -> Option<(usize, usize)> {
        self.spans.get(col).copied()
    }
}

/// Ordered set of compiled match expressions.
#[derive(Default)]
pub struct MatchEngine {
    patterns: Vec<PatternEntry>,
    next_tag: Tag,
}

impl MatchEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile and register a pattern. On compile failure no tag is
    /// allocated and existing patterns are untouched.
    pub fn add(&mut self, pattern: &str) -> Result<Tag, MatchError> {
        let regex = Regex::new(pattern)?;
        let tag = self.next_tag;
        self.next_tag += 1;
        self.patterns.push(PatternEntry { tag, regex });
        Ok(tag)
    }

    /// Drop every registered pattern. Tag values are not reused afterwards.
    pub fn clear_all(&mut self) {
        self.patterns.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// Find the first registered pattern with a match covering the given
    /// visual column of `line`, returning the matched substring and tag.
    pub fn check(&self, line: &LineBuffer, col: usize) -> Option<(String, Tag)> {
        let (start, end) = line.span(col)?;
        if start == end {
            return None;
        }
        for entry in &self.patterns {
            // Covering means m.start() <= start && m.end() >= end; matches
            // come back left to right, so one past `start` ends the search.
            for m in entry.regex.find_iter(line.text()) {
                if m.start() > start {
                    break;
                }
                if m.end() >= end {
                    return Some((m.as_str().to_string(), entry.tag));
                }
            }
        }
        None
    }
}
