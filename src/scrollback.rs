//! Scrollback history: append-only, offset-addressed row storage.
//!
//! Rows evicted from the visible grid are encoded and appended to a
//! [`ScrollbackStream`]. The stream hands back the starting byte offset of
//! each write; the screen keeps those offsets and reads rows back on demand.
//! Offsets are monotonically increasing until a `reset` re-anchors the
//! readable base. Reading any range touching discarded bytes is an explicit
//! error, never silently stale data.
//!
//! Storage is organized into pages so that capacity-driven eviction can free
//! whole segments at once. The in-memory backend here is the only one
//! shipped; a persistent segment log implements the same trait.

use std::collections::VecDeque;

use thiserror::Error;

use crate::cell::{Cell, Color, Pen, Row, StyleFlags};

#[derive(Error, Debug)]
pub enum StreamError {
    #[error("history at offset {offset} ({len} bytes) was discarded")]
    Discarded { offset: u64, len: usize },

    #[error("read past end of history at offset {offset} ({len} bytes)")]
    PastEnd { offset: u64, len: usize },

    #[error("corrupt history record")]
    Corrupt,
}

/// Backend interface for scrollback storage.
pub trait ScrollbackStream {
    /// Re-anchor the readable base at `offset`. Content at offsets below the
    /// new base is discarded; if `offset` is at or past the head, everything
    /// is discarded and appends continue from `offset`.
    fn reset(&mut self, offset: u64);

    /// Append bytes, returning the starting offset of this write.
    fn append(&mut self, data: &[u8]) -> u64;

    /// Read exactly `buf.len()` bytes starting at `offset`. Fails if any
    /// part of the range was discarded or never written.
    fn read(&self, offset: u64, buf: &mut [u8]) -> Result<(), StreamError>;

    /// Drop all bytes at and after `offset`; earlier offsets stay readable.
    /// Appends continue from `offset`.
    fn truncate(&mut self, offset: u64);

    /// Hint that the next append should start a new physical page.
    fn new_page(&mut self);
}

struct Page {
    start: u64,
    data: Vec<u8>,
}

impl Page {
    fn end(&self) -> u64 {
        self.start + self.data.len() as u64
    }
}

/// In-memory paged scrollback backend.
pub struct MemoryStream {
    pages: VecDeque<Page>,
    /// Lowest readable offset.
    base: u64,
    /// Next append offset.
    head: u64,
    open_new_page: bool,
}

impl MemoryStream {
    pub fn new() -> Self {
        Self {
            pages: VecDeque::new(),
            base: 0,
            head: 0,
            open_new_page: true,
        }
    }

    /// Lowest offset a read may start at.
    pub fn base(&self) -> u64 {
        self.base
    }

    /// Offset the next append will return.
    pub fn head(&self) -> u64 {
        self.head
    }

    /// Drop pages that lie entirely below the readable base.
    fn drop_dead_pages(&mut self) {
        while let Some(page) = self.pages.front() {
            if page.end() <= self.base {
                self.pages.pop_front();
            } else {
                break;
            }
        }
    }
}

impl Default for MemoryStream {
    fn default() -> Self {
        Self::new()
    }
}

impl ScrollbackStream for MemoryStream {
    fn reset(&mut self, offset: u64) {
        if offset >= self.head || offset < self.base {
            // Full clear; appends restart at the given offset.
            self.pages.clear();
            self.base = offset;
            self.head = offset;
            self.open_new_page = true;
        } else {
            self.base = offset;
            self.drop_dead_pages();
        }
    }

    fn append(&mut self, data: &[u8]) -> u64 {
        let offset = self.head;
        if self.open_new_page || self.pages.is_empty() {
            self.pages.push_back(Page {
                start: offset,
                data: Vec::new(),
            });
            self.open_new_page = false;
        }
        let page = self.pages.back_mut().expect("page just ensured");
        page.data.extend_from_slice(data);
        self.head += data.len() as u64;
        offset
    }

    fn read(&self, offset: u64, buf: &mut [u8]) -> Result<(), StreamError> {
        let len = buf.len();
        if offset < self.base {
            return Err(StreamError::Discarded { offset, len });
        }
        if offset + len as u64 > self.head {
            return Err(StreamError::PastEnd { offset, len });
        }

        let mut pos = offset;
        let mut filled = 0usize;
        for page in &self.pages {
            if filled == len {
                break;
            }
            if page.end() <= pos {
                continue;
            }
            let in_page = (pos - page.start) as usize;
            let take = (len - filled).min(page.data.len() - in_page);
            buf[filled..filled + take].copy_from_slice(&page.data[in_page..in_page + take]);
            filled += take;
            pos += take as u64;
        }

        if filled == len {
            Ok(())
        } else {
            // A gap inside the page chain; treat as discarded.
            Err(StreamError::Discarded { offset: pos, len: len - filled })
        }
    }

    fn truncate(&mut self, offset: u64) {
        if offset >= self.head {
            return;
        }
        let offset = offset.max(self.base);
        while let Some(page) = self.pages.back_mut() {
            if page.start >= offset {
                self.pages.pop_back();
            } else {
                let keep = (offset - page.start) as usize;
                page.data.truncate(keep);
                break;
            }
        }
        self.head = offset;
        self.open_new_page = true;
    }

    fn new_page(&mut self) {
        self.open_new_page = true;
    }
}

// --- Row codec -------------------------------------------------------------
//
// Fixed-layout encoding, private to the stream boundary. Not stable across
// versions. Layout: u16 cell count, u8 wrapped, then 15 bytes per cell
// (u32 codepoint, u8 width, u16 style bits, 4 bytes per color).

const CELL_BYTES: usize = 15;
const ROW_HEADER: usize = 3;

fn put_color(out: &mut Vec<u8>, color: Color) {
    match color {
        Color::Default => out.extend_from_slice(&[0, 0, 0, 0]),
        Color::Indexed(n) => out.extend_from_slice(&[1, n, 0, 0]),
        Color::Rgb(r, g, b) => out.extend_from_slice(&[2, r, g, b]),
    }
}

fn get_color(bytes: &[u8]) -> Result<Color, StreamError> {
    match bytes[0] {
        0 => Ok(Color::Default),
        1 => Ok(Color::Indexed(bytes[1])),
        2 => Ok(Color::Rgb(bytes[1], bytes[2], bytes[3])),
        _ => Err(StreamError::Corrupt),
    }
}

/// Size in bytes of `row` once encoded.
pub fn encoded_len(row: &Row) -> usize {
    ROW_HEADER + row.cells.len() * CELL_BYTES
}

pub fn encode_row(row: &Row) -> Vec<u8> {
    let mut out = Vec::with_capacity(encoded_len(row));
    out.extend_from_slice(&(row.cells.len() as u16).to_le_bytes());
    out.push(row.wrapped as u8);
    for cell in &row.cells {
        out.extend_from_slice(&(cell.ch as u32).to_le_bytes());
        out.push(cell.width);
        out.extend_from_slice(&cell.pen.flags.bits().to_le_bytes());
        put_color(&mut out, cell.pen.fg);
        put_color(&mut out, cell.pen.bg);
    }
    out
}

pub fn decode_row(bytes: &[u8]) -> Result<Row, StreamError> {
    if bytes.len() < ROW_HEADER {
        return Err(StreamError::Corrupt);
    }
    let count = u16::from_le_bytes([bytes[0], bytes[1]]) as usize;
    let wrapped = bytes[2] != 0;
    if bytes.len() != ROW_HEADER + count * CELL_BYTES {
        return Err(StreamError::Corrupt);
    }

    let mut cells = Vec::with_capacity(count);
    for i in 0..count {
        let at = ROW_HEADER + i * CELL_BYTES;
        let code = u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]);
        let ch = char::from_u32(code).ok_or(StreamError::Corrupt)?;
        let width = bytes[at + 4];
        let bits = u16::from_le_bytes([bytes[at + 5], bytes[at + 6]]);
        let flags = StyleFlags::from_bits_truncate(bits);
        let fg = get_color(&bytes[at + 7..at + 11])?;
        let bg = get_color(&bytes[at + 11..at + 15])?;
        cells.push(Cell::new(ch, width, Pen { fg, bg, flags }));
    }
    Ok(Row { cells, wrapped })
}
