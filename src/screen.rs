//! Screen buffer: the viewport grid, cursor, and pen.
//!
//! [`Screen::apply`] mutates the grid deterministically: identical action
//! streams applied from identical initial state produce byte-identical
//! grids, which is what makes replay-based reflow and testing possible.
//!
//! Rows scrolled off the top of the primary screen are encoded and appended
//! to the scrollback stream; the screen keeps an (offset, length) record per
//! retained row and evicts the oldest records (resetting the stream base)
//! when the configured limit is exceeded.

use std::collections::{HashSet, VecDeque};

use tracing::debug;
use unicode_width::UnicodeWidthChar;

use crate::action::{Action, EraseExtent, Mode, Motion, TitleKind};
use crate::cell::{Cell, ColorSlot, Pen, Row};
use crate::scrollback::{decode_row, encode_row, ScrollbackStream, StreamError};

/// Rows between `new_page` hints on the scrollback stream.
const ROWS_PER_PAGE: u32 = 64;

/// Cursor state of one grid.
#[derive(Clone, Debug, Default)]
pub struct Cursor {
    pub row: u16,
    /// May transiently equal the column count while a wrap is pending.
    pub col: u16,
    pub visible: bool,
}

#[derive(Clone, Debug)]
struct SavedCursor {
    row: u16,
    col: u16,
    pen: Pen,
}

/// One grid: rows, cursor, pen, and saved-cursor slot. The alternate buffer
/// is a second `Grid` with the same shape.
#[derive(Clone, Debug)]
pub struct Grid {
    rows: Vec<Row>,
    cursor: Cursor,
    pen: Pen,
    saved: Option<SavedCursor>,
}

impl Grid {
    fn new(cols: u16, rows: u16) -> Self {
        Self {
            rows: (0..rows).map(|_| Row::new(cols)).collect(),
            cursor: Cursor {
                visible: true,
                ..Cursor::default()
            },
            pen: Pen::default(),
            saved: None,
        }
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn cursor(&self) -> &Cursor {
        &self.cursor
    }

    pub fn pen(&self) -> &Pen {
        &self.pen
    }
}

/// Mode switches the screen tracks.
#[derive(Clone, Debug)]
pub struct Modes {
    pub auto_wrap: bool,
    pub insert: bool,
    pub origin: bool,
    pub application_cursor: bool,
    pub bracketed_paste: bool,
    pub linefeed_newline: bool,
}

impl Default for Modes {
    fn default() -> Self {
        Self {
            auto_wrap: true,
            insert: false,
            origin: false,
            application_cursor: false,
            bracketed_paste: false,
            // LF implies CR until LNM is switched off.
            linefeed_newline: true,
        }
    }
}

/// Pending state changes since the last damage drain.
#[derive(Clone, Debug, Default)]
pub struct Damage {
    pub contents: bool,
    pub cursor: bool,
    pub title: Option<String>,
    pub bell: bool,
    pub resize_request: Option<(u16, u16)>,
}

impl Damage {
    pub fn any(&self) -> bool {
        self.contents
            || self.cursor
            || self.bell
            || self.title.is_some()
            || self.resize_request.is_some()
    }
}

/// The screen buffer: primary and alternate grids, modes, title, and the
/// scrollback linkage.
pub struct Screen {
    cols: u16,
    rows: u16,
    primary: Grid,
    alternate: Grid,
    using_alternate: bool,
    /// (top, bottom), 0-indexed inclusive.
    scroll_region: (u16, u16),
    modes: Modes,
    title: String,
    stream: Box<dyn ScrollbackStream + Send>,
    /// Per-row (offset, length) records, oldest first.
    history: VecDeque<(u64, u32)>,
    scrollback_limit: usize,
    rows_since_page: u32,
    dirty_lines: HashSet<usize>,
    full_redraw: bool,
    damage: Damage,
}

impl Screen {
    pub fn new(cols: u16, rows: u16, stream: Box<dyn ScrollbackStream + Send>) -> Self {
        let cols = cols.max(1);
        let rows = rows.max(1);
        Self {
            cols,
            rows,
            primary: Grid::new(cols, rows),
            alternate: Grid::new(cols, rows),
            using_alternate: false,
            scroll_region: (0, rows - 1),
            modes: Modes::default(),
            title: String::new(),
            stream,
            history: VecDeque::new(),
            scrollback_limit: 0,
            rows_since_page: 0,
            dirty_lines: HashSet::new(),
            full_redraw: true,
            damage: Damage::default(),
        }
    }

    pub fn cols(&self) -> u16 {
        self.cols
    }

    pub fn rows(&self) -> u16 {
        self.rows
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn modes(&self) -> &Modes {
        &self.modes
    }

    pub fn scrollback_limit(&self) -> usize {
        self.scrollback_limit
    }

    pub fn set_scrollback_limit(&mut self, lines: usize) {
        self.scrollback_limit = lines;
        self.evict_history();
    }

    pub fn grid(&self) -> &Grid {
        if self.using_alternate {
            &self.alternate
        } else {
            &self.primary
        }
    }

    fn grid_mut(&mut self) -> &mut Grid {
        if self.using_alternate {
            &mut self.alternate
        } else {
            &mut self.primary
        }
    }

    pub fn cursor(&self) -> &Cursor {
        self.grid().cursor()
    }

    pub fn pen(&self) -> &Pen {
        self.grid().pen()
    }

    /// Number of rows retained in scrollback.
    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Total addressable rows: retained history plus the visible grid.
    pub fn total_rows(&self) -> usize {
        self.history.len() + self.rows as usize
    }

    /// Fetch a row by absolute index: 0 is the oldest retained history row,
    /// indices past the history are visible grid rows.
    pub fn fetch_row(&self, abs: usize) -> Result<Row, StreamError> {
        if let Some(&(offset, len)) = self.history.get(abs) {
            let mut buf = vec![0u8; len as usize];
            self.stream.read(offset, &mut buf)?;
            decode_row(&buf)
        } else {
            let idx = abs - self.history.len();
            self.grid()
                .rows
                .get(idx)
                .cloned()
                .ok_or(StreamError::PastEnd {
                    offset: abs as u64,
                    len: 1,
                })
        }
    }

    /// Stream offset of a retained history row, if still retained.
    pub fn history_offset(&self, abs: usize) -> Option<u64> {
        self.history.get(abs).map(|&(offset, _)| offset)
    }

    /// Raw stream access for direct offset reads.
    pub fn stream(&self) -> &(dyn ScrollbackStream + Send) {
        self.stream.as_ref()
    }

    /// Drop all retained history.
    pub fn clear_history(&mut self) {
        self.history.clear();
        let head = self.append_anchor();
        self.stream.reset(head);
        self.rows_since_page = 0;
    }

    fn append_anchor(&mut self) -> u64 {
        // Appending nothing returns the head offset without a trait method
        // for it.
        self.stream.append(&[])
    }

    /// Apply one decoded action. Deterministic with respect to grid content.
    pub fn apply(&mut self, action: &Action) {
        match action {
            Action::Print(ch) => self.print(*ch),
            Action::MoveCursor(motion) => self.move_cursor(*motion),
            Action::SetAttribute(flag, on) => {
                let pen = &mut self.grid_mut().pen;
                if *on {
                    pen.flags |= *flag;
                } else {
                    pen.flags &= !*flag;
                }
            }
            Action::SetColor(slot, color) => {
                let pen = &mut self.grid_mut().pen;
                match slot {
                    ColorSlot::Foreground => pen.fg = *color,
                    ColorSlot::Background => pen.bg = *color,
                }
            }
            Action::ResetPen => self.grid_mut().pen.reset(),
            Action::SetScrollRegion { top, bottom } => {
                let top = (*top).min(self.rows - 1);
                let bottom = (*bottom).min(self.rows - 1);
                if top < bottom {
                    self.scroll_region = (top, bottom);
                }
            }
            Action::SetMode(mode, on) => self.set_mode(*mode, *on),
            Action::EraseInDisplay(extent) => self.erase_in_display(*extent),
            Action::EraseInLine(extent) => self.erase_in_line(*extent),
            Action::InsertLines(n) => self.insert_lines(*n),
            Action::DeleteLines(n) => self.delete_lines(*n),
            Action::InsertChars(n) => self.insert_chars(*n),
            Action::DeleteChars(n) => self.delete_chars(*n),
            Action::EraseChars(n) => self.erase_chars(*n),
            Action::ScrollUp(n) => self.scroll_up(*n),
            Action::ScrollDown(n) => self.scroll_down(*n),
            Action::SaveCursor => self.save_cursor(),
            Action::RestoreCursor => self.restore_cursor(),
            Action::SetTitle(kind, text) => {
                if matches!(kind, TitleKind::IconAndWindow | TitleKind::Window) {
                    self.title = text.clone();
                    self.damage.title = Some(text.clone());
                }
            }
            Action::Bell => self.damage.bell = true,
            Action::ResizeRequest { cols, rows } => {
                self.damage.resize_request = Some((*cols, *rows));
            }
            Action::Reset { full } => self.reset(*full),
        }
    }

    /// Write a codepoint at the cursor using the current pen.
    fn print(&mut self, ch: char) {
        let width = match ch.width() {
            Some(w) if w > 0 => w as u16,
            // Zero-width and control codepoints do not occupy a cell.
            _ => return,
        };
        let cols = self.cols;

        // Wrap only once the character no longer fits; the cursor is allowed
        // to rest just past the right margin until then.
        if self.cursor().col + width > cols {
            if self.modes.auto_wrap {
                let row = self.cursor().row as usize;
                self.grid_mut().rows[row].wrapped = true;
                self.grid_mut().cursor.col = 0;
                self.linefeed();
            } else {
                self.grid_mut().cursor.col = cols.saturating_sub(width);
            }
        }

        let (row, col) = {
            let c = self.cursor();
            (c.row as usize, c.col as usize)
        };
        let pen = self.grid().pen.clone();
        let insert = self.modes.insert;

        self.repair_wide_overwrite(row, col);
        if width == 2 {
            self.repair_wide_overwrite(row, col + 1);
        }

        let grid = self.grid_mut();
        if insert {
            for _ in 0..width {
                grid.rows[row].cells.pop();
                grid.rows[row].cells.insert(col, Cell::default());
            }
        }
        grid.rows[row].cells[col] = Cell::new(ch, width as u8, pen.clone());
        if width == 2 && col + 1 < cols as usize {
            grid.rows[row].cells[col + 1] = Cell::continuation(&pen);
        }
        grid.cursor.col += width;

        self.mark_dirty(row);
    }

    /// Overwriting either half of a wide character blanks the other half.
    fn repair_wide_overwrite(&mut self, row: usize, col: usize) {
        let cols = self.cols as usize;
        let pen = self.grid().pen.clone();
        let grid = self.grid_mut();
        if col >= cols {
            return;
        }
        if grid.rows[row].cells[col].is_continuation() && col > 0 {
            grid.rows[row].cells[col - 1] = Cell::new(' ', 1, pen.clone());
        }
        if grid.rows[row].cells[col].width == 2 && col + 1 < cols {
            grid.rows[row].cells[col + 1] = Cell::new(' ', 1, pen);
        }
    }

    fn move_cursor(&mut self, motion: Motion) {
        let rows = self.rows;
        let cols = self.cols;
        match motion {
            Motion::Up(n) => {
                let c = &mut self.grid_mut().cursor;
                c.row = c.row.saturating_sub(n);
            }
            Motion::Down(n) => {
                let c = &mut self.grid_mut().cursor;
                c.row = (c.row + n).min(rows - 1);
            }
            Motion::Left(n) => {
                let c = &mut self.grid_mut().cursor;
                c.col = c.col.min(cols - 1).saturating_sub(n);
            }
            Motion::Right(n) => {
                let c = &mut self.grid_mut().cursor;
                c.col = (c.col + n).min(cols - 1);
            }
            Motion::To { row, col } => {
                let (top, bottom) = self.scroll_region;
                let row = if self.modes.origin {
                    (top + row).min(bottom)
                } else {
                    row.min(rows - 1)
                };
                let c = &mut self.grid_mut().cursor;
                c.row = row;
                c.col = col.min(cols - 1);
            }
            Motion::Column(col) => {
                self.grid_mut().cursor.col = col.min(cols - 1);
            }
            Motion::Row(row) => {
                let (top, bottom) = self.scroll_region;
                let row = if self.modes.origin {
                    (top + row).min(bottom)
                } else {
                    row.min(rows - 1)
                };
                self.grid_mut().cursor.row = row;
            }
            Motion::CarriageReturn => self.grid_mut().cursor.col = 0,
            Motion::LineFeed => {
                self.linefeed();
                if self.modes.linefeed_newline {
                    self.grid_mut().cursor.col = 0;
                }
            }
            Motion::ReverseIndex => self.reverse_index(),
            Motion::NextLine => {
                self.grid_mut().cursor.col = 0;
                self.linefeed();
            }
            Motion::Tab => {
                let c = &mut self.grid_mut().cursor;
                c.col = (((c.col / 8) + 1) * 8).min(cols - 1);
            }
            Motion::Backspace => {
                let c = &mut self.grid_mut().cursor;
                c.col = c.col.min(cols - 1).saturating_sub(1);
            }
        }
        self.damage.cursor = true;
    }

    fn linefeed(&mut self) {
        let bottom = self.scroll_region.1;
        let row = self.cursor().row;
        if row == bottom {
            self.scroll_up(1);
        } else if row < self.rows - 1 {
            self.grid_mut().cursor.row += 1;
        }
    }

    fn reverse_index(&mut self) {
        let top = self.scroll_region.0;
        let row = self.cursor().row;
        if row == top {
            self.scroll_down(1);
        } else {
            self.grid_mut().cursor.row = row.saturating_sub(1);
        }
    }

    /// Shift the scroll region up; rows leaving the top of the primary
    /// screen go to scrollback.
    fn scroll_up(&mut self, n: u16) {
        let (top, bottom) = self.scroll_region;
        let cols = self.cols;
        let to_history = !self.using_alternate && top == 0;

        for _ in 0..n {
            let grid = self.grid_mut();
            let evicted = grid.rows.remove(top as usize);
            grid.rows.insert(bottom as usize, Row::new(cols));
            if to_history {
                self.push_history(evicted);
            }
        }
        self.mark_all_dirty();
    }

    fn scroll_down(&mut self, n: u16) {
        let (top, bottom) = self.scroll_region;
        let cols = self.cols;
        let grid = self.grid_mut();
        for _ in 0..n {
            grid.rows.remove(bottom as usize);
            grid.rows.insert(top as usize, Row::new(cols));
        }
        self.mark_all_dirty();
    }

    fn push_history(&mut self, row: Row) {
        if self.scrollback_limit == 0 {
            return;
        }
        if self.rows_since_page >= ROWS_PER_PAGE {
            self.stream.new_page();
            self.rows_since_page = 0;
        }
        let bytes = encode_row(&row);
        let offset = self.stream.append(&bytes);
        self.history.push_back((offset, bytes.len() as u32));
        self.rows_since_page += 1;
        self.evict_history();
    }

    fn evict_history(&mut self) {
        if self.history.len() <= self.scrollback_limit {
            return;
        }
        while self.history.len() > self.scrollback_limit {
            self.history.pop_front();
        }
        match self.history.front() {
            Some(&(offset, _)) => self.stream.reset(offset),
            None => self.clear_history(),
        }
    }

    fn set_mode(&mut self, mode: Mode, on: bool) {
        match mode {
            Mode::AutoWrap => self.modes.auto_wrap = on,
            Mode::Insert => self.modes.insert = on,
            Mode::Origin => self.modes.origin = on,
            Mode::ApplicationCursor => self.modes.application_cursor = on,
            Mode::BracketedPaste => self.modes.bracketed_paste = on,
            Mode::LinefeedNewline => self.modes.linefeed_newline = on,
            Mode::CursorVisible => self.grid_mut().cursor.visible = on,
            Mode::AlternateScreen => self.switch_alternate(on, false),
            Mode::AlternateScreenSaveCursor => self.switch_alternate(on, true),
        }
    }

    /// Swap the active grid. The scrollback stream is untouched either way.
    fn switch_alternate(&mut self, on: bool, save_cursor: bool) {
        if on == self.using_alternate {
            return;
        }
        if on {
            if save_cursor {
                self.save_cursor();
            }
            self.alternate = Grid::new(self.cols, self.rows);
            self.using_alternate = true;
        } else {
            self.using_alternate = false;
            if save_cursor {
                self.restore_cursor();
            }
        }
        self.mark_all_dirty();
    }

    fn save_cursor(&mut self) {
        let grid = self.grid_mut();
        grid.saved = Some(SavedCursor {
            row: grid.cursor.row,
            col: grid.cursor.col,
            pen: grid.pen.clone(),
        });
    }

    fn restore_cursor(&mut self) {
        let grid = self.grid_mut();
        if let Some(saved) = grid.saved.clone() {
            grid.cursor.row = saved.row;
            grid.cursor.col = saved.col;
            grid.pen = saved.pen;
        }
        self.damage.cursor = true;
    }

    fn erase_in_display(&mut self, extent: EraseExtent) {
        let rows = self.rows as usize;
        let row = self.cursor().row as usize;
        let pen = self.grid().pen.clone();
        match extent {
            EraseExtent::Below => {
                self.erase_in_line(EraseExtent::Below);
                let grid = self.grid_mut();
                for r in (row + 1)..rows {
                    grid.rows[r].clear(&pen);
                }
            }
            EraseExtent::Above => {
                let grid = self.grid_mut();
                for r in 0..row {
                    grid.rows[r].clear(&pen);
                }
                self.erase_in_line(EraseExtent::Above);
            }
            EraseExtent::All => {
                let grid = self.grid_mut();
                for r in 0..rows {
                    grid.rows[r].clear(&pen);
                }
            }
        }
        self.mark_all_dirty();
    }

    fn erase_in_line(&mut self, extent: EraseExtent) {
        let cols = self.cols as usize;
        let (row, col) = {
            let c = self.cursor();
            (c.row as usize, (c.col as usize).min(cols - 1))
        };
        let pen = self.grid().pen.clone();
        let grid = self.grid_mut();
        match extent {
            EraseExtent::Below => {
                for c in col..cols {
                    grid.rows[row].cells[c].clear(&pen);
                }
                grid.rows[row].wrapped = false;
            }
            EraseExtent::Above => {
                for c in 0..=col {
                    grid.rows[row].cells[c].clear(&pen);
                }
            }
            EraseExtent::All => grid.rows[row].clear(&pen),
        }
        self.mark_dirty(row);
    }

    fn insert_lines(&mut self, n: u16) {
        let row = self.cursor().row as usize;
        let total = self.rows as usize;
        let cols = self.cols;
        let grid = self.grid_mut();
        for _ in 0..n {
            if row < grid.rows.len() {
                grid.rows.insert(row, Row::new(cols));
                if grid.rows.len() > total {
                    grid.rows.pop();
                }
            }
        }
        self.mark_all_dirty();
    }

    fn delete_lines(&mut self, n: u16) {
        let row = self.cursor().row as usize;
        let cols = self.cols;
        let grid = self.grid_mut();
        for _ in 0..n {
            if row < grid.rows.len() {
                grid.rows.remove(row);
                grid.rows.push(Row::new(cols));
            }
        }
        self.mark_all_dirty();
    }

    fn insert_chars(&mut self, n: u16) {
        let cols = self.cols as usize;
        let (row, col) = {
            let c = self.cursor();
            (c.row as usize, (c.col as usize).min(cols - 1))
        };
        let grid = self.grid_mut();
        for _ in 0..n {
            grid.rows[row].cells.pop();
            grid.rows[row].cells.insert(col, Cell::default());
        }
        self.mark_dirty(row);
    }

    fn delete_chars(&mut self, n: u16) {
        let cols = self.cols as usize;
        let (row, col) = {
            let c = self.cursor();
            (c.row as usize, (c.col as usize).min(cols - 1))
        };
        let grid = self.grid_mut();
        for _ in 0..n {
            grid.rows[row].cells.remove(col);
            grid.rows[row].cells.push(Cell::default());
        }
        self.mark_dirty(row);
    }

    fn erase_chars(&mut self, n: u16) {
        let cols = self.cols as usize;
        let (row, col) = {
            let c = self.cursor();
            (c.row as usize, (c.col as usize).min(cols - 1))
        };
        let pen = self.grid().pen.clone();
        let grid = self.grid_mut();
        for i in 0..n as usize {
            if col + i < cols {
                grid.rows[row].cells[col + i].clear(&pen);
            }
        }
        self.mark_dirty(row);
    }

    fn reset(&mut self, full: bool) {
        self.modes = Modes::default();
        self.scroll_region = (0, self.rows - 1);
        self.grid_mut().pen.reset();
        self.grid_mut().saved = None;
        if full {
            self.using_alternate = false;
            self.primary = Grid::new(self.cols, self.rows);
            self.alternate = Grid::new(self.cols, self.rows);
        }
        self.mark_all_dirty();
        self.damage.cursor = true;
    }

    /// Resize the screen, reflowing the primary grid's soft-wrapped lines
    /// into the new width. Degenerate sizes are rejected as no-ops.
    pub fn resize(&mut self, cols: u16, rows: u16) {
        if cols == 0 || rows == 0 {
            debug!(cols, rows, "rejecting degenerate resize");
            return;
        }
        if cols == self.cols && rows == self.rows {
            return;
        }

        self.reflow_primary(cols, rows);

        // Full-screen applications repaint after a resize; the alternate
        // grid is just clipped or padded.
        let alt = &mut self.alternate;
        while alt.rows.len() < rows as usize {
            alt.rows.push(Row::new(cols));
        }
        alt.rows.truncate(rows as usize);
        for row in &mut alt.rows {
            row.resize(cols);
        }
        alt.cursor.row = alt.cursor.row.min(rows - 1);
        alt.cursor.col = alt.cursor.col.min(cols - 1);

        self.cols = cols;
        self.rows = rows;
        self.scroll_region = (0, rows - 1);
        self.mark_all_dirty();
        self.damage.cursor = true;
    }

    fn reflow_primary(&mut self, cols: u16, rows: u16) {
        let old_cols = self.cols as usize;
        let old = std::mem::replace(&mut self.primary, Grid::new(cols, rows));
        let cursor = old.cursor.clone();

        // Join soft-wrapped runs into logical lines of non-continuation
        // cells, remembering the cursor as a visual offset into its line.
        let mut lines: Vec<Vec<Cell>> = Vec::new();
        let mut cursor_line = 0usize;
        let mut cursor_visual = 0usize;
        let mut joining = false;
        let mut rows_in_line = 0usize;
        for (idx, row) in old.rows.iter().enumerate() {
            if !joining {
                lines.push(Vec::new());
                rows_in_line = 0;
            }
            let line_idx = lines.len() - 1;
            let line = &mut lines[line_idx];
            if idx == cursor.row as usize {
                cursor_line = line_idx;
                cursor_visual = rows_in_line * old_cols + (cursor.col as usize).min(old_cols);
            }
            let used = if row.wrapped {
                row.cells.len()
            } else {
                row.last_used().map_or(0, |i| i + 1)
            };
            line.extend(
                row.cells[..used]
                    .iter()
                    .filter(|c| !c.is_continuation())
                    .cloned(),
            );
            joining = row.wrapped;
            rows_in_line += 1;
        }

        // Re-wrap each logical line at the new width.
        let mut new_rows: Vec<Row> = Vec::new();
        let mut cursor_pos: Option<(usize, usize)> = None;
        for (li, line) in lines.iter().enumerate() {
            let start_row = new_rows.len();
            let mut chunks: Vec<Row> = Vec::new();
            let mut current = Row::new(cols);
            let mut fill = 0usize;
            let mut visual = 0usize;
            for cell in line {
                let w = (cell.width.max(1)) as usize;
                if fill + w > cols as usize {
                    current.wrapped = true;
                    chunks.push(current);
                    current = Row::new(cols);
                    fill = 0;
                }
                if li == cursor_line && cursor_pos.is_none() && visual >= cursor_visual {
                    cursor_pos = Some((start_row + chunks.len(), fill));
                }
                current.cells[fill] = cell.clone();
                if w == 2 && fill + 1 < cols as usize {
                    current.cells[fill + 1] = Cell::continuation(&cell.pen);
                }
                fill += w;
                visual += w;
            }
            if li == cursor_line && cursor_pos.is_none() {
                cursor_pos = Some((start_row + chunks.len(), fill.min(cols as usize - 1)));
            }
            chunks.push(current);
            new_rows.extend(chunks);
        }

        // Trailing blank rows below the cursor are padding; drop them
        // before deciding what overflows.
        let keep_at_least = match cursor_pos {
            Some((row, _)) => (row + 1).max(rows as usize),
            None => rows as usize,
        };
        while new_rows.len() > keep_at_least
            && new_rows
                .last()
                .is_some_and(|r| !r.wrapped && r.last_used().is_none())
        {
            new_rows.pop();
        }

        // Overflowing top rows spill into scrollback; missing rows are
        // padded at the bottom.
        let mut spilled = 0usize;
        while new_rows.len() > rows as usize {
            let row = new_rows.remove(0);
            self.push_history(row);
            spilled += 1;
        }
        while new_rows.len() < rows as usize {
            new_rows.push(Row::new(cols));
        }

        let grid = &mut self.primary;
        grid.rows = new_rows;
        grid.pen = old.pen;
        grid.saved = None;
        grid.cursor.visible = cursor.visible;
        match cursor_pos {
            Some((row, col)) => {
                grid.cursor.row = row.saturating_sub(spilled).min(rows as usize - 1) as u16;
                grid.cursor.col = (col as u16).min(cols - 1);
            }
            None => {
                grid.cursor.row = cursor.row.min(rows - 1);
                grid.cursor.col = cursor.col.min(cols - 1);
            }
        }
    }

    fn mark_dirty(&mut self, line: usize) {
        self.dirty_lines.insert(line);
        self.damage.contents = true;
    }

    fn mark_all_dirty(&mut self) {
        self.full_redraw = true;
        self.damage.contents = true;
    }

    /// Dirty line set and full-redraw flag for renderers; cleared on drain.
    pub fn take_dirty(&mut self) -> (HashSet<usize>, bool) {
        let full = self.full_redraw;
        self.full_redraw = false;
        (std::mem::take(&mut self.dirty_lines), full)
    }

    /// Drain accumulated damage for notification delivery.
    pub fn take_damage(&mut self) -> Damage {
        std::mem::take(&mut self.damage)
    }
}
