//! Cell, row, and pen types for the screen grid.

use bitflags::bitflags;

/// Color definition
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Color {
    #[default]
    Default,
    Indexed(u8),
    Rgb(u8, u8, u8),
}

/// Which color slot of the pen a set-color action targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColorSlot {
    Foreground,
    Background,
}

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct StyleFlags: u16 {
        const BOLD        = 0b0000_0000_0001;
        const UNDERLINE   = 0b0000_0000_0010;
        const BLINK       = 0b0000_0000_0100;
        const INVERSE     = 0b0000_0000_1000;
        const INVISIBLE   = 0b0000_0001_0000;
        const ALT_CHARSET = 0b0000_0010_0000;
        const SELECTED    = 0b0000_0100_0000;
    }
}

/// The attribute state applied to newly printed cells.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Pen {
    pub fg: Color,
    pub bg: Color,
    pub flags: StyleFlags,
}

impl Pen {
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// A single cell
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Cell {
    /// Displayed codepoint. `' '` for blank cells.
    pub ch: char,
    /// Display width: 1 normal, 2 wide, 0 for the continuation half of a
    /// wide character.
    pub width: u8,
    pub pen: Pen,
}

impl Default for Cell {
    fn default() -> Self {
        Self {
            ch: ' ',
            width: 1,
            pen: Pen::default(),
        }
    }
}

impl Cell {
    pub fn new(ch: char, width: u8, pen: Pen) -> Self {
        Self { ch, width, pen }
    }

    /// Blank the cell, keeping the given pen's colors.
    pub fn clear(&mut self, pen: &Pen) {
        self.ch = ' ';
        self.width = 1;
        self.pen = pen.clone();
    }

    /// The right half of a wide character.
    pub fn continuation(pen: &Pen) -> Self {
        Self {
            ch: ' ',
            width: 0,
            pen: pen.clone(),
        }
    }

    pub fn is_continuation(&self) -> bool {
        self.width == 0
    }

    pub fn is_blank(&self) -> bool {
        self.ch == ' ' && !self.is_continuation()
    }
}

/// A single row
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Row {
    pub cells: Vec<Cell>,
    /// True when the row continues onto the next one because the right
    /// margin was crossed, as opposed to an explicit line break.
    pub wrapped: bool,
}

impl Row {
    pub fn new(cols: u16) -> Self {
        Self {
            cells: vec![Cell::default(); cols as usize],
            wrapped: false,
        }
    }

    pub fn resize(&mut self, new_cols: u16) {
        self.cells.resize(new_cols as usize, Cell::default());
    }

    pub fn clear(&mut self, pen: &Pen) {
        for cell in &mut self.cells {
            cell.clear(pen);
        }
        self.wrapped = false;
    }

    /// Index of the last cell holding content, if any.
    pub fn last_used(&self) -> Option<usize> {
        self.cells.iter().rposition(|c| !c.is_blank() || c.is_continuation())
    }

    /// Row content as plain text, continuation cells skipped.
    pub fn text(&self) -> String {
        self.cells
            .iter()
            .filter(|c| !c.is_continuation())
            .map(|c| c.ch)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn continuation_has_zero_width() {
        let cell = Cell::continuation(&Pen::default());
        assert!(cell.is_continuation());
        assert!(!Cell::default().is_continuation());
    }

    #[test]
    fn clear_keeps_pen_colors() {
        let pen = Pen {
            bg: Color::Indexed(4),
            ..Pen::default()
        };
        let mut cell = Cell::new('x', 1, Pen::default());
        cell.clear(&pen);
        assert_eq!(cell.ch, ' ');
        assert_eq!(cell.pen.bg, Color::Indexed(4));
    }

    #[test]
    fn row_text_skips_continuations() {
        let mut row = Row::new(4);
        row.cells[0] = Cell::new('漢', 2, Pen::default());
        row.cells[1] = Cell::continuation(&Pen::default());
        row.cells[2] = Cell::new('a', 1, Pen::default());
        assert_eq!(row.text(), "漢a ");
    }

    #[test]
    fn last_used_ignores_trailing_blanks() {
        let mut row = Row::new(5);
        row.cells[2] = Cell::new('x', 1, Pen::default());
        assert_eq!(row.last_used(), Some(2));
        assert_eq!(Row::new(3).last_used(), None);
    }
}
