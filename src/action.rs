//! Actions: the ordered command stream the decoder emits and the screen
//! applies.

use crate::cell::{Color, ColorSlot, StyleFlags};

/// Cursor motion, relative or absolute. Parameters are 0-indexed grid
/// coordinates; the screen clamps everything to the grid.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Motion {
    Up(u16),
    Down(u16),
    Left(u16),
    Right(u16),
    /// Absolute position.
    To { row: u16, col: u16 },
    Column(u16),
    Row(u16),
    CarriageReturn,
    /// Down one row, scrolling at the bottom margin.
    LineFeed,
    /// Up one row, scrolling at the top margin.
    ReverseIndex,
    /// Carriage return plus line feed.
    NextLine,
    Tab,
    Backspace,
}

/// Erase extents for display and line erases.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EraseExtent {
    /// From the cursor to the end.
    Below,
    /// From the start to the cursor.
    Above,
    /// Everything.
    All,
}

/// Terminal modes the screen tracks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    AutoWrap,
    Insert,
    Origin,
    ApplicationCursor,
    CursorVisible,
    AlternateScreen,
    /// Alternate screen plus cursor save/restore (xterm 1049).
    AlternateScreenSaveCursor,
    BracketedPaste,
    LinefeedNewline,
}

/// Which OSC text parameter was set.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TitleKind {
    /// Icon name and window title together.
    IconAndWindow,
    Icon,
    Window,
}

/// One decoded command.
#[derive(Clone, Debug, PartialEq)]
pub enum Action {
    Print(char),
    MoveCursor(Motion),
    SetAttribute(StyleFlags, bool),
    SetColor(ColorSlot, Color),
    /// SGR 0: pen back to defaults.
    ResetPen,
    SetScrollRegion { top: u16, bottom: u16 },
    SetMode(Mode, bool),
    EraseInDisplay(EraseExtent),
    EraseInLine(EraseExtent),
    InsertLines(u16),
    DeleteLines(u16),
    InsertChars(u16),
    DeleteChars(u16),
    EraseChars(u16),
    ScrollUp(u16),
    ScrollDown(u16),
    SaveCursor,
    RestoreCursor,
    SetTitle(TitleKind, String),
    Bell,
    /// Host window resize request (columns, rows).
    ResizeRequest { cols: u16, rows: u16 },
    Reset { full: bool },
}
