//! vtcore - a headless terminal emulation engine
//!
//! vtcore turns a raw byte stream from a child process into a queryable
//! screen state: a grid of styled cells, a scrollback log, match
//! highlighting, and text extraction. It renders nothing and owns no
//! PTY; embedders feed bytes in and react to events.
//!
//! # Architecture
//!
//! - **Decoding**: a capability table ([`caps`]) describes the escape
//!   sequences of an emulation profile as a prefix trie; the streaming
//!   [`decoder`] walks it byte by byte and emits [`action::Action`]s.
//!   Chunk boundaries may fall anywhere, including inside sequences and
//!   multi-byte characters.
//! - **State**: [`screen::Screen`] applies actions deterministically to
//!   the grid, pen, modes, and the alternate buffer, spilling scrolled
//!   rows into an offset-addressed [`scrollback`] stream.
//! - **Queries**: [`matcher`] tags regex matches on logical lines,
//!   [`extract`] pulls text with per-byte attributes.
//! - **Facade**: [`terminal::Terminal`] ties it all together.
//!
//! # Quick Start
//!
//! ```
//! use vtcore::{Terminal, TerminalEvent};
//!
//! let mut term = Terminal::new(80, 24);
//! term.feed(b"hello \x1b[1mworld\x1b[0m\r\n");
//! for event in term.take_events() {
//!     if let TerminalEvent::ContentsChanged(_) = event {
//!         let text = term.get_text(|_, _| true, false).text;
//!         assert!(text.starts_with("hello world"));
//!     }
//! }
//! ```

pub mod action;
pub mod caps;
pub mod cell;
pub mod config;
pub mod decoder;
pub mod extract;
pub mod matcher;
pub mod screen;
pub mod scrollback;
pub mod terminal;

pub use action::Action;
pub use caps::{CapabilityTable, EmulationError};
pub use cell::{Cell, Color, Pen, Row, StyleFlags};
pub use config::{ConfigError, TerminalConfig};
pub use decoder::SequenceDecoder;
pub use extract::{Attribute, ExtractedText, WordChars};
pub use matcher::{MatchEngine, MatchError, Tag};
pub use screen::{Cursor, Damage, Screen};
pub use scrollback::{MemoryStream, ScrollbackStream, StreamError};
pub use terminal::{Terminal, TerminalEvent};
