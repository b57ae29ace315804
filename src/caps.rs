//! Capability table: per-emulation dispatch trie for control sequences.
//!
//! Each emulation profile registers the byte patterns it understands, mapping
//! them to [`Cap`] identifiers. The decoder walks the trie one byte at a time
//! and gets back one of three answers: matched, could still extend, or dead
//! end. Patterns are built from three segment kinds:
//!
//! - literal bytes,
//! - a numeric parameter run (digits, `;`, `:`), and
//! - an arbitrary string payload (OSC bodies), closed by a literal terminator.
//!
//! When a byte is accepted by more than one edge of a node, the edge that was
//! registered first wins. That makes conflict resolution a property of the
//! profile's build order rather than of any specificity rule.

use std::collections::HashMap;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EmulationError {
    #[error("Unknown emulation profile: {0}")]
    Unknown(String),
}

/// Capability identifiers: what a recognized sequence means.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Cap {
    // C0 controls
    Bell,
    Backspace,
    Tab,
    LineFeed,
    CarriageReturn,
    // Escape sequences
    SaveCursor,
    RestoreCursor,
    Index,
    NextLine,
    ReverseIndex,
    FullReset,
    // CSI sequences
    CursorUp,
    CursorDown,
    CursorForward,
    CursorBackward,
    CursorNextLine,
    CursorPrevLine,
    CursorColumn,
    CursorRow,
    CursorPosition,
    EraseInDisplay,
    EraseInLine,
    InsertLines,
    DeleteLines,
    InsertChars,
    DeleteChars,
    EraseChars,
    ScrollUp,
    ScrollDown,
    SetScrollRegion,
    SelectGraphicRendition,
    SetMode,
    ResetMode,
    SetPrivateMode,
    ResetPrivateMode,
    SoftReset,
    AnsiSaveCursor,
    AnsiRestoreCursor,
    WindowOps,
    // OSC sequences
    SetTextParam,
}

/// One segment of a pattern being registered.
#[derive(Clone, Copy, Debug)]
pub enum Seg<'a> {
    /// Exact bytes.
    Bytes(&'a [u8]),
    /// Zero or more parameter bytes (`0-9`, `;`, `:`).
    Params,
    /// Zero or more arbitrary payload bytes, ended by whatever literal
    /// segment follows.
    Payload,
}

/// What kind of edge a byte was consumed by. The decoder uses this to decide
/// where the byte goes (parameter accumulator, payload buffer, or nowhere).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EdgeKind {
    Literal,
    Param,
    Payload,
}

/// Result of feeding one byte to the trie walk.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    /// A registered sequence is complete.
    Matched(Cap),
    /// The bytes so far are a prefix of at least one registered sequence.
    Pending(WalkState, EdgeKind),
    /// No registered sequence starts with these bytes.
    Rejected,
}

/// Opaque position in the trie.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WalkState(usize);

#[derive(Clone, Copy, Debug)]
struct Edge {
    node: usize,
    order: u32,
}

#[derive(Default)]
struct Node {
    literal: HashMap<u8, Edge>,
    /// Self-loop consuming parameter bytes, with its registration order.
    param: Option<u32>,
    /// Self-loop consuming payload bytes, with its registration order.
    payload: Option<u32>,
    terminal: Option<Cap>,
}

/// Prefix trie mapping byte sequences to capabilities for one emulation.
pub struct CapabilityTable {
    name: String,
    nodes: Vec<Node>,
    next_order: u32,
}

impl CapabilityTable {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            nodes: vec![Node::default()],
            next_order: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Starting position for a fresh sequence walk.
    pub fn root(&self) -> WalkState {
        WalkState(0)
    }

    /// True if `byte` can begin a registered sequence, i.e. the decoder
    /// should leave text mode and start accumulating.
    pub fn is_introducer(&self, byte: u8) -> bool {
        self.nodes[0].literal.contains_key(&byte)
    }

    /// Register a pattern. An already-claimed terminal or edge is left
    /// untouched, so the first registration wins.
    pub fn register(&mut self, segs: &[Seg<'_>], cap: Cap) {
        let mut node = 0usize;
        for seg in segs {
            match seg {
                Seg::Bytes(bytes) => {
                    for &b in *bytes {
                        node = match self.nodes[node].literal.get(&b) {
                            Some(edge) => edge.node,
                            None => {
                                let next = self.push_node();
                                let order = self.take_order();
                                self.nodes[node].literal.insert(b, Edge { node: next, order });
                                next
                            }
                        };
                    }
                }
                Seg::Params => {
                    if self.nodes[node].param.is_none() {
                        let order = self.take_order();
                        self.nodes[node].param = Some(order);
                    }
                }
                Seg::Payload => {
                    if self.nodes[node].payload.is_none() {
                        let order = self.take_order();
                        self.nodes[node].payload = Some(order);
                    }
                }
            }
        }
        if self.nodes[node].terminal.is_none() {
            self.nodes[node].terminal = Some(cap);
        }
    }

    /// Advance the walk by one byte.
    pub fn step(&self, state: WalkState, byte: u8) -> Step {
        let node = &self.nodes[state.0];

        let literal = node.literal.get(&byte).copied();
        let param = if is_param_byte(byte) { node.param } else { None };

        // A literal edge always beats the payload loop (terminators must be
        // able to end a payload). Everything else is registration order.
        let chosen = match (literal, param) {
            (Some(edge), Some(p_order)) => {
                if edge.order < p_order {
                    Some((WalkState(edge.node), EdgeKind::Literal))
                } else {
                    Some((state, EdgeKind::Param))
                }
            }
            (Some(edge), None) => Some((WalkState(edge.node), EdgeKind::Literal)),
            (None, Some(p_order)) => match node.payload {
                Some(s_order) if s_order < p_order => Some((state, EdgeKind::Payload)),
                _ => Some((state, EdgeKind::Param)),
            },
            (None, None) => node.payload.map(|_| (state, EdgeKind::Payload)),
        };

        match chosen {
            Some((next, EdgeKind::Literal)) => match self.nodes[next.0].terminal {
                Some(cap) => Step::Matched(cap),
                None => Step::Pending(next, EdgeKind::Literal),
            },
            Some((next, kind)) => Step::Pending(next, kind),
            None => Step::Rejected,
        }
    }

    fn push_node(&mut self) -> usize {
        self.nodes.push(Node::default());
        self.nodes.len() - 1
    }

    fn take_order(&mut self) -> u32 {
        let order = self.next_order;
        self.next_order += 1;
        order
    }
}

fn is_param_byte(byte: u8) -> bool {
    byte.is_ascii_digit() || byte == b';' || byte == b':'
}

/// Build the capability table for a named emulation.
pub fn profile(name: &str) -> Result<CapabilityTable, EmulationError> {
    match name {
        "vt102" => Ok(vt102()),
        "xterm" => Ok(xterm()),
        other => Err(EmulationError::Unknown(other.to_string())),
    }
}

/// Base VT102 profile: C0 controls, cursor and erase sequences, scroll
/// region, SGR, and ANSI/DEC mode switches.
pub fn vt102() -> CapabilityTable {
    let mut t = CapabilityTable::new("vt102");

    // C0 controls are one-byte sequences like any other.
    t.register(&[Seg::Bytes(b"\x07")], Cap::Bell);
    t.register(&[Seg::Bytes(b"\x08")], Cap::Backspace);
    t.register(&[Seg::Bytes(b"\x09")], Cap::Tab);
    t.register(&[Seg::Bytes(b"\x0a")], Cap::LineFeed);
    t.register(&[Seg::Bytes(b"\x0b")], Cap::LineFeed);
    t.register(&[Seg::Bytes(b"\x0c")], Cap::LineFeed);
    t.register(&[Seg::Bytes(b"\x0d")], Cap::CarriageReturn);

    t.register(&[Seg::Bytes(b"\x1b7")], Cap::SaveCursor);
    t.register(&[Seg::Bytes(b"\x1b8")], Cap::RestoreCursor);
    t.register(&[Seg::Bytes(b"\x1bD")], Cap::Index);
    t.register(&[Seg::Bytes(b"\x1bE")], Cap::NextLine);
    t.register(&[Seg::Bytes(b"\x1bM")], Cap::ReverseIndex);
    t.register(&[Seg::Bytes(b"\x1bc")], Cap::FullReset);

    csi(&mut t, b"A", Cap::CursorUp);
    csi(&mut t, b"B", Cap::CursorDown);
    csi(&mut t, b"C", Cap::CursorForward);
    csi(&mut t, b"D", Cap::CursorBackward);
    csi(&mut t, b"E", Cap::CursorNextLine);
    csi(&mut t, b"F", Cap::CursorPrevLine);
    csi(&mut t, b"G", Cap::CursorColumn);
    csi(&mut t, b"H", Cap::CursorPosition);
    csi(&mut t, b"f", Cap::CursorPosition);
    csi(&mut t, b"d", Cap::CursorRow);
    csi(&mut t, b"J", Cap::EraseInDisplay);
    csi(&mut t, b"K", Cap::EraseInLine);
    csi(&mut t, b"L", Cap::InsertLines);
    csi(&mut t, b"M", Cap::DeleteLines);
    csi(&mut t, b"@", Cap::InsertChars);
    csi(&mut t, b"P", Cap::DeleteChars);
    csi(&mut t, b"X", Cap::EraseChars);
    csi(&mut t, b"S", Cap::ScrollUp);
    csi(&mut t, b"T", Cap::ScrollDown);
    csi(&mut t, b"r", Cap::SetScrollRegion);
    csi(&mut t, b"m", Cap::SelectGraphicRendition);
    csi(&mut t, b"h", Cap::SetMode);
    csi(&mut t, b"l", Cap::ResetMode);
    csi(&mut t, b"s", Cap::AnsiSaveCursor);
    csi(&mut t, b"u", Cap::AnsiRestoreCursor);

    t.register(
        &[Seg::Bytes(b"\x1b[?"), Seg::Params, Seg::Bytes(b"h")],
        Cap::SetPrivateMode,
    );
    t.register(
        &[Seg::Bytes(b"\x1b[?"), Seg::Params, Seg::Bytes(b"l")],
        Cap::ResetPrivateMode,
    );
    t.register(&[Seg::Bytes(b"\x1b[!p")], Cap::SoftReset);

    t
}

/// xterm profile: VT102 plus OSC text parameters (titles) and window ops.
pub fn xterm() -> CapabilityTable {
    let mut t = vt102();
    t.name = "xterm".to_string();

    // OSC body ("code;text", split by the decoder) terminated by BEL or
    // ST (ESC \).
    t.register(
        &[Seg::Bytes(b"\x1b]"), Seg::Payload, Seg::Bytes(b"\x07")],
        Cap::SetTextParam,
    );
    t.register(
        &[Seg::Bytes(b"\x1b]"), Seg::Payload, Seg::Bytes(b"\x1b\\")],
        Cap::SetTextParam,
    );

    csi(&mut t, b"t", Cap::WindowOps);

    t
}

fn csi(t: &mut CapabilityTable, fin: &[u8], cap: Cap) {
    t.register(&[Seg::Bytes(b"\x1b["), Seg::Params, Seg::Bytes(fin)], cap);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn walk(t: &CapabilityTable, bytes: &[u8]) -> Step {
        let mut state = t.root();
        let mut last = Step::Rejected;
        for &b in bytes {
            last = t.step(state, b);
            match last {
                Step::Pending(next, _) => state = next,
                _ => return last,
            }
        }
        last
    }

    #[test]
    fn single_byte_controls_match() {
        let t = vt102();
        assert_eq!(walk(&t, b"\x07"), Step::Matched(Cap::Bell));
        assert_eq!(walk(&t, b"\x0d"), Step::Matched(Cap::CarriageReturn));
    }

    #[test]
    fn csi_with_and_without_params() {
        let t = vt102();
        assert_eq!(walk(&t, b"\x1b[A"), Step::Matched(Cap::CursorUp));
        assert_eq!(walk(&t, b"\x1b[12;40H"), Step::Matched(Cap::CursorPosition));
    }

    #[test]
    fn incomplete_sequence_is_pending() {
        let t = vt102();
        assert!(matches!(walk(&t, b"\x1b[12;"), Step::Pending(..)));
    }

    #[test]
    fn unregistered_final_byte_rejects() {
        let t = vt102();
        assert_eq!(walk(&t, b"\x1b[5Z"), Step::Rejected);
    }

    #[test]
    fn osc_payload_runs_to_terminator() {
        let t = xterm();
        assert_eq!(
            walk(&t, b"\x1b]0;hi there\x07"),
            Step::Matched(Cap::SetTextParam)
        );
        assert_eq!(
            walk(&t, b"\x1b]2;title\x1b\\"),
            Step::Matched(Cap::SetTextParam)
        );
    }

    #[test]
    fn osc_not_in_vt102_profile() {
        let t = vt102();
        assert_eq!(walk(&t, b"\x1b]0;x\x07"), Step::Rejected);
    }

    #[test]
    fn introducers_cover_controls_and_escape() {
        let t = vt102();
        assert!(t.is_introducer(0x1b));
        assert!(t.is_introducer(0x07));
        assert!(!t.is_introducer(b'a'));
    }

    #[test]
    fn first_registration_keeps_terminal() {
        let mut t = CapabilityTable::new("test");
        t.register(&[Seg::Bytes(b"\x1b[a")], Cap::CursorUp);
        t.register(&[Seg::Bytes(b"\x1b[a")], Cap::CursorDown);
        assert_eq!(walk(&t, b"\x1b[a"), Step::Matched(Cap::CursorUp));
    }

    #[test]
    fn equal_length_conflict_resolves_by_registration_order() {
        // A digit byte acceptable to both a literal edge and the parameter
        // loop goes to whichever was registered first.
        let mut a = CapabilityTable::new("literal-first");
        a.register(&[Seg::Bytes(b"\x1b[5x")], Cap::ScrollUp);
        a.register(&[Seg::Bytes(b"\x1b["), Seg::Params, Seg::Bytes(b"x")], Cap::ScrollDown);
        assert_eq!(walk(&a, b"\x1b[5x"), Step::Matched(Cap::ScrollUp));

        let mut b = CapabilityTable::new("param-first");
        b.register(&[Seg::Bytes(b"\x1b["), Seg::Params, Seg::Bytes(b"x")], Cap::ScrollDown);
        b.register(&[Seg::Bytes(b"\x1b[5x")], Cap::ScrollUp);
        assert_eq!(walk(&b, b"\x1b[5x"), Step::Matched(Cap::ScrollDown));
    }

    #[test]
    fn unknown_profile_name_errors() {
        assert!(profile("vt102").is_ok());
        assert!(profile("xterm").is_ok());
        assert!(profile("ansi.sys").is_err());
    }
}
