//! End-to-end behavior through the public [`Terminal`] surface: feeding,
//! scrollback retention, matching, reflow, and determinism.

use vtcore::{StreamError, StyleFlags, Terminal, TerminalEvent};

/// Honor `RUST_LOG` so discarded-sequence diagnostics show up when a test
/// here fails. First caller wins; later calls are no-ops.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn visible_row(term: &Terminal, row: usize) -> String {
    term.screen().grid().rows()[row].text().trim_end().to_string()
}

#[test]
fn bold_run_and_newline() {
    let mut term = Terminal::new(80, 24);
    term.feed(b"Hello\x1b[1mWorld\x1b[0m\n");

    assert_eq!(visible_row(&term, 0), "HelloWorld");
    let cells = &term.screen().grid().rows()[0].cells;
    for col in 0..5 {
        assert!(!cells[col].pen.flags.contains(StyleFlags::BOLD), "col {col}");
    }
    for col in 5..10 {
        assert!(cells[col].pen.flags.contains(StyleFlags::BOLD), "col {col}");
    }
    assert_eq!(term.cursor().row, 1);
    assert_eq!(term.cursor().col, 0);
}

#[test]
fn scrollback_retention_caps_at_limit() {
    let mut term = Terminal::new(80, 24);
    term.set_scrollback_lines(100);
    for i in 0..150 {
        if i > 0 {
            term.feed(b"\n");
        }
        term.feed(format!("line {i}").as_bytes());
    }

    // 150 lines into 24 visible rows: 126 scrolled out, the newest 100
    // of those retained, 26 discarded for good.
    let screen = term.screen();
    assert_eq!(screen.history_len(), 100);
    assert_eq!(screen.total_rows(), 124);

    let oldest = screen.fetch_row(0).expect("oldest retained row");
    assert_eq!(oldest.text().trim_end(), "line 26");
    for abs in 0..screen.total_rows() {
        assert!(screen.fetch_row(abs).is_ok(), "row {abs}");
    }
    let text = term
        .get_text_range(0..2, |_, _| true, false)
        .unwrap()
        .text;
    assert_eq!(text, "line 26\nline 27");

    // Offset 0 held "line 0"; that range is gone and reads say so.
    let mut buf = [0u8; 4];
    assert!(matches!(
        screen.stream().read(0, &mut buf),
        Err(StreamError::Discarded { .. })
    ));
}

#[test]
fn discarded_stream_offsets_fail() {
    use vtcore::{MemoryStream, ScrollbackStream};

    let mut s = MemoryStream::new();
    let a = s.append(b"first");
    let b = s.append(b"second");
    s.new_page();
    let c = s.append(b"third");

    // Drop everything before `b`.
    s.reset(b);
    let mut buf = [0u8; 6];
    assert!(matches!(
        s.read(a, &mut buf[..5]),
        Err(StreamError::Discarded { .. })
    ));
    s.read(b, &mut buf).expect("retained offset");
    assert_eq!(&buf, b"second");
    let mut buf = [0u8; 5];
    s.read(c, &mut buf).expect("later page");
    assert_eq!(&buf, b"third");
}

#[test]
fn append_offsets_are_contiguous() {
    use vtcore::{MemoryStream, ScrollbackStream};

    let mut s = MemoryStream::new();
    let mut expected = 0u64;
    for chunk in [&b"ab"[..], b"cde", b"", b"f"] {
        let off = s.append(chunk);
        assert_eq!(off, expected);
        expected += chunk.len() as u64;
    }
    s.truncate(2);
    assert_eq!(s.append(b"xy"), 2);
}

#[test]
fn url_match_inside_and_outside_span() {
    let mut term = Terminal::new(80, 24);
    let tag = term.match_add("https://[^ ]+").unwrap();
    term.feed(b"fetching https://crates.io/api now\n");

    // Columns 9..30 hold the URL.
    let (text, got) = term.match_check(15, 0).expect("inside the span");
    assert_eq!(text, "https://crates.io/api");
    assert_eq!(got, tag);
    assert!(term.match_check(3, 0).is_none());
    assert!(term.match_check(32, 0).is_none());
}

#[test]
fn first_registered_pattern_wins_overlap() {
    let mut term = Terminal::new(80, 24);
    let broad = term.match_add("[a-z]+://[^ ]+").unwrap();
    let narrow = term.match_add("https://[^ ]+").unwrap();
    assert_ne!(broad, narrow);
    term.feed(b"see https://a.example\n");
    let (_, tag) = term.match_check(8, 0).unwrap();
    assert_eq!(tag, broad);
}

#[test]
fn resize_reflows_long_row() {
    let mut term = Terminal::new(80, 24);
    let line: String = ('a'..='z').cycle().take(60).collect();
    term.feed(line.as_bytes());

    term.set_size(40, 24);
    let rows = term.screen().grid().rows();
    assert!(rows[0].wrapped);
    assert!(!rows[1].wrapped);
    assert_eq!(rows[0].text(), line[..40]);
    assert_eq!(rows[1].text().trim_end(), &line[40..]);
    assert_eq!(term.cursor().row, 1);
    assert_eq!(term.cursor().col, 20);

    // Growing back re-joins the logical line.
    term.set_size(80, 24);
    assert_eq!(visible_row(&term, 0), line);
}

#[test]
fn malformed_input_is_discarded_quietly() {
    init_tracing();
    let mut term = Terminal::new(40, 5);
    // An unknown CSI final byte and invalid UTF-8, neither of which may
    // disturb later output.
    term.feed(b"\x1b[99Z");
    term.feed(&[0xfe, 0xff]);
    term.feed(b"ok");
    assert_eq!(visible_row(&term, 0), "\u{fffd}\u{fffd}ok");
}

#[test]
fn identical_feeds_yield_identical_state() {
    init_tracing();
    let chunks: &[&[u8]] = &[
        b"abc\x1b[2;",
        b"3H\x1b[31mred",
        b"\x1b[0m\r\n\xe6\xbc",
        b"\xa2 wide\x1b[5D",
    ];
    let run = |split: bool| {
        let mut term = Terminal::new(40, 10);
        if split {
            for c in chunks {
                term.feed(c);
            }
        } else {
            let all: Vec<u8> = chunks.concat();
            term.feed(&all);
        }
        let mut state = String::new();
        for row in term.screen().grid().rows() {
            state.push_str(&row.text());
            state.push('|');
        }
        (state, term.cursor().row, term.cursor().col)
    };
    assert_eq!(run(true), run(false));
}

#[test]
fn extraction_round_trips_printed_text() {
    let mut term = Terminal::new(80, 24);
    term.feed(b"first line\r\nsecond line\r\nthird");
    let text = term.get_text(|_, _| true, false).text;
    assert_eq!(text, "first line\nsecond line\nthird");
}

#[test]
fn events_report_title_bell_and_resize_request() {
    let mut term = Terminal::new(80, 24);
    term.feed(b"\x1b]2;build ok\x07\x07\x1b[8;30;90t");
    let events = term.take_events();
    assert!(events.contains(&TerminalEvent::TitleChanged("build ok".into())));
    assert!(events.contains(&TerminalEvent::Bell));
    assert!(events.contains(&TerminalEvent::ResizeRequested { cols: 90, rows: 30 }));
}

#[test]
fn alternate_screen_preserves_primary() {
    let mut term = Terminal::new(40, 10);
    term.feed(b"shell prompt");
    term.feed(b"\x1b[?1049h");
    term.feed(b"fullscreen app");
    assert_eq!(visible_row(&term, 0), "fullscreen app");
    term.feed(b"\x1b[?1049l");
    assert_eq!(visible_row(&term, 0), "shell prompt");
}
