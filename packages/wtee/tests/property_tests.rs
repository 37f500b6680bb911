use proptest::prelude::*;

use wtee::{InputEncoding, LineReassembler};

fn arb_chunks() -> impl Strategy<Value = Vec<Vec<u8>>> {
    prop::collection::vec(prop::collection::vec(any::<u8>(), 1..24), 0..16)
}

/// Mostly text with plenty of newlines and multi-byte characters.
fn arb_text_chunks() -> impl Strategy<Value = Vec<Vec<u8>>> {
    let piece = prop_oneof![
        Just("\n".to_string()),
        Just("é".to_string()),
        Just("日本".to_string()),
        Just("\r\n".to_string()),
        "[a-z ]{1,6}",
    ];
    prop::collection::vec(piece, 0..40).prop_flat_map(|pieces| {
        let bytes = pieces.concat().into_bytes();
        let len = bytes.len();
        prop::collection::vec(0..=len, 0..8).prop_map(move |mut cuts| {
            cuts.push(0);
            cuts.push(len);
            cuts.sort_unstable();
            cuts.dedup();
            cuts.windows(2)
                .map(|w| bytes[w[0]..w[1]].to_vec())
                .filter(|c| !c.is_empty())
                .collect::<Vec<_>>()
        })
    })
}

fn run(encoding: InputEncoding, chunks: &[Vec<u8>]) -> Vec<String> {
    let mut reassembler = LineReassembler::new(encoding);
    let mut lines = Vec::new();
    for chunk in chunks {
        lines.extend(reassembler.feed(chunk));
    }
    lines.extend(reassembler.feed(b""));
    lines
}

// --- Content preservation ---

proptest! {
    #[test]
    fn utf8_lines_reproduce_lossy_input(chunks in arb_chunks()) {
        let lines = run(InputEncoding::Utf8, &chunks);
        let whole = chunks.concat();
        prop_assert_eq!(lines.concat(), String::from_utf8_lossy(&whole).into_owned());
    }

    #[test]
    fn text_split_anywhere_is_preserved(chunks in arb_text_chunks()) {
        let lines = run(InputEncoding::Utf8, &chunks);
        let whole = chunks.concat();
        prop_assert_eq!(lines.concat().into_bytes(), whole);
    }

    #[test]
    fn latin1_maps_every_byte(chunks in arb_chunks()) {
        let lines = run(InputEncoding::Latin1, &chunks);
        let expected: String = chunks.concat().iter().map(|&b| b as char).collect();
        prop_assert_eq!(lines.concat(), expected);
    }
}

// --- Line shape ---

proptest! {
    #[test]
    fn only_the_final_line_may_lack_a_newline(chunks in arb_chunks()) {
        let lines = run(InputEncoding::Utf8, &chunks);
        if let Some((last, rest)) = lines.split_last() {
            for line in rest {
                prop_assert!(line.ends_with('\n'));
                prop_assert_eq!(line.matches('\n').count(), 1);
            }
            prop_assert!(last.matches('\n').count() <= 1);
            prop_assert!(!last.is_empty());
        }
    }

    #[test]
    fn nothing_after_end_of_input(chunks in arb_chunks(), late in prop::collection::vec(any::<u8>(), 0..16)) {
        let mut reassembler = LineReassembler::new(InputEncoding::Utf8);
        for chunk in &chunks {
            reassembler.feed(chunk);
        }
        reassembler.feed(b"");
        prop_assert!(reassembler.feed(&late).is_empty());
        prop_assert!(reassembler.feed(b"").is_empty());
    }

    #[test]
    fn ascii_lines_plus_pending_tail_equal_input(
        chunks in prop::collection::vec("[a-c\n]{1,8}", 0..16)
    ) {
        let mut reassembler = LineReassembler::new(InputEncoding::Utf8);
        let mut emitted = String::new();
        for chunk in &chunks {
            for line in reassembler.feed(chunk.as_bytes()) {
                emitted.push_str(&line);
            }
        }
        emitted.push_str(reassembler.pending_tail());
        prop_assert_eq!(emitted, chunks.concat());
        prop_assert!(!reassembler.pending_tail().contains('\n'));
    }
}
