//! Mapping from emulator input bytes to multiplexer named keys.
//!
//! `send-keys -l` delivers literal text but cannot express control codes or
//! CSI sequences, so input from the emulator is split into literal runs and
//! named-key chunks before it is sent.

/// A chunk of user input ready for `send-keys`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputChunk {
    /// Printable text, sent with `send-keys -l`
    Literal(String),
    /// A multiplexer key name, sent without `-l`
    Named(&'static str),
}

/// Map a control byte or escape sequence at the start of `rest` to a named
/// key. Returns the key name and the number of bytes consumed.
fn match_special(rest: &str) -> Option<(&'static str, usize)> {
    let bytes = rest.as_bytes();
    match bytes[0] {
        b'\r' | b'\n' => Some(("Enter", 1)),
        b'\t' => Some(("Tab", 1)),
        0x7f => Some(("BSpace", 1)),
        0x1b => {
            // CSI sequences first, bare escape otherwise
            for (seq, name) in CSI_KEYS {
                if rest.as_bytes().starts_with(seq.as_bytes()) {
                    return Some((name, seq.len()));
                }
            }
            Some(("Escape", 1))
        }
        // C0 control codes map to C-a .. C-z
        b @ 0x01..=0x1a => Some((CTRL_NAMES[(b - 1) as usize], 1)),
        _ => None,
    }
}

const CSI_KEYS: &[(&str, &str)] = &[
    ("\x1b[A", "Up"),
    ("\x1b[B", "Down"),
    ("\x1b[C", "Right"),
    ("\x1b[D", "Left"),
    ("\x1b[H", "Home"),
    ("\x1b[F", "End"),
    ("\x1b[1~", "Home"),
    ("\x1b[4~", "End"),
    ("\x1b[2~", "IC"),
    ("\x1b[3~", "DC"),
    ("\x1b[5~", "PPage"),
    ("\x1b[6~", "NPage"),
    ("\x1bOA", "Up"),
    ("\x1bOB", "Down"),
    ("\x1bOC", "Right"),
    ("\x1bOD", "Left"),
];

const CTRL_NAMES: [&str; 26] = [
    "C-a", "C-b", "C-c", "C-d", "C-e", "C-f", "C-g", "C-h", "Tab", "C-j", "C-k", "C-l", "C-m",
    "C-n", "C-o", "C-p", "C-q", "C-r", "C-s", "C-t", "C-u", "C-v", "C-w", "C-x", "C-y", "C-z",
];

/// Split raw emulator input into literal and named-key chunks, in order.
pub fn split_input(data: &str) -> Vec<InputChunk> {
    let mut chunks = Vec::new();
    let mut literal = String::new();
    let mut rest = data;

    while !rest.is_empty() {
        if let Some((name, consumed)) = match_special(rest) {
            if !literal.is_empty() {
                chunks.push(InputChunk::Literal(std::mem::take(&mut literal)));
            }
            chunks.push(InputChunk::Named(name));
            rest = &rest[consumed..];
        } else {
            let ch = rest.chars().next().unwrap_or('\u{fffd}');
            literal.push(ch);
            rest = &rest[ch.len_utf8()..];
        }
    }

    if !literal.is_empty() {
        chunks.push(InputChunk::Literal(literal));
    }
    chunks
}
