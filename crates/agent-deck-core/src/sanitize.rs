//! Byte-stream sanitizers for the display pipeline.
//!
//! The emulator widget owns its scrollback; bytes we append there must not
//! contain sequences that move the cursor, clear regions, or switch screens,
//! or the already-painted history gets corrupted. Colors and styles (SGR)
//! always pass through untouched.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    // Cursor control, screen clearing, alt-screen switching, resets.
    // SGR (`ESC [ ... m`) is deliberately absent from every alternation.
    static ref SCROLLBACK_UNSAFE: Regex = Regex::new(
        "(?x)
        \\x1bc                              # full reset
        | \\x1b[78]                         # cursor save/restore (DEC)
        | \\x1b\\[\\?(?:1049|47)[hl]        # alt-screen switches
        | \\x1b\\[\\?25[hl]                 # cursor visibility
        | \\x1b\\[\\d*\\x20q                # cursor style
        | \\x1b\\[\\d+;\\d+r                # scroll region
        | \\x1b\\[(?:\\d+(?:;\\d+)?)?[Hf]   # cursor home / positioning
        | \\x1b\\[\\d*[ABCDEFG]             # movement and absolute line/column
        | \\x1b\\[\\d*[JK]                  # clear screen / clear to EOL
        | \\x1b\\[[su]                      # cursor save/restore (ANSI)
        "
    )
    .unwrap();

    // The redraw a multiplexer emits right after pty attach. Only the
    // sequences that would overwrite pre-painted scrollback are removed;
    // everything else, including SGR, passes through.
    static ref SEAM_UNSAFE: Regex = Regex::new(
        "(?x)
        \\x1bc
        | \\x1b\\[\\?(?:1049|47)[hl]
        | \\x1b\\[\\d*J
        | \\x1b\\[(?:\\d+(?:;\\d+)?)?[Hf]
        "
    )
    .unwrap();
}

/// Literal markers some agent tools wrap speech output in.
pub const TTS_OPEN: &str = "\u{ab}tts\u{bb}";
/// Closing marker, see [`TTS_OPEN`].
pub const TTS_CLOSE: &str = "\u{ab}/tts\u{bb}";

/// Sanitize bytes destined for the emulator's scrollback.
///
/// Removes cursor positioning/movement/visibility/style, screen and line
/// clearing, full reset, alt-screen switches, cursor save/restore, and
/// scroll-region sequences. Preserves SGR and printable content.
pub fn sanitize_history_for_scrollback(s: &str) -> String {
    strip_to_fixpoint(&SCROLLBACK_UNSAFE, s)
}

// Removing a sequence can splice its neighbors into a new one, so strip
// until the pattern no longer matches. Each pass shrinks the string.
fn strip_to_fixpoint(re: &Regex, s: &str) -> String {
    let mut out = re.replace_all(s, "").into_owned();
    while re.is_match(&out) {
        out = re.replace_all(&out, "").into_owned();
    }
    out
}

/// Strip the attach-time redraw window ("seam") sequences from pty output.
///
/// Applied to roughly the first 4 KiB after a live attach, where the
/// multiplexer repaints the viewport and would otherwise clobber history
/// that is already on screen.
pub fn strip_seam_sequences(s: &str) -> String {
    strip_to_fixpoint(&SEAM_UNSAFE, s)
}

/// Size of the post-attach window that [`strip_seam_sequences`] applies to.
pub const SEAM_WINDOW_BYTES: usize = 4096;

/// Normalize line endings to CRLF.
///
/// The emulator interprets `\n` as cursor-down only, so every line break
/// must be a full `\r\n`. Trailing content is terminated as well.
pub fn normalize_crlf(s: &str) -> String {
    if s.is_empty() {
        return String::new();
    }
    let unified = s.replace("\r\n", "\n").replace('\r', "\n");
    let mut out = unified.replace('\n', "\r\n");
    if !out.ends_with("\r\n") {
        out.push_str("\r\n");
    }
    out
}

/// Remove the literal TTS markers from a chunk.
pub fn strip_tts_markers(s: &str) -> String {
    if !s.contains('\u{ab}') {
        return s.to_string();
    }
    s.replace(TTS_OPEN, "").replace(TTS_CLOSE, "")
}

/// Length of the longest prefix of `bytes` that is valid UTF-8.
///
/// Used by streaming readers to hold back a truncated multi-byte character
/// until the rest of it arrives.
pub fn find_last_valid_utf8_boundary(bytes: &[u8]) -> usize {
    match std::str::from_utf8(bytes) {
        Ok(_) => bytes.len(),
        Err(e) => e.valid_up_to(),
    }
}
