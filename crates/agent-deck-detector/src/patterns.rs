//! Visual classification patterns for pane content.
//!
//! All checks run on lowercased text. The busy and waiting sub-checks scan
//! the last 50 captured lines; the error sub-check is restricted to the
//! last 10 non-empty lines so old error discussion in scrollback cannot
//! flip a healthy session to `error`.

use lazy_static::lazy_static;
use regex::Regex;

/// Lines scanned by the busy/waiting sub-checks.
pub const SCAN_LINES: usize = 50;

/// Lines scanned for the spinner glyphs.
pub const SPINNER_SCAN_LINES: usize = 25;

/// Non-empty lines scanned by the error sub-check.
pub const ERROR_SCAN_LINES: usize = 10;

/// Literal interrupt hints agent tools print while working.
const BUSY_HINTS: &[&str] = &["ctrl+c to interrupt", "esc to interrupt"];

/// Words that mark activity when `tokens` appears alongside them.
const TOKEN_COMPANIONS: &[&str] = &["thinking", "connecting", "flummoxing", "running"];

/// Error signatures that mark a session `error` when visible at the bottom
/// of the pane.
const ERROR_PATTERNS: &[&str] = &[
    "failed to start terminal",
    "ssh connection failed",
    "connection refused",
    "permission denied (publickey",
    "host key verification failed",
    "no route to host",
    "connection timed out",
    "broken pipe",
];

lazy_static! {
    static ref CONTEXT_PERCENT: Regex = Regex::new(r"(\d{1,3})%").unwrap();
}

/// Braille spinner glyphs used by agent CLIs (U+2807 through U+280F).
fn is_spinner_char(c: char) -> bool {
    ('\u{2807}'..='\u{280F}').contains(&c)
}

/// Busy check over lowercased pane content.
///
/// `lines` is the last [`SCAN_LINES`] captured lines, already lowercased.
pub fn is_busy(lines: &[&str]) -> bool {
    let joined_start = lines.len().saturating_sub(SCAN_LINES);
    let scanned = &lines[joined_start..];

    for line in scanned {
        if BUSY_HINTS.iter().any(|hint| line.contains(hint)) {
            return true;
        }
    }

    let spinner_start = scanned.len().saturating_sub(SPINNER_SCAN_LINES);
    if scanned[spinner_start..]
        .iter()
        .any(|line| line.chars().any(is_spinner_char))
    {
        return true;
    }

    let joined = scanned.join("\n");
    joined.contains("tokens")
        && TOKEN_COMPANIONS
            .iter()
            .any(|word| joined.contains(word))
}

/// Error check over the last [`ERROR_SCAN_LINES`] non-empty lowercased lines.
pub fn has_error(lines: &[&str]) -> bool {
    let non_empty: Vec<&&str> = lines
        .iter()
        .filter(|line| !line.trim().is_empty())
        .collect();
    let start = non_empty.len().saturating_sub(ERROR_SCAN_LINES);

    non_empty[start..].iter().any(|line| {
        ERROR_PATTERNS
            .iter()
            .any(|pattern| line.contains(pattern))
    })
}

/// Extract the context-usage percentage from a claude status bar, if shown.
///
/// Looks for an `NN%` token on a line that also mentions `context`; the
/// surrounding bar text varies between versions.
pub fn extract_context_percent(content: &str) -> Option<u8> {
    for line in content.lines() {
        let lower = line.to_lowercase();
        if !lower.contains("context") {
            continue;
        }
        if let Some(caps) = CONTEXT_PERCENT.captures(&lower) {
            if let Ok(pct) = caps[1].parse::<u16>() {
                return Some(pct.min(100) as u8);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(content: &str) -> Vec<String> {
        content.lines().map(|l| l.to_lowercase()).collect()
    }

    fn refs(owned: &[String]) -> Vec<&str> {
        owned.iter().map(String::as_str).collect()
    }

    #[test]
    fn test_busy_on_interrupt_hint() {
        let owned = lines("working on it...\nesc to interrupt");
        assert!(is_busy(&refs(&owned)));

        let owned = lines("running tests (ctrl+c to interrupt)");
        assert!(is_busy(&refs(&owned)));
    }

    #[test]
    fn test_busy_on_spinner() {
        let owned = lines("\u{280B} thinking");
        assert!(is_busy(&refs(&owned)));
    }

    #[test]
    fn test_spinner_outside_window_ignored() {
        let mut content = String::from("\u{280B} old spinner\n");
        for i in 0..30 {
            content.push_str(&format!("line {i}\n"));
        }
        let owned = lines(&content);
        assert!(!is_busy(&refs(&owned)));
    }

    #[test]
    fn test_busy_on_tokens_with_companion() {
        let owned = lines("Thinking... 1.2k tokens");
        assert!(is_busy(&refs(&owned)));

        let owned = lines("flummoxing (3s - 800 tokens)");
        assert!(is_busy(&refs(&owned)));
    }

    #[test]
    fn test_tokens_alone_not_busy() {
        let owned = lines("total tokens used: 5000");
        assert!(!is_busy(&refs(&owned)));
    }

    #[test]
    fn test_idle_content_not_busy() {
        let owned = lines("$ ls\nsrc\nCargo.toml\n$ ");
        assert!(!is_busy(&refs(&owned)));
    }

    #[test]
    fn test_error_at_bottom() {
        let owned = lines("doing things\nssh connection failed");
        assert!(has_error(&refs(&owned)));
    }

    #[test]
    fn test_error_only_in_scrollback_ignored() {
        let mut content = String::from("connection refused\n");
        for i in 0..12 {
            content.push_str(&format!("recovered, line {i}\n"));
        }
        let owned = lines(&content);
        assert!(!has_error(&refs(&owned)));
    }

    #[test]
    fn test_error_window_skips_empty_lines() {
        // Blank padding must not push a live error out of the window
        let mut content = String::from("permission denied (publickey,password)\n");
        for _ in 0..15 {
            content.push('\n');
        }
        let owned = lines(&content);
        assert!(has_error(&refs(&owned)));
    }

    #[test]
    fn test_context_percent_extraction() {
        let content = "some output\nContext left until auto-compact: 34%";
        assert_eq!(extract_context_percent(content), Some(34));
    }

    #[test]
    fn test_context_percent_requires_context_word() {
        assert_eq!(extract_context_percent("progress: 80%"), None);
    }

    #[test]
    fn test_context_percent_clamped() {
        assert_eq!(
            extract_context_percent("context: 250% (corrupt bar)"),
            Some(100)
        );
    }

    #[test]
    fn test_context_percent_absent() {
        assert_eq!(extract_context_percent("no bar here"), None);
    }
}
