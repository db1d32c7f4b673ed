//! Tool-specific prompt signatures.
//!
//! A session is `waiting` when its tool is blocked on user input. Each tool
//! draws its prompt differently, so detection is a per-tool signature match
//! over the trailing lines of the pane.

use agent_deck_core::Tool;

/// Trailing lines examined for a prompt signature.
const PROMPT_SCAN_LINES: usize = 15;

/// Signatures shared by the agent CLIs' permission/selection dialogs.
const DIALOG_SIGNATURES: &[&str] = &[
    "do you want",
    "would you like",
    "(y/n)",
    "[y/n]",
    "press enter to continue",
    "\u{276f} 1.",
];

/// Whether the trailing lines show `tool` blocked on a prompt.
///
/// `lines` must already be lowercased.
pub fn is_waiting_prompt(tool: &Tool, lines: &[&str]) -> bool {
    let start = lines.len().saturating_sub(PROMPT_SCAN_LINES);
    let tail = &lines[start..];

    if tail
        .iter()
        .any(|line| DIALOG_SIGNATURES.iter().any(|sig| line.contains(sig)))
    {
        return true;
    }

    let last = match tail.iter().rev().find(|line| !line.trim().is_empty()) {
        Some(line) => line.trim_end(),
        None => return false,
    };

    match tool {
        // Claude Code draws a bordered input box with a chevron
        Tool::Claude => {
            tail.iter().any(|line| {
                line.contains("\u{2502} >") || line.trim_start().starts_with("\u{276f}")
            })
        }
        // Gemini CLI shows a bare chevron or its message hint
        Tool::Gemini => {
            last.ends_with('>')
                || tail.iter().any(|line| line.contains("type your message"))
        }
        Tool::Opencode => last.ends_with('>') || last.ends_with("\u{276f}"),
        // Plain shells: a trailing prompt character on the last line
        Tool::Shell | Tool::Other(_) => {
            last.ends_with('$') || last.ends_with('%') || last.ends_with("\u{276f}") || last.ends_with('>')
        }
    }
}
