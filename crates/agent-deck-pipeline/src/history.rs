//! Viewport state tracking and minimal ANSI diffing.
//!
//! The pipeline never streams the pane's raw bytes; it polls snapshots and
//! emits the smallest update that repaints the emulator's viewport. The
//! tracker also remembers how far into the multiplexer's history we have
//! mirrored, so lines that scrolled off between ticks can be fetched once
//! and appended to scrollback.

use std::sync::Mutex;

use tracing::debug;

use agent_deck_core::{normalize_crlf, sanitize_history_for_scrollback, Result};
use agent_deck_mux::{CaptureOptions, MuxAdapter};

/// Fraction of changed rows above which a full redraw is cheaper than
/// per-row updates. Exclusive: exactly this fraction still diffs.
const REDRAW_THRESHOLD: f64 = 0.80;

/// Per-session viewport state.
#[derive(Debug)]
pub struct HistoryTracker {
    viewport_rows: usize,
    last_viewport_lines: Vec<String>,
    last_history_index: usize,
    in_alt_screen: bool,
}

impl HistoryTracker {
    /// Create a tracker for a viewport of `rows` rows.
    pub fn new(rows: usize) -> Self {
        Self {
            viewport_rows: rows.max(1),
            last_viewport_lines: Vec::new(),
            last_history_index: 0,
            in_alt_screen: false,
        }
    }

    /// Current viewport height.
    pub fn viewport_rows(&self) -> usize {
        self.viewport_rows
    }

    /// Whether the pane is on the alternate screen.
    pub fn in_alt_screen(&self) -> bool {
        self.in_alt_screen
    }

    /// History lines already mirrored into the emulator.
    pub fn last_history_index(&self) -> usize {
        self.last_history_index
    }

    /// Update the viewport height.
    pub fn set_viewport_rows(&mut self, rows: usize) {
        self.viewport_rows = rows.max(1);
    }

    /// Track an alt-screen transition.
    ///
    /// Leaving the alt screen clears the diff baseline: the restored main
    /// screen differs completely from the last alt-screen snapshot.
    /// Entering preserves state, and repeated calls with the same value are
    /// no-ops.
    pub fn set_alt_screen(&mut self, flag: bool) {
        if self.in_alt_screen == flag {
            return;
        }
        if self.in_alt_screen && !flag {
            self.last_viewport_lines.clear();
        }
        self.in_alt_screen = flag;
    }

    /// Clear the diff baseline and history index. Called on resize, where
    /// reflow invalidates both. The alt-screen flag is deliberately kept.
    pub fn reset(&mut self) {
        self.last_viewport_lines.clear();
        self.last_history_index = 0;
    }

    /// Capture range for the history gap up to `current_history_size`, or
    /// `None` when there is nothing to fetch.
    ///
    /// No fetch happens when history has not grown, or when the gap fits in
    /// the viewport (the viewport diff will cover it).
    pub fn gap_capture_range(&self, current_history_size: usize) -> Option<(i64, i64)> {
        if current_history_size <= self.last_history_index {
            return None;
        }
        let gap = current_history_size - self.last_history_index;
        if gap <= self.viewport_rows {
            return None;
        }
        Some((-(gap as i64), -((self.viewport_rows + 1) as i64)))
    }

    /// Record that history up to `current_history_size` has been mirrored.
    pub fn note_history_fetched(&mut self, current_history_size: usize) {
        debug_assert!(current_history_size >= self.last_history_index);
        self.last_history_index = current_history_size;
    }

    /// Compute the minimal ANSI update from the stored snapshot to
    /// `new_snapshot`, updating the stored baseline.
    ///
    /// With no baseline the result is a full redraw. With a baseline, rows
    /// are compared as raw strings (SGR included) and changed rows are
    /// rewritten in place; more than 80% changed rows escalates to a full
    /// redraw. The emitted stream always ends by hiding the cursor.
    pub fn diff_viewport(&mut self, new_snapshot: &str) -> String {
        let rows = self.normalize_rows(new_snapshot);

        let out = if self.last_viewport_lines.is_empty() {
            Self::render_full_redraw(&rows)
        } else {
            let changed: Vec<usize> = (0..self.viewport_rows)
                .filter(|&r| self.last_viewport_lines.get(r) != rows.get(r))
                .collect();

            let ratio = changed.len() as f64 / self.viewport_rows as f64;
            if ratio > REDRAW_THRESHOLD {
                debug!(
                    changed = changed.len(),
                    rows = self.viewport_rows,
                    "hard resync"
                );
                Self::render_full_redraw(&rows)
            } else {
                let mut out = String::new();
                for r in changed {
                    // Escape rows are 1-based
                    out.push_str(&format!("\x1b[{};1H", r + 1));
                    out.push_str(&rows[r]);
                    out.push_str("\x1b[K");
                }
                out.push_str("\x1b[?25l");
                out
            }
        };

        self.last_viewport_lines = rows;
        out
    }

    /// Split a capture into exactly `viewport_rows` rows: drop the single
    /// trailing empty element a terminal newline produces, then pad or
    /// truncate.
    fn normalize_rows(&self, snapshot: &str) -> Vec<String> {
        let mut rows: Vec<String> = snapshot.split('\n').map(String::from).collect();
        if rows.last().map(String::is_empty).unwrap_or(false) {
            rows.pop();
        }
        rows.resize(self.viewport_rows, String::new());
        rows
    }

    fn render_full_redraw(rows: &[String]) -> String {
        let mut out = String::from("\x1b[H");
        for (i, row) in rows.iter().enumerate() {
            if i > 0 {
                out.push_str("\r\n");
            }
            out.push_str(row);
            out.push_str("\x1b[K");
        }
        out.push_str("\x1b[J");
        out.push_str("\x1b[?25l");
        out
    }
}

/// Fetch any history gap up to `current_history_size` and return bytes
/// ready to append to the emulator's scrollback (sanitized, CRLF).
///
/// Empty when there is no gap worth fetching. On capture success the
/// tracker's history index advances.
pub async fn fetch_history_gap(
    tracker: &Mutex<HistoryTracker>,
    adapter: &MuxAdapter,
    session: &str,
    current_history_size: usize,
) -> Result<String> {
    let range = tracker
        .lock()
        .unwrap()
        .gap_capture_range(current_history_size);

    let Some((start, end)) = range else {
        return Ok(String::new());
    };

    let captured = adapter
        .capture_pane(session, CaptureOptions::range(start, end))
        .await?;

    tracker
        .lock()
        .unwrap()
        .note_history_fetched(current_history_size);

    Ok(normalize_crlf(&sanitize_history_for_scrollback(&captured)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_deck_mux::executor::testing::ScriptedExecutor;
    use std::sync::Arc;

    #[test]
    fn test_first_diff_is_full_redraw() {
        let mut tracker = HistoryTracker::new(3);
        let out = tracker.diff_viewport("a\nb\nc");
        assert_eq!(out, "\x1b[Ha\x1b[K\r\nb\x1b[K\r\nc\x1b[K\x1b[J\x1b[?25l");
    }

    #[test]
    fn test_unchanged_viewport_emits_only_hide_cursor() {
        let mut tracker = HistoryTracker::new(24);
        tracker.diff_viewport("a\nb\nc");
        let out = tracker.diff_viewport("a\nb\nc");
        assert_eq!(out, "\x1b[?25l");
    }

    #[test]
    fn test_single_line_change_targets_one_row() {
        let mut tracker = HistoryTracker::new(24);
        tracker.diff_viewport("a\nspinner: |\nc");
        let out = tracker.diff_viewport("a\nspinner: /\nc");

        assert!(out.contains("\x1b[2;1H"));
        assert!(out.contains("spinner: /"));
        assert!(out.contains("\x1b[K"));
        assert!(!out.contains("\x1b[1;1H"));
        assert!(!out.contains("\x1b[3;1H"));
        assert!(out.ends_with("\x1b[?25l"));
    }

    #[test]
    fn test_resync_threshold_is_exclusive() {
        let initial: Vec<String> = (0..10).map(|i| i.to_string()).collect();

        // 8 of 10 rows changed: exactly 80%, still incremental
        let mut tracker = HistoryTracker::new(10);
        tracker.diff_viewport(&initial.join("\n"));
        let eighty: Vec<String> = (0..10)
            .map(|i| if i < 8 { "X".to_string() } else { i.to_string() })
            .collect();
        let out = tracker.diff_viewport(&eighty.join("\n"));
        assert!(out.starts_with("\x1b[1;"), "got {out:?}");

        // 9 of 10 rows changed: above 80%, full redraw
        let mut tracker = HistoryTracker::new(10);
        tracker.diff_viewport(&initial.join("\n"));
        let ninety: Vec<String> = (0..10)
            .map(|i| if i < 9 { "X".to_string() } else { i.to_string() })
            .collect();
        let out = tracker.diff_viewport(&ninety.join("\n"));
        assert!(out.starts_with("\x1b[H"), "got {out:?}");
    }

    #[test]
    fn test_rows_normalized_to_viewport_height() {
        let mut tracker = HistoryTracker::new(4);
        tracker.diff_viewport("a\nb");
        // Padded to 4 rows internally
        let out = tracker.diff_viewport("a\nb");
        assert_eq!(out, "\x1b[?25l");

        // A taller snapshot is truncated, not grown
        tracker.diff_viewport("a\nb\nc\nd\ne\nf");
        let out = tracker.diff_viewport("a\nb\nc\nd");
        assert_eq!(out, "\x1b[?25l");
    }

    #[test]
    fn test_trailing_newline_element_stripped() {
        let mut tracker = HistoryTracker::new(2);
        tracker.diff_viewport("a\nb\n");
        let out = tracker.diff_viewport("a\nb");
        assert_eq!(out, "\x1b[?25l");
    }

    #[test]
    fn test_empty_input_diffs_as_blank_rows() {
        let mut tracker = HistoryTracker::new(3);
        tracker.diff_viewport("a\nb\nc");
        let out = tracker.diff_viewport("");
        // All three rows blanked: 100% changed, full redraw
        assert!(out.starts_with("\x1b[H"));
    }

    #[test]
    fn test_sgr_differences_count_as_changes() {
        let mut tracker = HistoryTracker::new(24);
        tracker.diff_viewport("\x1b[31mred\x1b[0m\nplain");
        let out = tracker.diff_viewport("\x1b[32mred\x1b[0m\nplain");
        assert!(out.contains("\x1b[1;1H"));
    }

    #[test]
    fn test_alt_screen_exit_clears_baseline() {
        let mut tracker = HistoryTracker::new(24);
        tracker.diff_viewport("main screen");
        tracker.set_alt_screen(true);
        // Entering preserved the baseline
        assert_eq!(tracker.diff_viewport("main screen"), "\x1b[?25l");

        tracker.set_alt_screen(true); // idempotent
        tracker.set_alt_screen(false);
        let out = tracker.diff_viewport("main screen");
        assert!(out.starts_with("\x1b[H"));
    }

    #[test]
    fn test_reset_clears_state_keeps_alt_flag() {
        let mut tracker = HistoryTracker::new(24);
        tracker.set_alt_screen(true);
        tracker.diff_viewport("x");
        tracker.note_history_fetched(100);

        tracker.reset();
        assert_eq!(tracker.last_history_index(), 0);
        assert!(tracker.in_alt_screen());
        assert!(tracker.diff_viewport("x").starts_with("\x1b[H"));
    }

    #[test]
    fn test_baseline_length_invariant() {
        let mut tracker = HistoryTracker::new(5);
        for snapshot in ["a", "a\nb\nc\nd\ne\nf\ng", "", "x\ny"] {
            tracker.diff_viewport(snapshot);
            assert_eq!(tracker.last_viewport_lines.len(), 5);
        }
    }

    #[test]
    fn test_gap_range_no_growth() {
        let mut tracker = HistoryTracker::new(24);
        tracker.note_history_fetched(100);
        assert_eq!(tracker.gap_capture_range(100), None);
        assert_eq!(tracker.gap_capture_range(90), None);
    }

    #[test]
    fn test_gap_range_small_gap_covered_by_viewport() {
        let mut tracker = HistoryTracker::new(24);
        tracker.note_history_fetched(100);
        assert_eq!(tracker.gap_capture_range(124), None);
    }

    #[test]
    fn test_gap_range_large_gap() {
        let mut tracker = HistoryTracker::new(24);
        tracker.note_history_fetched(100);
        assert_eq!(tracker.gap_capture_range(160), Some((-60, -25)));
    }

    #[tokio::test]
    async fn test_fetch_history_gap_captures_and_advances() {
        let exec = Arc::new(ScriptedExecutor::new());
        exec.push_reply(Ok("old line 1\nold line 2".to_string()));
        let adapter = MuxAdapter::new(exec.clone());

        let tracker = Mutex::new(HistoryTracker::new(24));
        tracker.lock().unwrap().note_history_fetched(100);

        let out = fetch_history_gap(&tracker, &adapter, "s1", 160)
            .await
            .unwrap();
        assert_eq!(out, "old line 1\r\nold line 2\r\n");
        assert_eq!(tracker.lock().unwrap().last_history_index(), 160);

        let call = &exec.recorded()[0];
        assert_eq!(
            call,
            &vec!["capture-pane", "-p", "-t", "s1", "-e", "-S", "-60", "-E", "-25"]
        );
    }

    #[tokio::test]
    async fn test_fetch_history_gap_empty_when_covered() {
        let exec = Arc::new(ScriptedExecutor::new());
        let adapter = MuxAdapter::new(exec.clone());

        let tracker = Mutex::new(HistoryTracker::new(24));
        let out = fetch_history_gap(&tracker, &adapter, "s1", 10)
            .await
            .unwrap();
        assert!(out.is_empty());
        assert!(exec.recorded().is_empty());
        // Index untouched: the viewport diff owns this gap
        assert_eq!(tracker.lock().unwrap().last_history_index(), 0);
    }

    #[tokio::test]
    async fn test_fetch_history_gap_error_does_not_advance() {
        let exec = Arc::new(ScriptedExecutor::new());
        exec.push_reply(Err(agent_deck_core::Error::CaptureFailed("boom".into())));
        let adapter = MuxAdapter::new(exec);

        let tracker = Mutex::new(HistoryTracker::new(10));
        let result = fetch_history_gap(&tracker, &adapter, "s1", 50).await;
        assert!(result.is_err());
        assert_eq!(tracker.lock().unwrap().last_history_index(), 0);
    }
}
