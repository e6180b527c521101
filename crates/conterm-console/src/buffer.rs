//! Bounded, line-oriented ring buffer of process output.
//!
//! Source of truth for both delivery channels and for buffer persistence:
//! push mode replays it on connect, poll mode pages through it by chunk
//! index, and the whole thing rides along in the suspend/resume snapshot.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Default maximum number of retained output lines.
pub const DEFAULT_BUFFER_LINES: usize = 1000;

/// Line ring with positional chunk addressing over the retained window:
/// chunk 0 is always the oldest retained line. Once more than `max_lines`
/// lines are held, the oldest are evicted first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputBuffer {
    lines: VecDeque<String>,
    /// The newest line has not yet seen its terminator; later appends
    /// extend it instead of opening a new line.
    last_line_open: bool,
    max_lines: usize,
}

impl OutputBuffer {
    pub fn new(max_lines: usize) -> Self {
        Self {
            lines: VecDeque::new(),
            last_line_open: false,
            max_lines: max_lines.max(1),
        }
    }

    /// Append raw output, splitting it into line-terminated chunks and
    /// evicting oldest lines beyond capacity.
    pub fn append(&mut self, output: &str) {
        for part in output.split_inclusive('\n') {
            if self.last_line_open {
                if let Some(last) = self.lines.back_mut() {
                    last.push_str(part);
                }
            } else {
                self.lines.push_back(part.to_string());
            }
            self.last_line_open = !part.ends_with('\n');

            while self.lines.len() > self.max_lines {
                self.lines.pop_front();
            }
        }
    }

    /// Retrieve the chunk at `index` (0 = oldest retained line).
    ///
    /// `more_available` is true iff a higher retained index exists. An
    /// evicted or not-yet-produced index is not an error: it yields empty
    /// data so the client can re-synchronize.
    pub fn get_chunk(&self, index: usize) -> (String, bool) {
        match self.lines.get(index) {
            Some(line) => (line.clone(), index + 1 < self.lines.len()),
            None => (String::new(), false),
        }
    }

    /// Full retained buffer contents.
    pub fn get_all(&self) -> String {
        self.lines.iter().map(String::as_str).collect()
    }

    /// Drop everything, or only the most recent line (used to retroactively
    /// suppress a misbehaving client echo).
    pub fn clear(&mut self, last_line_only: bool) {
        if last_line_only {
            self.lines.pop_back();
        } else {
            self.lines.clear();
        }
        self.last_line_open = false;
    }

    /// Number of retained lines.
    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn max_lines(&self) -> usize {
        self.max_lines
    }
}

impl Default for OutputBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_LINES)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_splits_on_newlines() {
        let mut buf = OutputBuffer::new(10);
        buf.append("one\ntwo\nthree\n");
        assert_eq!(buf.line_count(), 3);
        assert_eq!(buf.get_chunk(0).0, "one\n");
        assert_eq!(buf.get_chunk(2).0, "three\n");
    }

    #[test]
    fn partial_line_is_completed_by_later_append() {
        let mut buf = OutputBuffer::new(10);
        buf.append("par");
        assert_eq!(buf.line_count(), 1);
        buf.append("tial\nnext");
        assert_eq!(buf.line_count(), 2);
        assert_eq!(buf.get_chunk(0).0, "partial\n");
        assert_eq!(buf.get_chunk(1).0, "next");
        assert_eq!(buf.get_all(), "partial\nnext");
    }

    #[test]
    fn eviction_drops_oldest_lines_first() {
        let n = 5;
        let total = 12;
        let mut buf = OutputBuffer::new(n);
        for i in 1..=total {
            buf.append(&format!("line{i}\n"));
        }
        assert_eq!(buf.line_count(), n);

        // Oldest retained is the (total - n + 1)-th appended line.
        let (first, more) = buf.get_chunk(0);
        assert_eq!(first, format!("line{}\n", total - n + 1));
        assert!(more);

        // more_available is false only at the highest retained index.
        for idx in 0..n {
            let (_, more) = buf.get_chunk(idx);
            assert_eq!(more, idx + 1 < n);
        }
        let (last, _) = buf.get_chunk(n - 1);
        assert_eq!(last, format!("line{total}\n"));
    }

    #[test]
    fn out_of_range_chunk_is_empty_not_error() {
        let mut buf = OutputBuffer::new(3);
        buf.append("only\n");
        let (data, more) = buf.get_chunk(7);
        assert!(data.is_empty());
        assert!(!more);
    }

    #[test]
    fn get_chunk_on_empty_buffer() {
        let buf = OutputBuffer::new(3);
        assert_eq!(buf.get_chunk(0), (String::new(), false));
        assert!(buf.is_empty());
    }

    #[test]
    fn clear_all_and_last_line_only() {
        let mut buf = OutputBuffer::new(10);
        buf.append("keep\nme\nnot-me");
        buf.clear(true);
        assert_eq!(buf.get_all(), "keep\nme\n");

        // A fresh append after a last-line clear opens a new line.
        buf.append("again");
        assert_eq!(buf.get_chunk(2).0, "again");

        buf.clear(false);
        assert!(buf.is_empty());
        assert_eq!(buf.get_all(), "");
    }

    #[test]
    fn capacity_of_zero_is_clamped() {
        let mut buf = OutputBuffer::new(0);
        buf.append("a\nb\n");
        assert_eq!(buf.line_count(), 1);
        assert_eq!(buf.get_chunk(0).0, "b\n");
    }

    #[test]
    fn serde_round_trip_preserves_open_line() {
        let mut buf = OutputBuffer::new(4);
        buf.append("done\nopen");
        let json = serde_json::to_string(&buf).unwrap();
        let mut back: OutputBuffer = serde_json::from_str(&json).unwrap();
        assert_eq!(buf, back);

        back.append(" still\n");
        assert_eq!(back.get_chunk(1).0, "open still\n");
    }
}
