//! Interactive prompt detection inside a raw, unbounded output stream.
//!
//! The detector owns the control-char-stripped tail of output not yet
//! delivered to the client. Each incoming chunk is cleaned and folded into
//! the tail; complete lines are never prompts and pass straight through as
//! plain output, while the unterminated tail is tested against the prompt
//! pattern. A tail that grows past [`AUTO_FLUSH_LENGTH`] without matching
//! is force-flushed so a prompt that never comes cannot stall delivery.

use regex::Regex;

// =============================================================================
// CONSTANTS
// =============================================================================

/// Character count of unmatched tail output that forces a flush.
pub const AUTO_FLUSH_LENGTH: usize = 20;

/// Recognizes the common interactive prompt shapes: a line ending in a
/// prompt punctuation character, optionally followed by one space.
pub const DEFAULT_PROMPT_PATTERN: &str = r"[:?$%>#] ?$";

/// Strips OSC and CSI escape sequences, bare escapes, and C0 control
/// characters other than `\n` (which drives line splitting) and `\t`.
const CONTROL_CHARS_PATTERN: &str =
    r"(?s)\x1b\][^\x07\x1b]*(?:\x07|\x1b\\)|\x1b\[[0-9;:?]*[@-~]|\x1b.|\x1b|[\x00-\x08\x0b-\x1f\x7f]";

// =============================================================================
// SCAN OUTCOME
// =============================================================================

/// Result of feeding one chunk to the detector.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ScanOutcome {
    /// Cleaned output that is definitely not part of a pending prompt:
    /// complete lines, plus any force-flushed tail. May be empty.
    pub output: String,
    /// The matched prompt text, when the tail ends in the prompt shape.
    /// Consumption is decided by the caller via [`PromptDetector::take_tail`].
    pub prompt: Option<String>,
}

// =============================================================================
// PROMPT DETECTOR
// =============================================================================

/// Prompt scanner with precompiled patterns, immutable after construction.
/// The only state is the unconsumed tail.
#[derive(Debug)]
pub struct PromptDetector {
    control_pattern: Regex,
    prompt_pattern: Regex,
    prompt_pattern_src: String,
    tail: String,
}

impl PromptDetector {
    pub fn new(prompt_pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            control_pattern: Regex::new(CONTROL_CHARS_PATTERN)?,
            prompt_pattern: Regex::new(prompt_pattern)?,
            prompt_pattern_src: prompt_pattern.to_string(),
            tail: String::new(),
        })
    }

    pub fn with_default_pattern() -> Self {
        // The built-in patterns are compile-time constants; they cannot fail.
        Self::new(DEFAULT_PROMPT_PATTERN).unwrap()
    }

    /// The configured prompt pattern source, recorded into snapshots.
    pub fn pattern(&self) -> &str {
        &self.prompt_pattern_src
    }

    /// Current unconsumed tail (always newline-free).
    pub fn tail(&self) -> &str {
        &self.tail
    }

    /// Feed one output chunk and report what became deliverable.
    pub fn scan(&mut self, chunk: &str) -> ScanOutcome {
        let cleaned = self.control_pattern.replace_all(chunk, "");

        let mut output = String::new();
        match cleaned.rfind('\n') {
            Some(pos) => {
                // Everything through the last newline, plus whatever tail we
                // were holding, is ordinary output.
                output = std::mem::take(&mut self.tail);
                output.push_str(&cleaned[..=pos]);
                self.tail.push_str(&cleaned[pos + 1..]);
            }
            None => self.tail.push_str(&cleaned),
        }

        // The prompt shape must sit at the very end of the tail; a match in
        // the middle is ordinary output still being produced.
        let ends_with_prompt = self
            .prompt_pattern
            .find_iter(&self.tail)
            .last()
            .is_some_and(|m| m.end() == self.tail.len());

        let mut prompt = None;
        if !self.tail.is_empty() && ends_with_prompt {
            prompt = Some(self.tail.clone());
        } else if self.tail.chars().count() > AUTO_FLUSH_LENGTH {
            output.push_str(&std::mem::take(&mut self.tail));
        }

        ScanOutcome { output, prompt }
    }

    /// Take and reset the tail. Called when a prompt match is consumed or
    /// passed through, and on suspend so no buffered output is lost.
    pub fn take_tail(&mut self) -> String {
        std::mem::take(&mut self.tail)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complete_lines_pass_through_as_output() {
        let mut detector = PromptDetector::with_default_pattern();
        let outcome = detector.scan("hello\nworld\n");
        assert_eq!(outcome.output, "hello\nworld\n");
        assert_eq!(outcome.prompt, None);
        assert_eq!(detector.tail(), "");
    }

    #[test]
    fn stream_ending_in_prompt_matches_once() {
        let mut detector = PromptDetector::with_default_pattern();

        let outcome = detector.scan("doing work\nPassword: ");
        assert_eq!(outcome.output, "doing work\n");
        assert_eq!(outcome.prompt.as_deref(), Some("Password: "));

        // Consuming the tail resets prompt state; nothing fires again.
        detector.take_tail();
        let outcome = detector.scan("\n");
        assert_eq!(outcome.prompt, None);
    }

    #[test]
    fn prompt_assembled_across_chunks() {
        let mut detector = PromptDetector::with_default_pattern();
        assert_eq!(detector.scan("Pass").prompt, None);
        let outcome = detector.scan("word: ");
        assert_eq!(outcome.prompt.as_deref(), Some("Password: "));
    }

    #[test]
    fn control_sequences_are_stripped_before_matching() {
        let mut detector = PromptDetector::with_default_pattern();
        let outcome = detector.scan("\x1b[1;32mok\x1b[0m\r\x07> ");
        assert_eq!(outcome.prompt.as_deref(), Some("ok> "));
    }

    #[test]
    fn osc_title_sequence_is_stripped() {
        let mut detector = PromptDetector::with_default_pattern();
        let outcome = detector.scan("\x1b]0;my-title\x07$ ");
        assert_eq!(outcome.prompt.as_deref(), Some("$ "));
    }

    #[test]
    fn short_unmatched_tail_is_not_flushed() {
        let mut detector = PromptDetector::with_default_pattern();
        let outcome = detector.scan("short tail");
        assert_eq!(outcome.output, "");
        assert_eq!(outcome.prompt, None);
        assert_eq!(detector.tail(), "short tail");
    }

    #[test]
    fn over_threshold_tail_is_flushed_exactly_once() {
        let mut detector = PromptDetector::with_default_pattern();
        let long = "x".repeat(AUTO_FLUSH_LENGTH + 5);

        let outcome = detector.scan(&long);
        assert_eq!(outcome.output, long);
        assert_eq!(outcome.prompt, None);
        assert_eq!(detector.tail(), "");

        // Nothing left to flush on a subsequent empty-ish scan.
        let outcome = detector.scan("y");
        assert_eq!(outcome.output, "");
    }

    #[test]
    fn custom_pattern_is_honored() {
        let mut detector = PromptDetector::new(r"\(y/n\) $").unwrap();
        let outcome = detector.scan("Proceed? (y/n) ");
        assert_eq!(outcome.prompt.as_deref(), Some("Proceed? (y/n) "));
        assert_eq!(detector.pattern(), r"\(y/n\) $");
    }

    #[test]
    fn unanchored_pattern_only_fires_at_tail_end() {
        let mut detector = PromptDetector::new("> ").unwrap();

        // The shape appears mid-tail while output is still flowing.
        let outcome = detector.scan("a> b");
        assert_eq!(outcome.prompt, None);
        detector.take_tail();

        let outcome = detector.scan("repl> ");
        assert_eq!(outcome.prompt.as_deref(), Some("repl> "));
    }

    #[test]
    fn invalid_pattern_is_rejected() {
        assert!(PromptDetector::new("[unclosed").is_err());
    }

    #[test]
    fn take_tail_flushes_pending_output() {
        let mut detector = PromptDetector::with_default_pattern();
        detector.scan("pending");
        assert_eq!(detector.take_tail(), "pending");
        assert_eq!(detector.tail(), "");
    }
}
