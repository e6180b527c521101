//! Client input reassembly: entries may arrive out of sequence over an
//! unreliable channel and are released to the process in strict order.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use tracing::debug;

// =============================================================================
// CONSTANTS
// =============================================================================

/// Ordered input sequences are 1-based per client session; the queue starts
/// out expecting this value.
pub const FIRST_INPUT_SEQUENCE: u64 = 1;

// =============================================================================
// INPUT
// =============================================================================

/// Position of an input entry in the client's submission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "seq", rename_all = "snake_case")]
pub enum Sequence {
    /// Monotonically increasing per client session, starting at
    /// [`FIRST_INPUT_SEQUENCE`]. Withheld until every predecessor arrived.
    Ordered(u64),
    /// Release everything currently withheld, gaps and all. Sent when the
    /// client knows it will not resend missing pieces.
    Flush,
    /// Bypass ordering entirely; delivered in arrival order. Used for
    /// programmatic injection.
    Ignore,
}

/// One unit of client input: text destined for the process stdin, or a
/// pty-level interrupt request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Input {
    pub text: String,
    /// Whether the client should locally echo this input.
    pub echo_input: bool,
    /// Interrupt the foreground job instead of writing text.
    pub interrupt: bool,
    pub sequence: Sequence,
}

impl Input {
    /// Keystrokes typed by the user, carrying a session sequence number.
    pub fn typed(sequence: u64, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            echo_input: true,
            interrupt: false,
            sequence: Sequence::Ordered(sequence),
        }
    }

    /// Programmatically generated input; skips reordering.
    pub fn injected(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            echo_input: true,
            interrupt: false,
            sequence: Sequence::Ignore,
        }
    }

    /// A pty interrupt request.
    pub fn interrupt() -> Self {
        Self {
            text: String::new(),
            echo_input: false,
            interrupt: true,
            sequence: Sequence::Ignore,
        }
    }

    /// A flush marker with no payload of its own.
    pub fn flush() -> Self {
        Self {
            text: String::new(),
            echo_input: false,
            interrupt: false,
            sequence: Sequence::Flush,
        }
    }

    /// Empty inputs carry nothing for the process and are dropped on
    /// enqueue.
    pub fn is_empty(&self) -> bool {
        !self.interrupt && self.text.is_empty()
    }
}

// =============================================================================
// INPUT QUEUE
// =============================================================================

/// Reorder queue for pending [`Input`] entries.
///
/// Three lanes: interrupts always dequeue first, then entries already
/// eligible for delivery in FIFO order. Ordered entries sit in `withheld`
/// until the sequence gap below them closes (or a flush arrives).
///
/// The whole queue serializes into the process snapshot so no client input
/// is lost across a session restart.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputQueue {
    interrupts: VecDeque<Input>,
    ready: VecDeque<Input>,
    withheld: BTreeMap<u64, Input>,
    next_sequence: u64,
}

impl InputQueue {
    pub fn new() -> Self {
        Self {
            interrupts: VecDeque::new(),
            ready: VecDeque::new(),
            withheld: BTreeMap::new(),
            next_sequence: FIRST_INPUT_SEQUENCE,
        }
    }

    /// Insert an entry. Never blocks and has no immediate side effect on
    /// the process; delivery happens via [`InputQueue::dequeue`].
    pub fn enqueue(&mut self, input: Input) {
        if input.is_empty() && !matches!(input.sequence, Sequence::Flush) {
            return;
        }

        if input.interrupt {
            self.interrupts.push_back(input);
            return;
        }

        match input.sequence {
            Sequence::Ignore => self.ready.push_back(input),
            Sequence::Flush => self.flush(input),
            Sequence::Ordered(seq) => {
                if seq < self.next_sequence {
                    // Client retransmit of something already released.
                    debug!(seq, next = self.next_sequence, "dropping stale input");
                    return;
                }
                if self.withheld.insert(seq, input).is_some() {
                    debug!(seq, "duplicate input sequence replaced");
                }
                self.release_eligible();
            }
        }
    }

    /// Pop the next entry eligible for delivery: interrupts first, then the
    /// ready lane in FIFO order.
    pub fn dequeue(&mut self) -> Option<Input> {
        self.interrupts
            .pop_front()
            .or_else(|| self.ready.pop_front())
    }

    /// Total entries held, including withheld ones.
    pub fn len(&self) -> usize {
        self.interrupts.len() + self.ready.len() + self.withheld.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Release everything withheld, in sequence order, regardless of gaps.
    /// A flush entry carrying its own text is released last.
    fn flush(&mut self, marker: Input) {
        if let Some((&last, _)) = self.withheld.last_key_value() {
            self.next_sequence = last + 1;
        }
        let withheld = std::mem::take(&mut self.withheld);
        self.ready.extend(withheld.into_values());
        if !marker.text.is_empty() {
            self.ready.push_back(marker);
        }
    }

    /// Move consecutively-sequenced entries from `withheld` to `ready`.
    fn release_eligible(&mut self) {
        while let Some(input) = self.withheld.remove(&self.next_sequence) {
            self.ready.push_back(input);
            self.next_sequence += 1;
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
