//! Suspend/resume snapshot: a complete, self-describing serialization of
//! one console process, including retained output and pending input.

use serde::{Deserialize, Serialize};

use conterm_common::SnapshotError;

use crate::buffer::OutputBuffer;
use crate::info::{ConsoleProcessInfo, ProcessState};
use crate::input::InputQueue;

pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsoleProcessSnapshot {
    pub version: u32,
    pub info: ConsoleProcessInfo,
    pub state: ProcessState,
    pub exit_code: Option<i32>,
    /// Prompt pattern the detector was built with; rehydration recompiles it.
    pub prompt_pattern: String,
    /// Full retained output, so nothing is lost across a session restart.
    pub buffer: OutputBuffer,
    /// Still-queued client input, withheld entries included.
    pub input_queue: InputQueue,
}

impl ConsoleProcessSnapshot {
    pub fn to_json(&self) -> Result<String, SnapshotError> {
        serde_json::to_string(self).map_err(|e| SnapshotError::Malformed(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self, SnapshotError> {
        let snapshot: Self =
            serde_json::from_str(json).map_err(|e| SnapshotError::Malformed(e.to_string()))?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(SnapshotError::Malformed(format!(
                "unsupported snapshot version {}",
                snapshot.version
            )));
        }
        Ok(snapshot)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::info::{SpawnOptions, SpawnRecipe};
    use crate::input::Input;
    use crate::prompt::DEFAULT_PROMPT_PATTERN;

    fn sample() -> ConsoleProcessSnapshot {
        let mut buffer = OutputBuffer::new(100);
        buffer.append("first\nsecond\npartial");
        let mut input_queue = InputQueue::new();
        input_queue.enqueue(Input::typed(2, "withheld"));

        ConsoleProcessSnapshot {
            version: SNAPSHOT_VERSION,
            info: ConsoleProcessInfo::new(SpawnRecipe::command("htop"), SpawnOptions::default()),
            state: ProcessState::Running,
            exit_code: None,
            prompt_pattern: DEFAULT_PROMPT_PATTERN.to_string(),
            buffer,
            input_queue,
        }
    }

    #[test]
    fn json_round_trip_is_lossless() {
        let snapshot = sample();
        let json = snapshot.to_json().unwrap();
        let back = ConsoleProcessSnapshot::from_json(&json).unwrap();
        assert_eq!(snapshot, back);
    }

    #[test]
    fn malformed_json_is_rejected() {
        let err = ConsoleProcessSnapshot::from_json("{not json").unwrap_err();
        assert!(err.to_string().contains("malformed snapshot"));
    }

    #[test]
    fn truncated_object_is_rejected() {
        let err = ConsoleProcessSnapshot::from_json(r#"{"version":1}"#).unwrap_err();
        assert!(matches!(err, SnapshotError::Malformed(_)));
    }

    #[test]
    fn unsupported_version_is_rejected() {
        let mut snapshot = sample();
        snapshot.version = 99;
        let json = serde_json::to_string(&snapshot).unwrap();
        let err = ConsoleProcessSnapshot::from_json(&json).unwrap_err();
        assert!(err.to_string().contains("version 99"));
    }
}
