use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::broadcast;

use crate::id::ConsoleHandle;

/// Why a console process reached its terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitCause {
    /// The process exited on its own.
    Natural,
    /// The session asked the supervisor to stop the process.
    Interrupted,
    /// The user cancelled out of an interactive prompt.
    PromptCancelled,
}

/// Client-facing notifications published by a console process supervisor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ConsoleEvent {
    /// A run of process output that was pushed to the client. Published only
    /// for push-mode deliveries; poll mode produces no unsolicited events.
    Output {
        handle: ConsoleHandle,
        data: String,
    },
    /// An interactive prompt was detected and passed through unhandled.
    Prompt {
        handle: ConsoleHandle,
        prompt: String,
    },
    /// The process reached its terminal state.
    Exited {
        handle: ConsoleHandle,
        exit_code: i32,
        cause: ExitCause,
    },
    /// The busy flag changed (or is being announced for the first time).
    BusyChanged {
        handle: ConsoleHandle,
        busy: bool,
    },
    /// The process reported a new working directory.
    CwdChanged {
        handle: ConsoleHandle,
        cwd: PathBuf,
    },
    #[serde(other)]
    Unknown,
}

/// Broadcast bus carrying [`ConsoleEvent`]s to any number of subscribers.
///
/// Publishing never blocks; events sent with no subscribers are dropped.
pub struct ConsoleEventBus {
    sender: broadcast::Sender<ConsoleEvent>,
}

impl ConsoleEventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConsoleEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: ConsoleEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }
}
