//! Core of the console process subsystem: supervises one interactive child
//! process per instance and mediates all I/O between it and a remote client.
//!
//! Responsibilities split by module:
//! - [`input`] — reorder queue for client input arriving out of sequence
//! - [`buffer`] — bounded line-oriented ring buffer of process output
//! - [`prompt`] — interactive prompt detection in the raw output stream
//! - [`channel`] — push vs. poll delivery selection with poll fallback
//! - [`process`] — the supervisor tying the above to a process host
//! - [`registry`] — session-wide ownership, suspend/resume of all instances
//!
//! Actual process spawning lives behind the [`host::ProcessHost`] trait;
//! the push transport lives behind [`channel::PushEndpoint`].

pub mod buffer;
pub mod channel;
pub mod host;
pub mod info;
pub mod input;
pub mod process;
pub mod prompt;
pub mod registry;
pub mod settings;
pub mod snapshot;

pub use buffer::{OutputBuffer, DEFAULT_BUFFER_LINES};
pub use channel::{DeliveryChannel, PushEndpoint};
pub use host::{ProcessCallbacks, ProcessHost, ProcessOperations, SharedOps, WeakOps};
pub use info::{
    ChannelMode, ConsoleProcessInfo, InteractionMode, ProcessState, ShellType, SpawnOptions,
    SpawnRecipe,
};
pub use input::{Input, InputQueue, Sequence, FIRST_INPUT_SEQUENCE};
pub use process::{ConsoleProcess, PromptHandler};
pub use prompt::{PromptDetector, ScanOutcome, AUTO_FLUSH_LENGTH, DEFAULT_PROMPT_PATTERN};
pub use registry::ConsoleRegistry;
pub use settings::ConsoleSettings;
pub use snapshot::ConsoleProcessSnapshot;
