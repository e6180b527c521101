//! Console process data model: spawn recipe, options, modes, and the
//! serializable attribute set that survives suspend/resume.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use conterm_common::{ConsoleHandle, SpawnError};

use crate::buffer::DEFAULT_BUFFER_LINES;

// =============================================================================
// CONSTANTS
// =============================================================================

/// Default terminal columns.
pub const DEFAULT_COLS: u16 = 80;

/// Default terminal rows.
pub const DEFAULT_ROWS: u16 = 24;

// =============================================================================
// MODES AND STATES
// =============================================================================

/// Whether the process is expected to prompt for user input.
///
/// Prompt detection only runs for `Possible` and `Always`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionMode {
    #[default]
    Never,
    Possible,
    Always,
}

impl InteractionMode {
    pub fn is_interactive(self) -> bool {
        !matches!(self, InteractionMode::Never)
    }
}

/// Shell family running inside the console, informational for the client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShellType {
    #[default]
    Default,
    Bash,
    Zsh,
    Fish,
    PosixSh,
    Custom(String),
}

impl ShellType {
    /// Classify a shell binary path by its file name.
    pub fn from_program(program: &str) -> Self {
        let name = program.rsplit(['/', '\\']).next().unwrap_or(program);
        match name {
            "bash" => ShellType::Bash,
            "zsh" => ShellType::Zsh,
            "fish" => ShellType::Fish,
            "sh" | "dash" | "ash" => ShellType::PosixSh,
            "" => ShellType::Default,
            other => ShellType::Custom(other.to_string()),
        }
    }
}

/// How output reaches the client: unsolicited pushes over a connected
/// transport, or client-driven chunk polling.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelMode {
    #[default]
    Poll,
    Push,
}

impl ChannelMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ChannelMode::Poll => "poll",
            ChannelMode::Push => "push",
        }
    }
}

/// Supervisor lifecycle. `Running` carries an orthogonal busy flag in
/// [`ConsoleProcessInfo::has_child_procs`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessState {
    #[default]
    Created,
    Starting,
    Running,
    Exited,
}

// =============================================================================
// SPAWN RECIPE
// =============================================================================

/// How to start the process. Exactly one form is ever set: a shell command
/// line, or a program with an argument vector. `Resurrected` marks an
/// instance rebuilt from a snapshot, which must never be spawned again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SpawnRecipe {
    Command { command: String },
    Program { program: String, args: Vec<String> },
    Resurrected,
}

impl SpawnRecipe {
    pub fn command(command: impl Into<String>) -> Self {
        SpawnRecipe::Command {
            command: command.into(),
        }
    }

    pub fn program(program: impl Into<String>, args: Vec<String>) -> Self {
        SpawnRecipe::Program {
            program: program.into(),
            args,
        }
    }

    pub fn is_resurrected(&self) -> bool {
        matches!(self, SpawnRecipe::Resurrected)
    }

    /// Reject recipes that cannot produce a process.
    pub fn validate(&self) -> Result<(), SpawnError> {
        match self {
            SpawnRecipe::Command { command } if command.trim().is_empty() => {
                Err(SpawnError::InvalidRecipe("empty command".into()))
            }
            SpawnRecipe::Program { program, .. } if program.trim().is_empty() => {
                Err(SpawnError::InvalidRecipe("empty program".into()))
            }
            SpawnRecipe::Resurrected => Err(SpawnError::InvalidRecipe(
                "resurrected process has no spawn recipe".into(),
            )),
            _ => Ok(()),
        }
    }
}

/// Environment for the spawned process. `env` entries are added on top of
/// whatever baseline the process host establishes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpawnOptions {
    pub cwd: Option<PathBuf>,
    pub env: Vec<(String, String)>,
    pub term: String,
}

impl Default for SpawnOptions {
    fn default() -> Self {
        Self {
            cwd: None,
            env: Vec::new(),
            term: "xterm-256color".to_string(),
        }
    }
}

// =============================================================================
// CONSOLE PROCESS INFO
// =============================================================================

/// Every client-visible attribute of a console process. Serialized wholesale
/// into the suspend/resume snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsoleProcessInfo {
    pub handle: ConsoleHandle,
    pub caption: String,
    pub title: String,
    pub recipe: SpawnRecipe,
    pub options: SpawnOptions,
    pub interaction_mode: InteractionMode,
    pub shell_type: ShellType,
    pub cols: u16,
    pub rows: u16,
    /// Last observed pid; may be stale once the process has exited.
    pub pid: Option<u32>,
    /// Busy flag: the process has live descendants.
    pub has_child_procs: bool,
    pub alt_buffer_active: bool,
    /// Last reported working directory, updated opportunistically.
    pub cwd: Option<PathBuf>,
    pub channel_mode: ChannelMode,
    pub restarted: bool,
    pub buffer_line_count: usize,
    pub started: bool,
}

impl ConsoleProcessInfo {
    pub fn new(recipe: SpawnRecipe, options: SpawnOptions) -> Self {
        let shell_type = match &recipe {
            SpawnRecipe::Program { program, .. } => ShellType::from_program(program),
            _ => ShellType::Default,
        };
        Self {
            handle: ConsoleHandle::new(),
            caption: String::new(),
            title: String::new(),
            recipe,
            options,
            interaction_mode: InteractionMode::Never,
            shell_type,
            cols: DEFAULT_COLS,
            rows: DEFAULT_ROWS,
            pid: None,
            has_child_procs: false,
            alt_buffer_active: false,
            cwd: None,
            channel_mode: ChannelMode::Poll,
            restarted: false,
            buffer_line_count: DEFAULT_BUFFER_LINES,
            started: false,
        }
    }

    pub fn with_interaction_mode(mut self, mode: InteractionMode) -> Self {
        self.interaction_mode = mode;
        self
    }

    pub fn with_channel_mode(mut self, mode: ChannelMode) -> Self {
        self.channel_mode = mode;
        self
    }

    pub fn with_geometry(mut self, cols: u16, rows: u16) -> Self {
        self.cols = cols;
        self.rows = rows;
        self
    }

    pub fn with_buffer_line_count(mut self, lines: usize) -> Self {
        self.buffer_line_count = lines;
        self
    }

    pub fn with_caption(mut self, caption: impl Into<String>) -> Self {
        self.caption = caption.into();
        self
    }
}

// =============================================================================
// TESTS
// =============================================================================
