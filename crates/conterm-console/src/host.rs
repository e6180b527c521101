//! Seams to the process-management collaborator.
//!
//! The core never spawns anything itself: it hands a [`ProcessCallbacks`]
//! bundle to a [`ProcessHost`], receives a shared [`ProcessOperations`]
//! object back, and from then on holds it only weakly — every use goes
//! through a liveness check and no-ops once the process is gone.

use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, Weak};

use conterm_common::SpawnError;

use crate::info::{SpawnOptions, SpawnRecipe};

/// Operations on a live process, supplied by the host. The supervisor
/// reaches these through [`WeakOps`].
pub trait ProcessOperations: Send {
    /// Write bytes to the process stdin (the pty master).
    fn write(&mut self, data: &str) -> io::Result<()>;

    /// Apply a new terminal geometry.
    fn resize(&mut self, cols: u16, rows: u16) -> io::Result<()>;

    /// Forward the conventional break signal to the foreground job.
    fn interrupt_child(&mut self) -> io::Result<()>;

    /// Hard-stop the process. Exit is still reported via the normal
    /// `on_exit` callback once the host observes it.
    fn terminate(&mut self) -> io::Result<()>;

    /// Pid of the spawned process, if still known.
    fn pid(&self) -> Option<u32>;
}

/// Owning reference to the operations object; held by the host while the
/// process lives.
pub type SharedOps = Arc<Mutex<dyn ProcessOperations>>;

/// Non-owning reference used by the supervisor and transport threads; may
/// have expired if the process already exited.
pub type WeakOps = Weak<Mutex<dyn ProcessOperations>>;

/// Callbacks the host drives from its I/O loop. All of them may be invoked
/// from a thread the core does not own.
pub struct ProcessCallbacks {
    /// Polled each I/O tick; `false` tells the host to stop the process
    /// and wind the loop down.
    pub on_continue: Box<dyn FnMut() -> bool + Send>,
    /// Fresh process output.
    pub on_output: Box<dyn FnMut(&str) + Send>,
    /// Terminal state; invoked exactly once.
    pub on_exit: Box<dyn FnOnce(i32) + Send>,
    /// Whether the process currently has live descendants.
    pub on_has_subprocs: Box<dyn FnMut(bool) + Send>,
    /// Best-effort working directory report.
    pub on_cwd_changed: Box<dyn FnMut(PathBuf) + Send>,
}

/// The process-management collaborator: creates the OS process and pty and
/// drives [`ProcessCallbacks`] until exit.
pub trait ProcessHost {
    fn spawn(
        &self,
        recipe: &SpawnRecipe,
        options: &SpawnOptions,
        cols: u16,
        rows: u16,
        callbacks: ProcessCallbacks,
    ) -> Result<SharedOps, SpawnError>;
}
