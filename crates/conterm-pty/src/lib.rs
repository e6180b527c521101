//! Pseudo-terminal process host built on `portable-pty`.
//!
//! Implements the [`conterm_console::ProcessHost`] seam: spawns the child
//! inside a pty, pumps its output on a background thread, and drives the
//! supervisor callbacks until the child exits.

pub mod host;
pub mod probe;

pub use host::PtyHost;
