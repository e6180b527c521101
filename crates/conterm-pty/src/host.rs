//! Spawning and driving a console process inside a pseudo-terminal.
//!
//! [`PtyHost`] opens the pty, builds the command from the spawn recipe, and
//! hands back a [`SharedOps`]. Two background threads do the rest: a reader
//! thread that moves raw pty bytes into a channel, and a pump thread that
//! drives the supervisor callbacks until the child exits. The pump thread
//! holds the owning reference to the operations object; once it finishes,
//! the supervisor's weak reference expires on its own.

use std::io::{self, Read, Write};
use std::sync::{mpsc, Arc, Mutex, PoisonError};
use std::time::Duration;

use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtySize};
use tracing::{debug, warn};

use conterm_common::SpawnError;
use conterm_console::{
    ProcessCallbacks, ProcessHost, ProcessOperations, SharedOps, SpawnOptions, SpawnRecipe,
};

use crate::probe;

/// Pump thread tick interval.
const PUMP_INTERVAL: Duration = Duration::from_millis(20);

/// Pump ticks between busy/cwd probes (roughly twice a second).
const PROBE_EVERY_TICKS: u32 = 25;

/// How long to keep draining reader output after the child is reaped.
const EXIT_DRAIN_GRACE: Duration = Duration::from_millis(250);

fn default_shell() -> String {
    std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string())
}

// =============================================================================
// OPERATIONS
// =============================================================================

/// Live handles to one spawned child: pty master, its writer, and the child
/// process itself. Shared between the pump thread and the supervisor.
struct PtyOperations {
    master: Box<dyn MasterPty + Send>,
    writer: Box<dyn Write + Send>,
    child: Box<dyn Child + Send + Sync>,
    pid: Option<u32>,
}

impl PtyOperations {
    fn try_wait(&mut self) -> Option<i32> {
        match self.child.try_wait() {
            Ok(Some(status)) => Some(status.exit_code() as i32),
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "try_wait failed, treating child as exited");
                Some(-1)
            }
        }
    }

    fn has_foreground_job(&self) -> bool {
        match self.pid {
            Some(pid) => probe::has_foreground_job(self.master.as_ref(), pid),
            None => false,
        }
    }
}

impl ProcessOperations for PtyOperations {
    fn write(&mut self, data: &str) -> io::Result<()> {
        self.writer.write_all(data.as_bytes())?;
        self.writer.flush()
    }

    fn resize(&mut self, cols: u16, rows: u16) -> io::Result<()> {
        self.master
            .resize(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| io::Error::other(e.to_string()))
    }

    fn interrupt_child(&mut self) -> io::Result<()> {
        if probe::interrupt_foreground(self.master.as_ref()) {
            return Ok(());
        }
        // No signalable foreground group; send ETX through the line
        // discipline instead.
        self.writer.write_all(b"\x03")?;
        self.writer.flush()
    }

    fn terminate(&mut self) -> io::Result<()> {
        self.child.kill()
    }

    fn pid(&self) -> Option<u32> {
        self.pid
    }
}

// =============================================================================
// HOST
// =============================================================================

#[derive(Debug, Default)]
pub struct PtyHost;

impl PtyHost {
    pub fn new() -> Self {
        Self
    }

    fn build_command(recipe: &SpawnRecipe, options: &SpawnOptions) -> Result<CommandBuilder, SpawnError> {
        let mut cmd = match recipe {
            SpawnRecipe::Command { command } => {
                let shell = default_shell();
                let mut cmd = CommandBuilder::new(shell);
                cmd.arg("-c");
                cmd.arg(command);
                cmd
            }
            SpawnRecipe::Program { program, args } => {
                let mut cmd = CommandBuilder::new(program);
                cmd.args(args);
                cmd
            }
            SpawnRecipe::Resurrected => {
                return Err(SpawnError::InvalidRecipe(
                    "resurrected process has no spawn recipe".into(),
                ))
            }
        };

        if let Some(cwd) = &options.cwd {
            cmd.cwd(cwd);
        }
        cmd.env("TERM", &options.term);
        for (key, value) in &options.env {
            cmd.env(key, value);
        }
        Ok(cmd)
    }
}

impl ProcessHost for PtyHost {
    fn spawn(
        &self,
        recipe: &SpawnRecipe,
        options: &SpawnOptions,
        cols: u16,
        rows: u16,
        callbacks: ProcessCallbacks,
    ) -> Result<SharedOps, SpawnError> {
        recipe.validate()?;
        let cmd = Self::build_command(recipe, options)?;

        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| SpawnError::PtyOpenFailed(e.to_string()))?;

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| SpawnError::SpawnFailed(e.to_string()))?;
        let pid = child.process_id();

        let mut reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| SpawnError::PtyOpenFailed(e.to_string()))?;
        let writer = pair
            .master
            .take_writer()
            .map_err(|e| SpawnError::PtyOpenFailed(e.to_string()))?;

        // Reader thread: raw pty bytes into a channel. Exits on EOF, which
        // the pty delivers once the child side closes.
        let (tx, rx) = mpsc::channel::<Vec<u8>>();
        std::thread::Builder::new()
            .name("pty-reader".into())
            .spawn(move || {
                let mut buf = [0u8; 8192];
                loop {
                    match reader.read(&mut buf) {
                        Ok(0) => break,
                        Ok(n) => {
                            if tx.send(buf[..n].to_vec()).is_err() {
                                break;
                            }
                        }
                        Err(_) => break,
                    }
                }
            })
            .map_err(SpawnError::Io)?;

        let ops = Arc::new(Mutex::new(PtyOperations {
            master: pair.master,
            writer,
            child,
            pid,
        }));

        let pump_ops = Arc::clone(&ops);
        std::thread::Builder::new()
            .name("pty-pump".into())
            .spawn(move || pump(pump_ops, rx, callbacks))
            .map_err(SpawnError::Io)?;

        Ok(ops)
    }
}

// =============================================================================
// PUMP
// =============================================================================

fn lock_ops(ops: &Mutex<PtyOperations>) -> std::sync::MutexGuard<'_, PtyOperations> {
    ops.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Drive the callbacks until the child exits. Never calls a callback while
/// holding the operations lock; the supervisor locks it from other threads.
fn pump(
    ops: Arc<Mutex<PtyOperations>>,
    rx: mpsc::Receiver<Vec<u8>>,
    callbacks: ProcessCallbacks,
) {
    let ProcessCallbacks {
        mut on_continue,
        mut on_output,
        on_exit,
        mut on_has_subprocs,
        mut on_cwd_changed,
    } = callbacks;

    let mut tick: u32 = 0;
    let mut last_cwd = None;
    loop {
        if let Some(chunk) = drain_output(&rx) {
            on_output(&chunk);
        }

        if !on_continue() {
            debug!("supervisor requested stop, terminating child");
            if let Err(e) = lock_ops(&ops).terminate() {
                warn!(error = %e, "terminate failed");
            }
        }

        if tick % PROBE_EVERY_TICKS == 0 {
            let (busy, pid) = {
                let guard = lock_ops(&ops);
                (guard.has_foreground_job(), guard.pid)
            };
            on_has_subprocs(busy);
            if let Some(cwd) = pid.and_then(probe::process_cwd) {
                if last_cwd.as_ref() != Some(&cwd) {
                    last_cwd = Some(cwd.clone());
                    on_cwd_changed(cwd);
                }
            }
        }

        if let Some(code) = lock_ops(&ops).try_wait() {
            // The reader thread may still be behind the child's final
            // writes; give it a bounded window to finish.
            let deadline = std::time::Instant::now() + EXIT_DRAIN_GRACE;
            loop {
                match rx.recv_timeout(PUMP_INTERVAL) {
                    Ok(chunk) => on_output(&String::from_utf8_lossy(&chunk)),
                    Err(mpsc::RecvTimeoutError::Disconnected) => break,
                    Err(mpsc::RecvTimeoutError::Timeout) => {
                        if std::time::Instant::now() >= deadline {
                            break;
                        }
                    }
                }
            }
            on_exit(code);
            break;
        }

        tick = tick.wrapping_add(1);
        std::thread::sleep(PUMP_INTERVAL);
    }
}

fn drain_output(rx: &mpsc::Receiver<Vec<u8>>) -> Option<String> {
    let mut bytes = Vec::new();
    while let Ok(chunk) = rx.try_recv() {
        bytes.extend_from_slice(&chunk);
    }
    if bytes.is_empty() {
        None
    } else {
        Some(String::from_utf8_lossy(&bytes).into_owned())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use conterm_console::{ConsoleProcess, ConsoleProcessInfo, ProcessState, PromptDetector};
    use std::time::Instant;

    fn wait_until(deadline: Duration, mut cond: impl FnMut() -> bool) -> bool {
        let end = Instant::now() + deadline;
        while Instant::now() < end {
            if cond() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        false
    }

    #[test]
    #[cfg(unix)]
    fn spawn_echo_and_collect_output() {
        let info = ConsoleProcessInfo::new(
            SpawnRecipe::command("echo conterm-works"),
            SpawnOptions::default(),
        );
        let proc = ConsoleProcess::new(info, PromptDetector::with_default_pattern());
        proc.start(&PtyHost::new()).expect("spawn");
        assert!(proc.pid().is_some());

        assert!(wait_until(Duration::from_secs(5), || proc
            .get_all()
            .contains("conterm-works")));
        assert!(wait_until(Duration::from_secs(5), || proc.state()
            == ProcessState::Exited));
        assert_eq!(proc.exit_code(), Some(0));
    }

    #[test]
    #[cfg(unix)]
    fn queued_input_reaches_the_shell() {
        let info =
            ConsoleProcessInfo::new(SpawnRecipe::command("sh"), SpawnOptions::default());
        let proc = ConsoleProcess::new(info, PromptDetector::with_default_pattern());
        proc.start(&PtyHost::new()).expect("spawn");

        proc.enqueue_input(conterm_console::Input::injected("echo from-stdin\nexit\n"));

        assert!(wait_until(Duration::from_secs(5), || proc
            .get_all()
            .contains("from-stdin")));
        assert!(wait_until(Duration::from_secs(5), || proc.state()
            == ProcessState::Exited));
    }

    #[test]
    #[cfg(unix)]
    fn nonzero_exit_code_is_reported() {
        let info =
            ConsoleProcessInfo::new(SpawnRecipe::command("exit 3"), SpawnOptions::default());
        let proc = ConsoleProcess::new(info, PromptDetector::with_default_pattern());
        proc.start(&PtyHost::new()).expect("spawn");

        assert!(wait_until(Duration::from_secs(5), || proc.state()
            == ProcessState::Exited));
        assert_eq!(proc.exit_code(), Some(3));
    }

    #[test]
    #[cfg(unix)]
    fn program_recipe_with_args() {
        let info = ConsoleProcessInfo::new(
            SpawnRecipe::program("/bin/sh", vec!["-c".into(), "printf ok".into()]),
            SpawnOptions::default(),
        );
        let proc = ConsoleProcess::new(info, PromptDetector::with_default_pattern());
        proc.start(&PtyHost::new()).expect("spawn");

        assert!(wait_until(Duration::from_secs(5), || proc
            .get_all()
            .contains("ok")));
    }

    #[test]
    #[cfg(unix)]
    fn interrupt_terminates_long_running_child() {
        let info =
            ConsoleProcessInfo::new(SpawnRecipe::command("sleep 30"), SpawnOptions::default());
        let proc = ConsoleProcess::new(info, PromptDetector::with_default_pattern());
        proc.start(&PtyHost::new()).expect("spawn");

        proc.interrupt();
        assert!(wait_until(Duration::from_secs(5), || proc.state()
            == ProcessState::Exited));
    }

    #[test]
    #[cfg(unix)]
    fn spawn_options_env_is_visible_to_child() {
        let info = ConsoleProcessInfo::new(
            SpawnRecipe::command("echo $CONTERM_PROBE"),
            SpawnOptions {
                env: vec![("CONTERM_PROBE".into(), "present".into())],
                ..Default::default()
            },
        );
        let proc = ConsoleProcess::new(info, PromptDetector::with_default_pattern());
        proc.start(&PtyHost::new()).expect("spawn");

        assert!(wait_until(Duration::from_secs(5), || proc
            .get_all()
            .contains("present")));
    }

    #[test]
    fn resurrected_recipe_is_refused() {
        let host = PtyHost::new();
        let err = host
            .spawn(
                &SpawnRecipe::Resurrected,
                &SpawnOptions::default(),
                80,
                24,
                ProcessCallbacks {
                    on_continue: Box::new(|| true),
                    on_output: Box::new(|_| {}),
                    on_exit: Box::new(|_| {}),
                    on_has_subprocs: Box::new(|_| {}),
                    on_cwd_changed: Box::new(|_| {}),
                },
            )
            .err()
            .unwrap();
        assert!(matches!(err, SpawnError::InvalidRecipe(_)));
    }
}
