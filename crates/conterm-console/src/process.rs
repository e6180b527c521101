//! The process supervisor: owns one interactive child process end to end.
//!
//! Wires the input reorder queue, output ring buffer, prompt detector, and
//! delivery channel to a [`ProcessHost`], and exposes snapshotting for
//! suspend/resume.
//!
//! Locking discipline: all mutable state lives under a single per-instance
//! mutex. Calls into external collaborators (process writes, transport
//! pushes, event publishes, the prompt handler) are always made after the
//! guard is dropped, so callback threads can never deadlock re-entering us.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};

use conterm_common::{ConsoleEvent, ConsoleEventBus, ConsoleHandle, ExitCause, SpawnError};

use crate::buffer::OutputBuffer;
use crate::channel::{DeliveryChannel, PushEndpoint};
use crate::host::{ProcessCallbacks, ProcessHost, SharedOps, WeakOps};
use crate::info::{ChannelMode, ConsoleProcessInfo, ProcessState};
use crate::input::{Input, InputQueue};
use crate::prompt::PromptDetector;
use crate::snapshot::{ConsoleProcessSnapshot, SNAPSHOT_VERSION};

/// Custom prompt handler. Return `false` to pass the prompt through to the
/// client untouched; return `true` with a non-empty input to answer the
/// prompt as if the user had typed it; return `true` with an empty input to
/// signal the user cancelled, which terminates the process.
pub type PromptHandler = Box<dyn FnMut(&str, &mut Input) -> bool + Send>;

/// Event bus capacity per instance; slow subscribers lose oldest events.
const EVENT_BUS_CAPACITY: usize = 64;

// =============================================================================
// SUPERVISOR
// =============================================================================

pub struct ConsoleProcess {
    inner: Mutex<Inner>,
    events: ConsoleEventBus,
    /// Kept outside `inner` so the handler runs without the state lock held.
    prompt_handler: Mutex<Option<PromptHandler>>,
}

struct Inner {
    info: ConsoleProcessInfo,
    state: ProcessState,
    input_queue: InputQueue,
    buffer: OutputBuffer,
    detector: PromptDetector,
    channel: DeliveryChannel,
    /// Liveness-checked accessor to the host's operations object; expires
    /// once the process exits.
    ops: Option<WeakOps>,
    pending_cols: Option<u16>,
    pending_rows: Option<u16>,
    /// Logical stop requested; no further input accepted, the host winds
    /// down on its next tick.
    interrupt_requested: bool,
    /// Busy state must be announced to the client at least once, even when
    /// the first observation is `false`.
    child_procs_announced: bool,
    exit_cause: Option<ExitCause>,
    exit_code: Option<i32>,
}

impl Inner {
    fn live_ops(&self) -> Option<SharedOps> {
        self.ops.as_ref().and_then(std::sync::Weak::upgrade)
    }

    /// Track alternate screen buffer switches in the raw output stream.
    fn track_alt_buffer(&mut self, chunk: &str) {
        const ENTER: [&str; 3] = ["\x1b[?1049h", "\x1b[?1047h", "\x1b[?47h"];
        const LEAVE: [&str; 3] = ["\x1b[?1049l", "\x1b[?1047l", "\x1b[?47l"];
        let last_enter = ENTER.iter().filter_map(|seq| chunk.rfind(seq)).max();
        let last_leave = LEAVE.iter().filter_map(|seq| chunk.rfind(seq)).max();
        match (last_enter, last_leave) {
            (Some(enter), Some(leave)) => self.info.alt_buffer_active = enter > leave,
            (Some(_), None) => self.info.alt_buffer_active = true,
            (None, Some(_)) => self.info.alt_buffer_active = false,
            (None, None) => {}
        }
    }
}

impl ConsoleProcess {
    /// Create a fresh instance from a spawn recipe; call
    /// [`ConsoleProcess::start`] to actually launch it.
    pub fn new(info: ConsoleProcessInfo, detector: PromptDetector) -> Arc<Self> {
        let channel = DeliveryChannel::new(info.channel_mode);
        let buffer = OutputBuffer::new(info.buffer_line_count);
        Arc::new(Self {
            inner: Mutex::new(Inner {
                info,
                state: ProcessState::Created,
                input_queue: InputQueue::new(),
                buffer,
                detector,
                channel,
                ops: None,
                pending_cols: None,
                pending_rows: None,
                interrupt_requested: false,
                child_procs_announced: false,
                exit_cause: None,
                exit_code: None,
            }),
            events: ConsoleEventBus::new(EVENT_BUS_CAPACITY),
            prompt_handler: Mutex::new(None),
        })
    }

    /// Resurrect an instance from a persisted snapshot. No spawn happens:
    /// the instance comes back in `Running` or `Exited` state.
    pub fn from_snapshot(
        snapshot: ConsoleProcessSnapshot,
    ) -> Result<Arc<Self>, conterm_common::SnapshotError> {
        let detector = PromptDetector::new(&snapshot.prompt_pattern).map_err(|e| {
            conterm_common::SnapshotError::Malformed(format!("bad prompt pattern: {e}"))
        })?;

        let mut info = snapshot.info;
        info.restarted = true;
        let channel = DeliveryChannel::new(info.channel_mode);
        let state = match snapshot.state {
            ProcessState::Exited => ProcessState::Exited,
            ProcessState::Created => ProcessState::Created,
            _ => ProcessState::Running,
        };

        Ok(Arc::new(Self {
            inner: Mutex::new(Inner {
                info,
                state,
                input_queue: snapshot.input_queue,
                buffer: snapshot.buffer,
                detector,
                channel,
                ops: None,
                pending_cols: None,
                pending_rows: None,
                interrupt_requested: false,
                child_procs_announced: false,
                exit_cause: None,
                exit_code: snapshot.exit_code,
            }),
            events: ConsoleEventBus::new(EVENT_BUS_CAPACITY),
            prompt_handler: Mutex::new(None),
        }))
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    pub fn handle(&self) -> ConsoleHandle {
        self.lock().info.handle.clone()
    }

    pub fn info(&self) -> ConsoleProcessInfo {
        self.lock().info.clone()
    }

    pub fn state(&self) -> ProcessState {
        self.lock().state
    }

    pub fn is_started(&self) -> bool {
        self.lock().info.started
    }

    pub fn is_busy(&self) -> bool {
        self.lock().info.has_child_procs
    }

    pub fn channel_mode(&self) -> ChannelMode {
        self.lock().channel.mode()
    }

    pub fn pid(&self) -> Option<u32> {
        self.lock().info.pid
    }

    pub fn cwd(&self) -> Option<PathBuf> {
        self.lock().info.cwd.clone()
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.lock().exit_code
    }

    pub fn set_caption(&self, caption: impl Into<String>) {
        self.lock().info.caption = caption.into();
    }

    pub fn set_title(&self, title: impl Into<String>) {
        self.lock().info.title = title.into();
    }

    /// Subscribe to client-facing notifications (output pushes, prompts,
    /// busy changes, cwd reports, exit).
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<ConsoleEvent> {
        self.events.subscribe()
    }

    pub fn set_prompt_handler(&self, handler: PromptHandler) {
        *self
            .prompt_handler
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(handler);
    }

    pub fn set_push_endpoint(&self, endpoint: Arc<dyn PushEndpoint>) {
        self.lock().channel.set_endpoint(endpoint);
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    /// Spawn the process through the host. Idempotent: a second call after
    /// success is a no-op, and a call racing an in-flight spawn returns
    /// without spawning again (the `Starting` state claims the spawn before
    /// the lock is released). On failure the instance returns to `Created`
    /// and may be retried.
    pub fn start(self: &Arc<Self>, host: &dyn ProcessHost) -> Result<(), SpawnError> {
        let (recipe, options, cols, rows) = {
            let mut inner = self.lock();
            if inner.info.started || inner.state != ProcessState::Created {
                return Ok(());
            }
            inner.info.recipe.validate()?;
            inner.state = ProcessState::Starting;
            (
                inner.info.recipe.clone(),
                inner.info.options.clone(),
                inner.info.cols,
                inner.info.rows,
            )
        };

        let callbacks = self.create_callbacks();
        match host.spawn(&recipe, &options, cols, rows, callbacks) {
            Ok(ops) => {
                let pid = ops
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .pid();
                let mut inner = self.lock();
                inner.ops = Some(Arc::downgrade(&ops));
                inner.info.pid = pid;
                inner.info.started = true;
                inner.state = ProcessState::Running;
                info!(handle = %inner.info.handle, pid, "console process started");
                Ok(())
            }
            Err(e) => {
                let mut inner = self.lock();
                inner.state = ProcessState::Created;
                warn!(handle = %inner.info.handle, error = %e, "spawn failed");
                Err(e)
            }
        }
    }

    fn create_callbacks(self: &Arc<Self>) -> ProcessCallbacks {
        let on_continue = {
            let me = Arc::clone(self);
            Box::new(move || me.on_continue()) as Box<dyn FnMut() -> bool + Send>
        };
        let on_output = {
            let me = Arc::clone(self);
            Box::new(move |chunk: &str| me.on_output(chunk)) as Box<dyn FnMut(&str) + Send>
        };
        let on_exit = {
            let me = Arc::clone(self);
            Box::new(move |code: i32| me.on_exit(code)) as Box<dyn FnOnce(i32) + Send>
        };
        let on_has_subprocs = {
            let me = Arc::clone(self);
            Box::new(move |busy: bool| me.on_has_subprocs(busy)) as Box<dyn FnMut(bool) + Send>
        };
        let on_cwd_changed = {
            let me = Arc::clone(self);
            Box::new(move |cwd: PathBuf| me.report_cwd(cwd)) as Box<dyn FnMut(PathBuf) + Send>
        };
        ProcessCallbacks {
            on_continue,
            on_output,
            on_exit,
            on_has_subprocs,
            on_cwd_changed,
        }
    }

    /// Request a logical stop: no further input is accepted and the host
    /// winds the process down on its next I/O tick. Resource release only
    /// happens once the host reports exit.
    pub fn interrupt(&self) {
        let mut inner = self.lock();
        inner.interrupt_requested = true;
        inner.exit_cause.get_or_insert(ExitCause::Interrupted);
    }

    /// Forward the conventional break signal to the live process's
    /// foreground job. Distinct from [`ConsoleProcess::interrupt`].
    pub fn interrupt_child(&self) {
        let ops = self.lock().live_ops();
        if let Some(ops) = ops {
            let mut guard = ops.lock().unwrap_or_else(PoisonError::into_inner);
            if let Err(e) = guard.interrupt_child() {
                warn!(error = %e, "failed to interrupt child");
            }
        }
    }

    // -------------------------------------------------------------------------
    // Input
    // -------------------------------------------------------------------------

    /// Insert client input into the reorder queue. Never blocks; delivery
    /// happens on the next I/O tick.
    pub fn enqueue_input(&self, input: Input) {
        let mut inner = self.lock();
        if inner.state == ProcessState::Exited || inner.interrupt_requested {
            debug!("dropping input for stopped process");
            return;
        }
        inner.input_queue.enqueue(input);
    }

    /// Pop the next input eligible for delivery per reorder rules.
    pub fn dequeue_input(&self) -> Option<Input> {
        self.lock().input_queue.dequeue()
    }

    /// Input arriving over the push transport's own thread; bypasses
    /// ordering since the transport preserves it.
    pub fn on_received_input(&self, text: &str) {
        self.enqueue_input(Input::injected(text));
    }

    /// Answer a currently-displayed prompt programmatically: the prompt text
    /// is consumed (never delivered as output) and the answer is queued as
    /// if the user had typed it.
    pub fn enqueue_prompt_input(&self, text: &str) {
        let mut inner = self.lock();
        if inner.state == ProcessState::Exited || inner.interrupt_requested {
            return;
        }
        inner.detector.take_tail();
        inner.input_queue.enqueue(Input::injected(text));
    }

    /// Store a pending geometry change; applied to the live process on the
    /// next I/O tick. `None` leaves the corresponding dimension unchanged.
    /// Discarded silently if the process exits first.
    pub fn resize(&self, cols: Option<u16>, rows: Option<u16>) {
        let mut inner = self.lock();
        if let Some(cols) = cols {
            inner.pending_cols = Some(cols);
        }
        if let Some(rows) = rows {
            inner.pending_rows = Some(rows);
        }
    }

    // -------------------------------------------------------------------------
    // Host callbacks
    // -------------------------------------------------------------------------

    /// I/O tick: apply pending resize, drain queued input into the process,
    /// and report whether the host should keep ticking.
    pub fn on_continue(&self) -> bool {
        let (ops, geometry, inputs) = {
            let mut inner = self.lock();
            if inner.state == ProcessState::Exited || inner.interrupt_requested {
                return false;
            }
            let ops = inner.live_ops();
            if ops.is_none() {
                return true;
            }

            let resize_pending = inner.pending_cols.is_some() || inner.pending_rows.is_some();
            if let Some(cols) = inner.pending_cols.take() {
                inner.info.cols = cols;
            }
            if let Some(rows) = inner.pending_rows.take() {
                inner.info.rows = rows;
            }
            let geometry = resize_pending.then_some((inner.info.cols, inner.info.rows));

            let mut inputs = Vec::new();
            while let Some(input) = inner.input_queue.dequeue() {
                inputs.push(input);
            }
            (ops, geometry, inputs)
        };

        if let Some(ops) = ops {
            let mut guard = ops.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some((cols, rows)) = geometry {
                if let Err(e) = guard.resize(cols, rows) {
                    warn!(error = %e, "pty resize failed");
                }
            }
            for input in inputs {
                let result = if input.interrupt {
                    guard.interrupt_child()
                } else {
                    guard.write(&input.text)
                };
                if let Err(e) = result {
                    warn!(error = %e, "failed to deliver input to process");
                }
            }
        }
        true
    }

    /// Fresh process output: track alt-buffer state, run prompt detection
    /// when the mode calls for it, then buffer and deliver.
    pub fn on_output(&self, chunk: &str) {
        let (output, prompt) = {
            let mut inner = self.lock();
            if inner.state == ProcessState::Exited || inner.interrupt_requested {
                return;
            }
            inner.track_alt_buffer(chunk);
            if inner.info.interaction_mode.is_interactive() {
                let outcome = inner.detector.scan(chunk);
                (outcome.output, outcome.prompt)
            } else {
                (chunk.to_string(), None)
            }
        };

        if !output.is_empty() {
            self.deliver_output(&output);
        }
        if let Some(prompt) = prompt {
            self.handle_prompt(&prompt);
        }
    }

    /// Terminal state. The only path out of `Running`; releases the
    /// operations reference and publishes the exit notification.
    pub fn on_exit(&self, code: i32) {
        let (handle, cause) = {
            let mut inner = self.lock();
            let leftover = inner.detector.take_tail();
            if !leftover.is_empty() {
                inner.buffer.append(&leftover);
            }
            inner.state = ProcessState::Exited;
            inner.exit_code = Some(code);
            inner.ops = None;
            inner.pending_cols = None;
            inner.pending_rows = None;
            let cause = inner.exit_cause.take().unwrap_or(ExitCause::Natural);
            (inner.info.handle.clone(), cause)
        };
        info!(handle = %handle, code, ?cause, "console process exited");
        self.events.publish(ConsoleEvent::Exited {
            handle,
            exit_code: code,
            cause,
        });
    }

    /// Busy update from the host. The first observation is always announced
    /// to the client, even when it is `false`.
    pub fn on_has_subprocs(&self, has_subprocs: bool) {
        let announce = {
            let mut inner = self.lock();
            let changed = inner.info.has_child_procs != has_subprocs;
            let first = !inner.child_procs_announced;
            inner.info.has_child_procs = has_subprocs;
            inner.child_procs_announced = true;
            (changed || first).then(|| inner.info.handle.clone())
        };
        if let Some(handle) = announce {
            self.events.publish(ConsoleEvent::BusyChanged {
                handle,
                busy: has_subprocs,
            });
        }
    }

    /// Opportunistic working-directory report; never blocks process I/O.
    pub fn report_cwd(&self, cwd: PathBuf) {
        let handle = {
            let mut inner = self.lock();
            if inner.info.cwd.as_deref() == Some(cwd.as_path()) {
                return;
            }
            inner.info.cwd = Some(cwd.clone());
            inner.info.handle.clone()
        };
        self.events.publish(ConsoleEvent::CwdChanged { handle, cwd });
    }

    // -------------------------------------------------------------------------
    // Output delivery
    // -------------------------------------------------------------------------

    /// Append to the ring buffer and, in connected push mode, push to the
    /// transport. Poll mode does no unsolicited delivery. A failed push
    /// downgrades to poll; the buffered content stays retrievable.
    fn deliver_output(&self, data: &str) {
        let (target, handle) = {
            let mut inner = self.lock();
            inner.buffer.append(data);
            (inner.channel.push_target(), inner.info.handle.clone())
        };

        if let Some(endpoint) = target {
            match endpoint.send(data) {
                Ok(()) => {
                    self.events.publish(ConsoleEvent::Output {
                        handle,
                        data: data.to_string(),
                    });
                }
                Err(e) => {
                    warn!(handle = %handle, error = %e, "push failed");
                    self.downgrade_to_poll();
                }
            }
        }
    }

    fn handle_prompt(&self, prompt: &str) {
        let mut handler_guard = self
            .prompt_handler
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let Some(handler) = handler_guard.as_mut() else {
            drop(handler_guard);
            self.pass_through_prompt(prompt);
            return;
        };

        let mut answer = Input::injected("");
        let handled = handler(prompt, &mut answer);
        drop(handler_guard);

        if !handled {
            self.pass_through_prompt(prompt);
        } else if answer.is_empty() {
            // User cancelled out of the prompt: terminate the process. The
            // exit notification will carry the cancellation cause.
            let ops = {
                let mut inner = self.lock();
                inner.detector.take_tail();
                inner.interrupt_requested = true;
                inner.exit_cause = Some(ExitCause::PromptCancelled);
                inner.live_ops()
            };
            if let Some(ops) = ops {
                let mut guard = ops.lock().unwrap_or_else(PoisonError::into_inner);
                if let Err(e) = guard.terminate() {
                    warn!(error = %e, "failed to terminate after prompt cancel");
                }
            }
        } else {
            // The prompt was answered programmatically; consume it and queue
            // the answer as if the user had typed it.
            let mut inner = self.lock();
            inner.detector.take_tail();
            inner.input_queue.enqueue(answer);
        }
    }

    /// Unhandled prompt: deliver the text as ordinary output and notify.
    fn pass_through_prompt(&self, prompt: &str) {
        let (tail, handle) = {
            let mut inner = self.lock();
            (inner.detector.take_tail(), inner.info.handle.clone())
        };
        if !tail.is_empty() {
            self.deliver_output(&tail);
        }
        self.events.publish(ConsoleEvent::Prompt {
            handle,
            prompt: prompt.to_string(),
        });
    }

    // -------------------------------------------------------------------------
    // Push channel lifecycle
    // -------------------------------------------------------------------------

    /// Transport connected: replay the full retained buffer, then push each
    /// new chunk as produced.
    pub fn on_connection_opened(&self) {
        let replay = {
            let mut inner = self.lock();
            inner.channel.connection_opened();
            inner
                .channel
                .push_target()
                .map(|endpoint| (endpoint, inner.buffer.get_all()))
        };
        if let Some((endpoint, contents)) = replay {
            if !contents.is_empty() {
                if let Err(e) = endpoint.send(&contents) {
                    warn!(error = %e, "buffer replay failed");
                    self.downgrade_to_poll();
                }
            }
        }
    }

    pub fn on_connection_closed(&self) {
        self.lock().channel.connection_closed();
    }

    /// Switch to poll mode going forward. Called by the transport on
    /// unrecoverable send failure; never an error to the caller.
    pub fn downgrade_to_poll(&self) {
        let mut inner = self.lock();
        inner.channel.downgrade_to_poll();
        inner.info.channel_mode = ChannelMode::Poll;
    }

    // -------------------------------------------------------------------------
    // Buffer retrieval
    // -------------------------------------------------------------------------

    pub fn get_chunk(&self, index: usize) -> (String, bool) {
        self.lock().buffer.get_chunk(index)
    }

    pub fn get_all(&self) -> String {
        self.lock().buffer.get_all()
    }

    pub fn clear_buffer(&self, last_line_only: bool) {
        self.lock().buffer.clear(last_line_only);
    }

    // -------------------------------------------------------------------------
    // Suspend / resume
    // -------------------------------------------------------------------------

    /// Produce a complete snapshot, flushing any buffered-but-undelivered
    /// prompt tail into the ring buffer first so nothing is lost.
    pub fn on_suspend(&self) -> ConsoleProcessSnapshot {
        let mut inner = self.lock();
        let tail = inner.detector.take_tail();
        if !tail.is_empty() {
            inner.buffer.append(&tail);
        }
        ConsoleProcessSnapshot {
            version: SNAPSHOT_VERSION,
            info: inner.info.clone(),
            state: inner.state,
            exit_code: inner.exit_code,
            prompt_pattern: inner.detector.pattern().to_string(),
            buffer: inner.buffer.clone(),
            input_queue: inner.input_queue.clone(),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
