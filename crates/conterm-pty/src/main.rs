//! conterm-shell: run one supervised console on the local terminal.
//!
//! Spawns a shell (or a one-off command) through the pty host, connects the
//! supervisor's push channel to stdout, and forwards stdin lines as
//! sequenced client input. Mostly a driver for exercising the console core
//! end to end.

use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};

use conterm_common::{ConsoleEvent, TransportError};
use conterm_console::{
    ConsoleProcess, ConsoleProcessInfo, ConsoleRegistry, ConsoleSettings, Input, InteractionMode,
    ChannelMode, PushEndpoint, SpawnOptions, SpawnRecipe,
};
use conterm_pty::PtyHost;

#[derive(Parser)]
#[command(name = "conterm-shell", about = "Supervised console process runner")]
struct Args {
    /// One-off command to run instead of an interactive shell.
    #[arg(short, long)]
    command: Option<String>,

    /// Settings file (TOML); defaults are used when absent.
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Terminal columns.
    #[arg(long)]
    cols: Option<u16>,

    /// Terminal rows.
    #[arg(long)]
    rows: Option<u16>,
}

/// Push endpoint that writes straight to the local stdout.
struct StdoutEndpoint;

impl PushEndpoint for StdoutEndpoint {
    fn send(&self, data: &str) -> Result<(), TransportError> {
        let mut stdout = std::io::stdout().lock();
        stdout
            .write_all(data.as_bytes())
            .and_then(|()| stdout.flush())
            .map_err(|e| TransportError::DeliveryFailed(e.to_string()))
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "conterm=warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let settings = match &args.settings {
        Some(path) => match ConsoleSettings::load_from_path(path) {
            Ok(settings) => settings,
            Err(e) => {
                warn!(error = %e, "falling back to default settings");
                ConsoleSettings::default()
            }
        },
        None => ConsoleSettings::default(),
    };

    let (recipe, interaction) = match &args.command {
        Some(command) => (SpawnRecipe::command(command), InteractionMode::Possible),
        None => {
            let shell = if settings.shell.is_empty() {
                std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string())
            } else {
                settings.shell.clone()
            };
            (SpawnRecipe::program(shell, Vec::new()), InteractionMode::Always)
        }
    };

    let options = SpawnOptions {
        term: settings.term.clone(),
        ..Default::default()
    };
    let info = ConsoleProcessInfo::new(recipe, options)
        .with_interaction_mode(interaction)
        .with_channel_mode(ChannelMode::Push)
        .with_geometry(
            args.cols.unwrap_or(settings.cols),
            args.rows.unwrap_or(settings.rows),
        )
        .with_buffer_line_count(settings.buffer_line_count);

    let registry = ConsoleRegistry::new();
    let proc = ConsoleProcess::new(info, settings.build_detector());
    registry.add(Arc::clone(&proc));

    let mut events = proc.subscribe();

    if let Err(e) = proc.start(&PtyHost::new()) {
        eprintln!("conterm-shell: {e}");
        std::process::exit(1);
    }
    info!(handle = %proc.handle(), pid = ?proc.pid(), "console started");

    proc.set_push_endpoint(Arc::new(StdoutEndpoint));
    proc.on_connection_opened();

    // Forward stdin lines as sequenced input; EOF stops the console.
    let input_proc = Arc::clone(&proc);
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        let mut sequence = conterm_console::FIRST_INPUT_SEQUENCE;
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            input_proc.enqueue_input(Input::typed(sequence, format!("{line}\n")));
            sequence += 1;
        }
        input_proc.interrupt();
    });

    loop {
        match events.blocking_recv() {
            Ok(ConsoleEvent::Exited {
                exit_code, cause, ..
            }) => {
                info!(exit_code, ?cause, "console exited");
                std::process::exit(exit_code);
            }
            Ok(ConsoleEvent::Prompt { prompt, .. }) => {
                // The prompt text itself already reached stdout through the
                // push channel.
                info!(prompt, "interactive prompt detected");
            }
            Ok(ConsoleEvent::BusyChanged { busy, .. }) => {
                info!(busy, "busy state changed");
            }
            Ok(ConsoleEvent::CwdChanged { cwd, .. }) => {
                info!(cwd = %cwd.display(), "working directory changed");
            }
            Ok(_) => {}
            Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                warn!(missed, "event subscriber lagged");
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
        }
    }
}
