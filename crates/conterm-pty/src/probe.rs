//! Best-effort probes against the live child: foreground job detection,
//! interrupt delivery, and working directory lookup. Everything here
//! degrades to a no-op on platforms without the underlying facility.

use std::path::PathBuf;

use portable_pty::MasterPty;

/// Whether a process other than the shell itself owns the terminal
/// foreground, i.e. the shell is busy running something.
#[cfg(unix)]
pub fn has_foreground_job(master: &(dyn MasterPty + Send), shell_pid: u32) -> bool {
    match master.process_group_leader() {
        Some(leader) if leader > 0 => leader as u32 != shell_pid,
        _ => false,
    }
}

#[cfg(not(unix))]
pub fn has_foreground_job(_master: &(dyn MasterPty + Send), _shell_pid: u32) -> bool {
    false
}

/// Deliver SIGINT to the foreground process group. Returns `false` when the
/// group could not be determined or signalled; the caller falls back to
/// writing ETX through the pty.
#[cfg(unix)]
pub fn interrupt_foreground(master: &(dyn MasterPty + Send)) -> bool {
    match master.process_group_leader() {
        Some(leader) if leader > 0 => unsafe { libc::killpg(leader, libc::SIGINT) == 0 },
        _ => false,
    }
}

#[cfg(not(unix))]
pub fn interrupt_foreground(_master: &(dyn MasterPty + Send)) -> bool {
    false
}

/// Current working directory of a live process, when the platform exposes it.
#[cfg(target_os = "linux")]
pub fn process_cwd(pid: u32) -> Option<PathBuf> {
    std::fs::read_link(format!("/proc/{pid}/cwd")).ok()
}

#[cfg(all(unix, not(target_os = "linux")))]
pub fn process_cwd(_pid: u32) -> Option<PathBuf> {
    None
}

#[cfg(not(unix))]
pub fn process_cwd(_pid: u32) -> Option<PathBuf> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(target_os = "linux")]
    fn own_cwd_is_readable() {
        let pid = std::process::id();
        let cwd = process_cwd(pid).expect("own /proc entry");
        assert!(cwd.is_absolute());
    }

    #[test]
    fn cwd_of_bogus_pid_is_none() {
        // Pid 0 never has a /proc entry of its own.
        assert_eq!(process_cwd(0), None);
    }
}
