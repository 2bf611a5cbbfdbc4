//! PID file management for the daemon.
//!
//! `tallyd start` records its PID so that `tallyd stop` and `tallyd status`
//! can find the running server. The default location is
//! `$XDG_STATE_HOME/tally/tallyd.pid`, falling back to `/tmp/tally`.

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process;

use anyhow::{bail, Context, Result};

/// Directory name under the state directory
const STATE_DIR_NAME: &str = "tally";

/// Returns the directory holding the PID and log files.
pub fn state_dir() -> PathBuf {
    dirs::state_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join(STATE_DIR_NAME)
}

/// Returns the default path to the PID file.
pub fn pid_file_path() -> PathBuf {
    state_dir().join("tallyd.pid")
}

/// Returns the path daemonized output is redirected to.
pub fn log_file_path() -> PathBuf {
    state_dir().join("tallyd.log")
}

/// A PID file at a fixed path.
#[derive(Debug, Clone)]
pub struct PidFile {
    path: PathBuf,
}

impl Default for PidFile {
    fn default() -> Self {
        Self::new(pid_file_path())
    }
}

impl PidFile {
    /// Creates a handle for the PID file at `path`. Nothing is touched yet.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the PID from the file, if it exists and parses.
    pub fn read(&self) -> Option<u32> {
        let mut file = File::open(&self.path).ok()?;
        let mut contents = String::new();
        file.read_to_string(&mut contents).ok()?;
        contents.trim().parse().ok()
    }

    /// Writes the current process's PID.
    pub fn write_current(&self) -> Result<()> {
        self.write(process::id())
    }

    /// Writes `pid`, creating parent directories as needed.
    pub fn write(&self, pid: u32) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).context("Failed to create state directory")?;
        }
        let mut file = File::create(&self.path).context("Failed to create PID file")?;
        write!(file, "{pid}").context("Failed to write PID")?;
        Ok(())
    }

    /// Removes the file. A missing file is not an error.
    pub fn remove(&self) {
        let _ = fs::remove_file(&self.path);
    }

    /// Returns the PID of the running daemon, if any.
    ///
    /// A file naming a dead process is stale and gets removed.
    pub fn running_pid(&self) -> Option<u32> {
        let pid = self.read()?;
        if is_process_running(pid) {
            return Some(pid);
        }
        self.remove();
        None
    }
}

/// Checks if a process with the given PID is running.
pub fn is_process_running(pid: u32) -> bool {
    #[cfg(unix)]
    {
        let Ok(pid) = libc::pid_t::try_from(pid) else {
            return false;
        };
        if pid <= 0 {
            return false;
        }
        // Signal 0 only checks that the process exists and may be signalled
        let result = unsafe { libc::kill(pid, 0) };
        result == 0
            || std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
    }
    #[cfg(not(unix))]
    {
        PathBuf::from(format!("/proc/{pid}")).exists()
    }
}

/// Sends SIGTERM to the daemon process.
pub fn stop_process(pid: u32) -> Result<()> {
    #[cfg(unix)]
    {
        let target = libc::pid_t::try_from(pid).context("PID out of range")?;
        let result = unsafe { libc::kill(target, libc::SIGTERM) };
        if result != 0 {
            bail!("Failed to send SIGTERM to process {pid}");
        }
    }
    #[cfg(not(unix))]
    {
        bail!("Stop command is only supported on Unix systems (PID {pid})");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_paths_share_state_dir() {
        assert!(pid_file_path().ends_with("tally/tallyd.pid"));
        assert!(log_file_path().ends_with("tally/tallyd.log"));
    }

    #[test]
    fn test_write_then_read() {
        let dir = TempDir::new().unwrap();
        let pid_file = PidFile::new(dir.path().join("nested").join("tallyd.pid"));

        pid_file.write(4242).unwrap();
        assert_eq!(pid_file.read(), Some(4242));
    }

    #[test]
    fn test_read_missing_or_garbage() {
        let dir = TempDir::new().unwrap();
        let pid_file = PidFile::new(dir.path().join("tallyd.pid"));
        assert_eq!(pid_file.read(), None);

        fs::write(pid_file.path(), "not a pid").unwrap();
        assert_eq!(pid_file.read(), None);
    }

    #[test]
    fn test_current_process_is_running() {
        let dir = TempDir::new().unwrap();
        let pid_file = PidFile::new(dir.path().join("tallyd.pid"));

        pid_file.write_current().unwrap();
        assert_eq!(pid_file.running_pid(), Some(process::id()));
    }

    #[test]
    fn test_stale_pid_file_is_removed() {
        let dir = TempDir::new().unwrap();
        let pid_file = PidFile::new(dir.path().join("tallyd.pid"));

        // Above the default pid_max, so never a live process
        pid_file.write(u32::MAX / 2).unwrap();
        assert_eq!(pid_file.running_pid(), None);
        assert!(!pid_file.path().exists());
    }

    #[test]
    fn test_remove_missing_file_is_noop() {
        let dir = TempDir::new().unwrap();
        let pid_file = PidFile::new(dir.path().join("tallyd.pid"));
        pid_file.remove();
        assert!(!pid_file.path().exists());
    }
}
