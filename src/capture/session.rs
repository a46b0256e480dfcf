//! Capture sessions and the running capture process.
//!
//! A [`CaptureSession`] owns a fresh temporary directory and the command line
//! that writes into it. [`RunningCapture`] owns the spawned utility, which is
//! placed in its own process group so that any helpers it starts are signalled
//! together with it. Dropping a `RunningCapture` that was never stopped
//! terminates the group.

use super::command::CaptureCommand;
use crate::error::{ProbeError, ProbeResult};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::{Child, ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tracing::{debug, info, warn};

/// File name the capture utility gives its raw sample log.
pub const DEFAULT_RAW_FILE_NAME: &str = "0000000000";

const TEMP_DIR_PREFIX: &str = "eprobe-caiman-";
const STDOUT_LOG: &str = "caiman.stdout.log";
const STDERR_LOG: &str = "caiman.stderr.log";

/// Time allowed between SIGTERM and SIGKILL.
const STOP_GRACE: Duration = Duration::from_secs(5);
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Output directory and command line for one capture.
#[derive(Debug)]
pub struct CaptureSession {
    dir: TempDir,
    command: CaptureCommand,
    raw_file_name: String,
}

impl CaptureSession {
    /// Allocates a new output directory under `root` (the system temp dir
    /// when `None`) and builds the command line.
    pub fn prepare(
        tool: &Path,
        device_entry: &str,
        resistor_values: &[f64],
        raw_file_name: &str,
        root: Option<&Path>,
    ) -> ProbeResult<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(TEMP_DIR_PREFIX);
        let dir = match root {
            Some(root) => builder.tempdir_in(root)?,
            None => builder.tempdir()?,
        };
        let command = CaptureCommand::new(tool, device_entry, resistor_values, dir.path());
        debug!("Prepared capture session in {}", dir.path().display());

        Ok(Self {
            dir,
            command,
            raw_file_name: raw_file_name.to_string(),
        })
    }

    /// Directory the capture utility writes into.
    pub fn output_dir(&self) -> &Path {
        self.dir.path()
    }

    /// Command line for this session.
    pub fn command(&self) -> &CaptureCommand {
        &self.command
    }

    /// Location of the raw sample log.
    pub fn raw_data_path(&self) -> PathBuf {
        self.dir.path().join(&self.raw_file_name)
    }

    /// Launches the capture utility without waiting for it.
    pub fn spawn(&self) -> ProbeResult<RunningCapture> {
        let stdout = File::create(self.output_dir().join(STDOUT_LOG))?;
        let stderr_path = self.output_dir().join(STDERR_LOG);
        let stderr = File::create(&stderr_path)?;

        let mut command = self.command.to_command();
        command
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr);
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        debug!("{}", self.command);
        let child = command.spawn().map_err(|source| ProbeError::Launch {
            command: self.command.to_string(),
            source,
        })?;
        info!(pid = child.id(), "Started capture utility");

        Ok(RunningCapture {
            child,
            stderr_path,
            reaped: false,
        })
    }
}

/// A capture utility process and its process group.
///
/// The group is signalled exactly once: by `terminate`, or on drop if
/// `terminate` was never called or failed.
#[derive(Debug)]
pub struct RunningCapture {
    child: Child,
    stderr_path: PathBuf,
    reaped: bool,
}

impl RunningCapture {
    /// Process id of the group leader.
    pub fn id(&self) -> u32 {
        self.child.id()
    }

    /// Signals the whole process group and reaps the leader.
    pub fn terminate(mut self) -> ProbeResult<ExitStatus> {
        let status = shutdown(&mut self.child, &self.stderr_path)?;
        self.reaped = true;
        Ok(status)
    }
}

impl Drop for RunningCapture {
    fn drop(&mut self) {
        if self.reaped {
            return;
        }
        warn!(pid = self.child.id(), "Capture released while running; terminating");
        if let Err(e) = shutdown(&mut self.child, &self.stderr_path) {
            warn!("Failed to terminate capture utility: {}", e);
        }
    }
}

fn shutdown(child: &mut Child, stderr_path: &Path) -> ProbeResult<ExitStatus> {
    if let Some(status) = child.try_wait()? {
        let stderr = fs::read_to_string(stderr_path).unwrap_or_default();
        warn!(
            "Capture utility exited before stop ({}): {}",
            status,
            stderr.trim()
        );
    }

    signal_group(child, false)?;
    let deadline = Instant::now() + STOP_GRACE;
    loop {
        if let Some(status) = child.try_wait()? {
            info!(pid = child.id(), "Capture utility stopped with status: {}", status);
            return Ok(status);
        }
        if Instant::now() >= deadline {
            warn!(pid = child.id(), "Capture utility ignored SIGTERM; killing process group");
            signal_group(child, true)?;
            return Ok(child.wait()?);
        }
        std::thread::sleep(EXIT_POLL_INTERVAL);
    }
}

#[cfg(unix)]
fn signal_group(child: &mut Child, force: bool) -> ProbeResult<()> {
    use nix::errno::Errno;
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let pgid = Pid::from_raw(child.id() as i32);
    let signal = if force { Signal::SIGKILL } else { Signal::SIGTERM };
    match killpg(pgid, signal) {
        Ok(()) => Ok(()),
        Err(Errno::ESRCH) => {
            debug!("Process group {} already gone", pgid);
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(not(unix))]
fn signal_group(child: &mut Child, _force: bool) -> ProbeResult<()> {
    child.kill().or_else(|e| match e.kind() {
        std::io::ErrorKind::InvalidInput => Ok(()),
        _ => Err(e.into()),
    })
}
