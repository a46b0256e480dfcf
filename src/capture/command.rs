//! Command line for a capture run.

use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Invocation of the capture utility:
/// `<tool> -d <device> -l -r <port>:<milliohms> ... <output_dir>`.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureCommand {
    program: PathBuf,
    args: Vec<OsString>,
}

impl CaptureCommand {
    /// Builds the command for the given device and shunt resistors (ohms),
    /// writing raw output into `output_dir`.
    pub fn new(program: &Path, device_entry: &str, resistor_values: &[f64], output_dir: &Path) -> Self {
        let mut args: Vec<OsString> = vec!["-d".into(), device_entry.into(), "-l".into()];
        for (port, ohms) in resistor_values.iter().enumerate() {
            args.push("-r".into());
            args.push(format!("{}:{}", port, milliohms(*ohms)).into());
        }
        args.push(output_dir.into());

        Self {
            program: program.to_path_buf(),
            args,
        }
    }

    /// Path of the executable.
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Arguments, in order.
    pub fn args(&self) -> &[OsString] {
        &self.args
    }

    /// A `std::process::Command` ready to configure and spawn.
    pub fn to_command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        command
    }
}

impl fmt::Display for CaptureCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}

/// Resistance in whole milliohms, truncated.
pub fn milliohms(ohms: f64) -> u64 {
    (ohms * 1000.0).trunc() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_port_command() {
        let cmd = CaptureCommand::new(
            Path::new("/usr/bin/caiman"),
            "/dev/ttyACM0",
            &[0.01],
            Path::new("/tmp/eprobe-caiman-x"),
        );
        let line = cmd.to_string();
        assert!(line.contains("-r 0:10"));
        assert_eq!(line, "/usr/bin/caiman -d /dev/ttyACM0 -l -r 0:10 /tmp/eprobe-caiman-x");
    }

    #[test]
    fn test_one_flag_per_port() {
        let cmd = CaptureCommand::new(
            Path::new("caiman"),
            "/dev/ttyACM1",
            &[0.005, 0.05, 20.0],
            Path::new("out"),
        );
        let args: Vec<String> = cmd
            .args()
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            args,
            vec!["-d", "/dev/ttyACM1", "-l", "-r", "0:5", "-r", "1:50", "-r", "2:20000", "out"]
        );
    }

    #[test]
    fn test_milliohms_truncates() {
        assert_eq!(milliohms(0.01), 10);
        assert_eq!(milliohms(0.0209), 20);
        assert_eq!(milliohms(1.0), 1000);
    }
}
