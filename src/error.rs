//! Custom error types for the energy probe.
//!
//! `ProbeError` consolidates every failure the instrument can report, from
//! configuration problems detected at construction to I/O failures while
//! decoding the raw capture file. Using `#[from]`, the underlying library
//! errors convert with `?`.
//!
//! ## Error Hierarchy
//!
//! - **`Config`** / **`Configuration`**: the configuration file could not be
//!   loaded, or it loaded but describes an invalid port layout. Also raised when
//!   the capture utility cannot be found on the host. Never retried.
//! - **`Launch`**: the capture utility could not be spawned. Carries the full
//!   command line so the caller can see what was attempted.
//! - **Session state errors** (`SessionNotPrepared`, `CaptureAlreadyRunning`,
//!   `CaptureNotRunning`, `CaptureStillRunning`): lifecycle calls made out of
//!   order. These are caller contract violations, not runtime conditions.
//! - **`Io`**, **`Csv`**, **`Signal`**: wrapped OS and library failures.

use thiserror::Error;

/// Convenience alias for results using the probe error type.
pub type ProbeResult<T> = std::result::Result<T, ProbeError>;

#[allow(missing_docs)]
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    #[error("Configuration validation error: {0}")]
    Configuration(String),

    #[error("Failed to launch capture utility `{command}`: {source}")]
    Launch {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Data processing error: {0}")]
    Processing(String),

    #[error("Unknown channel '{0}'")]
    UnknownChannel(String),

    #[error("No capture session prepared (call reset first)")]
    SessionNotPrepared,

    #[error("Capture is already running")]
    CaptureAlreadyRunning,

    #[error("Capture is not running (stop called without a matching start)")]
    CaptureNotRunning,

    #[error("Capture is still running (stop it before collecting data)")]
    CaptureStillRunning,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[cfg(unix)]
    #[error("Failed to signal capture process group: {0}")]
    Signal(#[from] nix::errno::Errno),
}

impl From<figment::Error> for ProbeError {
    fn from(value: figment::Error) -> Self {
        Self::Config(Box::new(value))
    }
}

impl ProbeError {
    /// Returns true for errors that indicate the caller used the lifecycle
    /// out of order rather than a failure of the host or the hardware.
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            Self::SessionNotPrepared
                | Self::CaptureAlreadyRunning
                | Self::CaptureNotRunning
                | Self::CaptureStillRunning
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contract_violations() {
        assert!(ProbeError::CaptureNotRunning.is_contract_violation());
        assert!(ProbeError::SessionNotPrepared.is_contract_violation());
        assert!(!ProbeError::Configuration("bad".into()).is_contract_violation());
        assert!(!ProbeError::UnknownChannel("x".into()).is_contract_violation());
    }

    #[test]
    fn test_launch_error_mentions_command() {
        let err = ProbeError::Launch {
            command: "caiman -d /dev/ttyACM0".into(),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        assert!(err.to_string().contains("caiman -d /dev/ttyACM0"));
    }
}
