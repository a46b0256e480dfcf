//! Control of the external capture utility.
//!
//! - **`locator`**: finds the `caiman` binary (injected, so tests can supply a fake).
//! - **`command`**: builds its command line from the probe configuration.
//! - **`session`**: owns the temporary output directory and the running process group.

pub mod command;
pub mod locator;
pub mod session;

pub use command::CaptureCommand;
pub use locator::{FixedLocator, PathLocator, ToolLocator, CAPTURE_TOOL};
pub use session::{CaptureSession, RunningCapture, DEFAULT_RAW_FILE_NAME};
