//! Discovery of the capture utility binary.

use std::path::PathBuf;

/// Name of the capture utility executable.
pub const CAPTURE_TOOL: &str = "caiman";

/// Finds an executable on the host.
pub trait ToolLocator {
    /// Returns the path of `tool`, or `None` if it is not installed.
    fn locate(&self, tool: &str) -> Option<PathBuf>;
}

/// Searches `PATH`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PathLocator;

impl ToolLocator for PathLocator {
    fn locate(&self, tool: &str) -> Option<PathBuf> {
        which::which(tool).ok()
    }
}

/// Always answers with a fixed path, if that path exists.
#[derive(Debug, Clone)]
pub struct FixedLocator {
    path: PathBuf,
}

impl FixedLocator {
    /// Locator that resolves every tool to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ToolLocator for FixedLocator {
    fn locate(&self, _tool: &str) -> Option<PathBuf> {
        self.path.is_file().then(|| self.path.clone())
    }
}
