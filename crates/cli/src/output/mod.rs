//! Output formatting for human and JSON modes

mod formatter;
mod progress;

pub use formatter::{Formatter, Theme};
pub use progress::ProgressReporter;

/// Output settings shared by every command
#[derive(Debug, Clone, Default)]
pub struct OutputConfig {
    /// Emit machine-readable JSON instead of text
    pub json: bool,
    pub no_color: bool,
    /// Suppress everything except errors
    pub quiet: bool,
}

impl OutputConfig {
    /// Whether progress bars are drawn
    pub fn progress_enabled(&self) -> bool {
        !self.json && !self.quiet
    }
}
