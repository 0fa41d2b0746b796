//! Progress observation hooks
//!
//! Engine code reports progress through [`ProgressObserver`]; every method
//! has an empty default so an observer only implements what it renders.
//! Passing `None` wherever an observer is accepted changes nothing else.

use serde::Serialize;

/// Stage of an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Compare,
    Copy,
    Delete,
    Download,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Phase::Compare => "compare",
            Phase::Copy => "copy",
            Phase::Delete => "delete",
            Phase::Download => "download",
        };
        f.write_str(name)
    }
}

/// Receives progress events from the transfer executor
pub trait ProgressObserver: Send + Sync {
    fn phase_started(&self, _phase: Phase, _total: usize) {}

    /// Called once per finished item, in completion order
    fn item_finished(&self, _phase: Phase, _key: &str, _ok: bool) {}

    fn phase_finished(&self, _phase: Phase) {}
}

/// Optional observer handle as accepted by the engine
pub type Progress<'a> = Option<&'a dyn ProgressObserver>;

pub(crate) fn started(progress: Progress<'_>, phase: Phase, total: usize) {
    if let Some(observer) = progress {
        observer.phase_started(phase, total);
    }
}

pub(crate) fn finished_item(progress: Progress<'_>, phase: Phase, key: &str, ok: bool) {
    if let Some(observer) = progress {
        observer.item_finished(phase, key, ok);
    }
}

pub(crate) fn finished(progress: Progress<'_>, phase: Phase) {
    if let Some(observer) = progress {
        observer.phase_finished(phase);
    }
}
