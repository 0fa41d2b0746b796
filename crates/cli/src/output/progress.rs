//! Progress bars driven by engine progress events

use std::sync::Mutex;

use indicatif::{ProgressBar, ProgressStyle};
use s3tk_core::{Phase, ProgressObserver};

const TEMPLATE: &str = "{spinner:.green} {msg:>8} [{bar:40.cyan/blue}] {pos}/{len} ({eta})";

/// Draws one bar per phase on stderr
#[derive(Default)]
pub struct ProgressReporter {
    bar: Mutex<Option<ProgressBar>>,
}

impl ProgressReporter {
    pub fn new() -> Self {
        Self::default()
    }

    fn style() -> ProgressStyle {
        ProgressStyle::with_template(TEMPLATE)
            .map(|style| style.progress_chars("#>-"))
            .unwrap_or_else(|_| ProgressStyle::default_bar())
    }

    fn current(&self) -> Option<ProgressBar> {
        self.bar.lock().ok().and_then(|bar| bar.clone())
    }
}

impl ProgressObserver for ProgressReporter {
    fn phase_started(&self, phase: Phase, total: usize) {
        let bar = ProgressBar::new(total as u64);
        bar.set_style(Self::style());
        bar.set_message(phase.to_string());
        if let Ok(mut slot) = self.bar.lock()
            && let Some(previous) = slot.replace(bar)
        {
            previous.finish_and_clear();
        }
    }

    fn item_finished(&self, _phase: Phase, key: &str, ok: bool) {
        if let Some(bar) = self.current() {
            if !ok {
                bar.println(format!("failed: {key}"));
            }
            bar.inc(1);
        }
    }

    fn phase_finished(&self, _phase: Phase) {
        if let Ok(mut slot) = self.bar.lock()
            && let Some(bar) = slot.take()
        {
            bar.finish_and_clear();
        }
    }
}
