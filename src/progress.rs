//! Progress reporting utilities using indicatif.
//!
//! The [`ProgressCallback`] trait is the seam between long-running
//! operations (metadata loading, batch execution) and whatever wants to
//! display progress; [`Progress`] implements it with terminal bars. A
//! streaming UI would implement the same trait and consume per-file
//! updates as they arrive.

use std::sync::Mutex;
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

/// Progress callback for batch operations.
///
/// Phases used by this crate: `"metadata"` during batch metadata loads
/// and `"rename"` during execution.
pub trait ProgressCallback: Send + Sync {
    /// Called when a phase starts with the total number of items.
    fn on_phase_start(&self, phase: &str, total: usize);

    /// Called per item processed; `current` is 1-based.
    fn on_progress(&self, current: usize, name: &str);

    /// Called when a phase completes.
    fn on_phase_end(&self, phase: &str);
}

/// Terminal progress reporter.
pub struct Progress {
    multi: MultiProgress,
    bar: Mutex<Option<ProgressBar>>,
    quiet: bool,
}

impl Progress {
    /// Create a reporter; `quiet` suppresses all bars.
    #[must_use]
    pub fn new(quiet: bool) -> Self {
        Self {
            multi: MultiProgress::new(),
            bar: Mutex::new(None),
            quiet,
        }
    }

    fn bar_style(phase: &str) -> ProgressStyle {
        let template = match phase {
            "metadata" => "[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
            _ => "[{elapsed_precise}] [{bar:40.green/blue}] {pos}/{len} {msg}",
        };
        ProgressStyle::with_template(template)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█>-")
    }
}

impl ProgressCallback for Progress {
    fn on_phase_start(&self, phase: &str, total: usize) {
        if self.quiet {
            return;
        }
        let pb = self.multi.add(ProgressBar::new(total as u64));
        pb.set_style(Self::bar_style(phase));
        let message = match phase {
            "metadata" => "Reading metadata".to_string(),
            "rename" => "Renaming".to_string(),
            other => other.to_string(),
        };
        pb.set_message(message);
        pb.enable_steady_tick(Duration::from_millis(100));
        *self.bar.lock().unwrap() = Some(pb);
    }

    fn on_progress(&self, current: usize, name: &str) {
        if self.quiet {
            return;
        }
        if let Some(pb) = &*self.bar.lock().unwrap() {
            pb.set_position(current as u64);
            pb.set_message(truncate_name(name, 40));
        }
    }

    fn on_phase_end(&self, phase: &str) {
        if self.quiet {
            return;
        }
        if let Some(pb) = self.bar.lock().unwrap().take() {
            pb.finish_with_message(match phase {
                "metadata" => "Metadata complete".to_string(),
                "rename" => "Rename complete".to_string(),
                other => format!("{other} complete"),
            });
        }
    }
}

/// Truncate a filename for display in the bar message.
fn truncate_name(name: &str, max_len: usize) -> String {
    if name.chars().count() <= max_len {
        name.to_string()
    } else {
        let tail: String = name
            .chars()
            .rev()
            .take(max_len.saturating_sub(3))
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        format!("...{tail}")
    }
}
