//! Terminal progress bar for generation runs.

use std::time::Duration;

use colgen_core::{BatchReport, ProgressObserver};
use indicatif::{ProgressBar, ProgressStyle};

/// Longest preview of the latest generated value shown next to the bar.
const LATEST_PREVIEW_CHARS: usize = 60;

/// Progress observer backed by an indicatif bar.
pub(crate) struct CliProgress {
    bar: ProgressBar,
}

impl CliProgress {
    pub(crate) fn new(total: usize) -> Self {
        let bar = ProgressBar::new(total as u64);
        if let Ok(style) = ProgressStyle::with_template(
            "{spinner:.cyan} [{elapsed_precise}] {bar:30.cyan/blue} {pos}/{len} {msg}",
        ) {
            bar.set_style(
                style
                    .progress_chars("█▓░")
                    .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
            );
        }
        bar.enable_steady_tick(Duration::from_millis(80));
        Self { bar }
    }
}

impl ProgressObserver for CliProgress {
    fn progress(&self, processed: usize, _total: usize, latest: Option<&str>) {
        self.bar.set_position(processed as u64);
        if let Some(text) = latest {
            self.bar.set_message(preview_line(text));
        }
    }

    fn finished(&self, _report: &BatchReport) {
        self.bar.finish_and_clear();
    }
}

/// First line of `text`, cut to a readable width.
fn preview_line(text: &str) -> String {
    let line = text.lines().next().unwrap_or_default();
    match line.char_indices().nth(LATEST_PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}…", &line[..cut]),
        None => line.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_keeps_first_line_and_truncates() {
        assert_eq!(preview_line("short\nsecond"), "short");
        let long = "字".repeat(100);
        let shown = preview_line(&long);
        assert_eq!(shown.chars().count(), LATEST_PREVIEW_CHARS + 1);
        assert!(shown.ends_with('…'));
    }
}
