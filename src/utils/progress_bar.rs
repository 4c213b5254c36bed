use std::time::{Duration, Instant};
use indicatif::ProgressStyle;

const TEMPLATE: &str = "[{bar:30}] {percent:>3}% {msg}";

/// Download progress on stderr, one bar per stream.
pub struct ProgressBar {
    bar: indicatif::ProgressBar,
    hidden: bool,
    started_at: Instant,
}

impl ProgressBar {
    pub fn new() -> Self {
        Self {
            bar: new_bar(false),
            hidden: false,
            started_at: Instant::now(),
        }
    }

    #[cfg(test)]
    pub fn new_silent() -> Self {
        Self {
            bar: new_bar(true),
            hidden: true,
            started_at: Instant::now(),
        }
    }

    /// Time since the job started, across every stream.
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Prints a status line above the bar, e.g. the current pipeline phase.
    pub fn status(&mut self, text: &str) {
        log::info!("{}", text);
        self.bar.println(text);
    }

    pub fn update(&mut self, percentage: f64, extra_info: Option<&str>) {
        let percentage = percentage.clamp(0.0, 100.0);
        self.bar.set_position(percentage.round() as u64);
        if let Some(info) = extra_info {
            self.bar.set_message(info.to_string());
        }
    }

    /// Clears the current bar; the next update starts a fresh one.
    pub fn finish(&mut self) {
        self.bar.finish_and_clear();
        self.bar = new_bar(self.hidden);
    }
}

impl Default for ProgressBar {
    fn default() -> Self {
        Self::new()
    }
}

fn new_bar(hidden: bool) -> indicatif::ProgressBar {
    let bar = if hidden {
        indicatif::ProgressBar::hidden()
    } else {
        indicatif::ProgressBar::new(100)
    };
    bar.set_length(100);
    bar.set_style(
        ProgressStyle::with_template(TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█░"),
    );
    bar
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_clamps_and_keeps_message() {
        let mut bar = ProgressBar::new_silent();
        bar.update(42.4, Some("| 1.5 MB/s | 2.0s"));
        assert_eq!(bar.bar.position(), 42);
        assert_eq!(bar.bar.message(), "| 1.5 MB/s | 2.0s");

        bar.update(150.0, None);
        assert_eq!(bar.bar.position(), 100);
        assert_eq!(bar.bar.message(), "| 1.5 MB/s | 2.0s");

        bar.update(-3.0, None);
        assert_eq!(bar.bar.position(), 0);
    }

    #[test]
    fn test_finish_starts_a_fresh_bar() {
        let mut bar = ProgressBar::new_silent();
        bar.update(80.0, Some("audio"));
        bar.finish();

        assert_eq!(bar.bar.position(), 0);
        assert_eq!(bar.bar.message(), "");
        assert!(!bar.bar.is_finished());
        assert_eq!(bar.bar.length(), Some(100));
    }

    #[test]
    fn test_style_template_is_valid() {
        assert!(ProgressStyle::with_template(TEMPLATE).is_ok());
    }
}
