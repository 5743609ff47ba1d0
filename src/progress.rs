use std::time::Duration;

use crossterm::style::Stylize;
use indicatif::{ProgressBar, ProgressStyle};

/// A spinner for long-running stages. Clones share the same bar.
#[derive(Clone)]
pub struct Spinner {
    bar: ProgressBar,
}

impl Spinner {
    pub fn new(message: impl Into<String>) -> Self {
        let spinner = Self {
            bar: ProgressBar::new_spinner(),
        };
        spinner.resume(message);
        spinner
    }

    /// Clear the spinner so a child process can write to the terminal.
    pub fn suspend(&self) {
        self.bar.disable_steady_tick();
        self.bar.finish_and_clear();
    }

    /// Start spinning again after [`Spinner::suspend`].
    pub fn resume(&self, message: impl Into<String>) {
        self.bar.reset();
        self.bar.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.dim} {msg}")
                .unwrap(),
        );
        self.bar.set_message(message.into());
        self.bar.enable_steady_tick(Duration::from_millis(80));
    }

    /// Clear the spinner and print a `✔ message` line to stderr.
    pub fn finish(&self, message: impl Into<String>) {
        self.suspend();
        eprintln!("{} {}", "✔".green(), message.into());
    }

    /// Clear the spinner and print a `✘ message` line to stderr.
    pub fn fail(&self, message: impl Into<String>) {
        self.suspend();
        eprintln!("{} {}", "✘".red(), message.into());
    }
}
