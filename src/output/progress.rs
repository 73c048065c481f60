//! Progress indicators using indicatif

#![allow(clippy::expect_used)] // Templates are compile-time constants

use std::cell::RefCell;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize as _;

use crate::lifecycle::Progress;
use crate::output::OutputContext;

/// Create a spinner for indeterminate progress.
///
/// # Panics
///
/// Panics if the spinner template string is invalid (it is a compile-time
/// constant and will not panic).
#[must_use]
pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"])
            .template("{spinner:.cyan} {msg}")
            .expect("valid template"),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

/// Finish a spinner with a checkmark on the left.
pub fn finish_ok(pb: &ProgressBar, msg: &str) {
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{prefix} {msg}")
            .expect("valid template"),
    );
    pb.set_prefix("✓");
    pb.finish_with_message(msg.to_string());
}

/// Finish a spinner with an error marker.
pub fn finish_error(pb: &ProgressBar, msg: &str) {
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{prefix} {msg}")
            .expect("valid template"),
    );
    pb.set_prefix("✗");
    pb.finish_with_message(msg.to_string());
}

/// Renders lifecycle steps as successive spinners, one per step.
///
/// Each new step finishes the previous spinner with a checkmark. When
/// progress indicators are off (quiet mode, non-TTY) steps degrade to
/// plain info lines. An error unwinding past an active spinner finishes
/// it with the error marker on drop.
pub struct StepProgress<'a> {
    output: &'a OutputContext,
    active: RefCell<Option<ProgressBar>>,
}

impl<'a> StepProgress<'a> {
    #[must_use]
    pub fn new(output: &'a OutputContext) -> Self {
        Self {
            output,
            active: RefCell::new(None),
        }
    }

    fn finish_current(&self) {
        if let Some(pb) = self.active.borrow_mut().take() {
            let msg = pb.message();
            finish_ok(&pb, &msg);
        }
    }

    /// Close the last step's spinner with a checkmark.
    pub fn done(&self) {
        self.finish_current();
    }
}

impl Progress for StepProgress<'_> {
    fn step(&self, message: &str) {
        self.finish_current();
        if self.output.show_progress() {
            *self.active.borrow_mut() = Some(spinner(message));
        } else {
            self.output.info(message);
        }
    }

    fn warn(&self, message: &str) {
        if let Some(pb) = self.active.borrow().as_ref() {
            pb.println(format!(
                "  {} {message}",
                "⚠".style(self.output.styles.warning)
            ));
        } else {
            self.output.warn(message);
        }
    }
}

impl Drop for StepProgress<'_> {
    fn drop(&mut self) {
        if let Some(pb) = self.active.borrow_mut().take() {
            let msg = pb.message();
            finish_error(&pb, &msg);
        }
    }
}
