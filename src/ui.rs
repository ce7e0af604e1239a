//! User-facing progress reporting.
//!
//! Diagnostics go through `tracing`; the [`Ui`] carries the short progress
//! lines an operator watches while a build runs.

use std::io::{self, Write};

/// Sink for progress and error lines shown to the operator.
///
/// Implementations must tolerate concurrent calls from replication tasks.
pub trait Ui: Send + Sync {
    /// Announces a new phase of work.
    fn say(&self, message: &str);

    /// Reports supplementary detail for the current phase.
    fn message(&self, message: &str);

    /// Reports a failure.
    fn error(&self, message: &str);
}

/// Writes progress to stdout and errors to stderr.
#[derive(Clone, Copy, Debug, Default)]
pub struct ConsoleUi;

impl ConsoleUi {
    fn emit(mut target: impl Write, prefix: &str, message: &str) {
        writeln!(target, "{prefix}{message}").ok();
    }
}

impl Ui for ConsoleUi {
    fn say(&self, message: &str) {
        Self::emit(io::stdout().lock(), "==> ", message);
    }

    fn message(&self, message: &str) {
        Self::emit(io::stdout().lock(), "    ", message);
    }

    fn error(&self, message: &str) {
        Self::emit(io::stderr().lock(), "==> ", message);
    }
}
