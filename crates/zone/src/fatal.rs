//! # Fatal Errors
//!
//! The engine does not recover from allocator failures: the error is logged
//! and the process ends.

use std::fmt::Display;

/// Exit status of a fatal error.
pub const FATAL_EXIT_CODE: i32 = 1;

/// Logs `err` and terminates the process.
pub fn fatal(err: impl Display) -> ! {
    tracing::error!(error = %err, "fatal error");
    eprintln!("Error: {err}");
    std::process::exit(FATAL_EXIT_CODE)
}

/// Turns any error into a fatal one.
pub trait OrFatal<T> {
    /// Returns the value, or ends the process through [`fatal`].
    fn or_fatal(self) -> T;
}

impl<T, E: Display> OrFatal<T> for Result<T, E> {
    fn or_fatal(self) -> T {
        match self {
            Ok(value) => value,
            Err(err) => fatal(err),
        }
    }
}
