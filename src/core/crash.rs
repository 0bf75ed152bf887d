//! Crash boundary around caller-supplied code

use std::backtrace::Backtrace;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// A panic caught at a worker boundary
#[derive(Debug)]
pub struct CrashFault {
    /// Panic payload rendered as text
    pub message: String,
    /// Stack of the worker at the point the panic was caught.
    ///
    /// Only resolved when `RUST_BACKTRACE` is set.
    pub backtrace: Backtrace,
}

impl fmt::Display for CrashFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Run `f`, turning a panic into a [`CrashFault`]
pub fn isolate<R>(f: impl FnOnce() -> R) -> Result<R, CrashFault> {
    catch_unwind(AssertUnwindSafe(f)).map_err(|panic_info| CrashFault {
        message: panic_message(panic_info.as_ref()),
        backtrace: Backtrace::capture(),
    })
}

/// Extract a readable message from a panic payload
pub fn panic_message(panic_info: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic_info.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic_info.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}
