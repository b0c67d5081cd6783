//! stderr logging for the CLI.
//!
//! `-v` forces debug output; otherwise `RUST_LOG` applies, defaulting to
//! `info`. stdout is reserved for command results.

use flexi_logger::{LogSpecification, Logger, LoggerHandle};

/// Start the logger. Returns `None` if it could not be installed; the CLI
/// keeps running without logs in that case.
pub(crate) fn init(verbose: bool) -> Option<LoggerHandle> {
    let logger = if verbose {
        Ok(Logger::with(LogSpecification::debug()))
    } else {
        Logger::try_with_env_or_str("info")
    };

    match logger.and_then(|l| l.log_to_stderr().format(flexi_logger::default_format).start()) {
        Ok(handle) => Some(handle),
        Err(e) => {
            eprintln!("warning: logging disabled: {e}");
            None
        }
    }
}
