//! Shared helpers for command implementations

use anyhow::Result;
use cm_core::CoreError;
use cm_db::DbError;
use cm_meta::MetaError;
use cm_runner::{CancelToken, RunnerError};
use cm_sql::SqlError;

/// How a failed command is reported: `ERROR <kind>: <details>` and an exit code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Failure {
    pub kind: &'static str,
    pub details: String,
    pub exit_code: u8,
}

impl Failure {
    /// Classify by the first typed error in the cause chain.
    ///
    /// Exit codes: 1 user or validation error, 2 I/O error, 3 ledger
    /// divergence.
    pub fn classify(err: &anyhow::Error) -> Self {
        for cause in err.chain() {
            let (kind, divergent) = if let Some(e) = cause.downcast_ref::<RunnerError>() {
                (e.kind(), e.is_divergence())
            } else if let Some(e) = cause.downcast_ref::<MetaError>() {
                (e.kind(), false)
            } else if let Some(e) = cause.downcast_ref::<DbError>() {
                (e.kind(), false)
            } else if let Some(e) = cause.downcast_ref::<SqlError>() {
                (e.kind(), false)
            } else if let Some(e) = cause.downcast_ref::<CoreError>() {
                (e.kind(), false)
            } else if cause.downcast_ref::<std::io::Error>().is_some() {
                ("IOError", false)
            } else {
                continue;
            };

            let exit_code = match (kind, divergent) {
                (_, true) => 3,
                ("IOError", _) => 2,
                _ => 1,
            };
            return Self {
                kind,
                details: describe(err),
                exit_code,
            };
        }

        Self {
            kind: "Error",
            details: describe(err),
            exit_code: 1,
        }
    }
}

/// The cause chain joined by `: `, skipping causes a parent message
/// already includes.
fn describe(err: &anyhow::Error) -> String {
    let mut out = String::new();
    for cause in err.chain() {
        let text = cause.to_string();
        if out.contains(&text) {
            continue;
        }
        if !out.is_empty() {
            out.push_str(": ");
        }
        out.push_str(&text);
    }
    out
}

/// Run blocking migration work off the async runtime.
///
/// SIGINT or SIGTERM cancels the token; the runner finishes the step in
/// flight and stops before the next one.
pub(crate) async fn run_cancellable<T, F>(work: F) -> Result<T>
where
    F: FnOnce(CancelToken) -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let cancel = CancelToken::new();
    let mut handle = tokio::task::spawn_blocking({
        let cancel = cancel.clone();
        move || work(cancel)
    });

    tokio::select! {
        joined = &mut handle => joined?,
        () = shutdown_signal() => {
            log::warn!("Interrupted, stopping after the current migration");
            cancel.cancel();
            handle.await?
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}

#[cfg(test)]
#[path = "common_test.rs"]
mod tests;
