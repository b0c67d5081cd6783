//! History-sync command implementation

use anyhow::Result;

use crate::cli::GlobalArgs;
use crate::commands::common::run_cancellable;
use crate::context::RuntimeContext;

/// Execute the history-sync command
pub async fn execute(global: &GlobalArgs) -> Result<()> {
    let global = global.clone();

    run_cancellable(move |cancel| {
        let ctx = RuntimeContext::open(&global)?;
        let removed = ctx.runner(cancel).history_sync()?;
        if removed.is_empty() {
            log::info!("Ledger already matches the migration files");
        } else {
            log::info!("Removed {} ledger row(s): {removed:?}", removed.len());
        }
        ctx.print_last_applied();
        Ok(())
    })
    .await
}
