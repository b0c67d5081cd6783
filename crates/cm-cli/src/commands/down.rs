//! Down command implementation

use anyhow::Result;

use crate::cli::{DownArgs, GlobalArgs};
use crate::commands::common::run_cancellable;
use crate::context::RuntimeContext;

/// Execute the down command
pub async fn execute(args: &DownArgs, global: &GlobalArgs) -> Result<()> {
    let target = args.to;
    let global = global.clone();

    run_cancellable(move |cancel| {
        let ctx = RuntimeContext::open(&global)?;
        let result = ctx.runner(cancel).revert(target);
        ctx.print_last_applied();

        let report = result?;
        if report.cancelled {
            log::warn!("Stopped early after reverting {} migration(s)", report.steps.len());
        } else if report.steps.is_empty() {
            log::info!("Nothing to revert");
        }
        Ok(())
    })
    .await
}
