//! Up command implementation

use anyhow::Result;

use crate::cli::{GlobalArgs, UpArgs};
use crate::commands::common::run_cancellable;
use crate::context::RuntimeContext;

/// Execute the up command
pub async fn execute(args: &UpArgs, global: &GlobalArgs) -> Result<()> {
    let target = args.to;
    let global = global.clone();

    run_cancellable(move |cancel| {
        let ctx = RuntimeContext::open(&global)?;
        let result = ctx.runner(cancel).apply(target);
        ctx.print_last_applied();

        let report = result?;
        if report.cancelled {
            log::warn!("Stopped early; {} migration(s) still pending", pending(&ctx));
        } else if report.steps.is_empty() {
            log::info!("Nothing to apply");
        }
        Ok(())
    })
    .await
}

fn pending(ctx: &RuntimeContext) -> usize {
    let applied = ctx
        .db
        .applied_migrations()
        .map(|records| records.len())
        .unwrap_or_default();
    ctx.registry.len().saturating_sub(applied)
}
