//! Status command implementation

use anyhow::Result;
use cm_runner::{StepState, StepStatus};

use crate::cli::{GlobalArgs, StatusArgs};
use crate::commands::common::run_cancellable;
use crate::context::RuntimeContext;

/// Execute the status command
pub async fn execute(args: &StatusArgs, global: &GlobalArgs) -> Result<()> {
    let json = args.json;
    let global = global.clone();

    run_cancellable(move |cancel| {
        let ctx = RuntimeContext::open(&global)?;
        let rows = ctx.runner(cancel).status()?;

        if json {
            println!("{}", serde_json::to_string_pretty(&rows)?);
        } else {
            print_table(&rows);
        }
        Ok(())
    })
    .await
}

fn print_table(rows: &[StepStatus]) {
    if rows.is_empty() {
        println!("No migrations found.");
        return;
    }

    let id_width = rows
        .iter()
        .map(|r| r.id.to_string().len())
        .max()
        .unwrap_or(2)
        .max(2);
    println!("{:<id_width$}  {:<9}  {:<24}  FILE", "ID", "STATE", "APPLIED AT");
    for row in rows {
        println!(
            "{:<id_width$}  {:<9}  {:<24}  {}",
            row.id,
            state_label(row.state),
            row.applied_at.as_deref().unwrap_or("-"),
            row.file
        );
    }

    let pending = rows.iter().filter(|r| r.state == StepState::Pending).count();
    let divergent = rows.iter().filter(|r| r.state == StepState::Divergent).count();
    println!();
    println!("{} migration(s), {pending} pending", rows.len());
    if divergent > 0 {
        println!("{divergent} applied migration(s) have no file; see `migrate history-sync`");
    }
}

fn state_label(state: StepState) -> &'static str {
    match state {
        StepState::Pending => "pending",
        StepState::Applied => "applied",
        StepState::Divergent => "divergent",
    }
}
