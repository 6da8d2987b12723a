//! Cleanup command - delete the backups of a patch

use crate::cli::args::CleanupArgs;
use crate::context::PatchContext;
use crate::error::PatchResult;
use console::style;

/// Execute the cleanup command
pub async fn execute(args: CleanupArgs, ctx: &PatchContext) -> PatchResult<()> {
    let report = ctx.engine().cleanup(&args.uuid).await?;

    if !report.metadata_removed && report.removed_keys == 0 {
        println!(
            "{} No backups for patch {}",
            style("!").yellow(),
            style(&args.uuid).cyan()
        );
        return Ok(());
    }

    println!(
        "Removed {} backup(s) for patch {}",
        report.removed_keys,
        style(&args.uuid).cyan()
    );
    Ok(())
}
