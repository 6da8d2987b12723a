//! Backup command - save files before patching

use crate::cli::args::BackupArgs;
use crate::context::PatchContext;
use crate::error::PatchResult;
use console::style;

/// Execute the backup command
pub async fn execute(args: BackupArgs, ctx: &PatchContext) -> PatchResult<()> {
    let saved = ctx.engine().backup(&args.uuid, &args.files).await?;

    for file in &saved {
        println!(
            "{} {} ({} bytes, {})",
            style("✓").green(),
            file.path,
            file.size,
            style(&file.integrity).dim()
        );
    }
    println!(
        "Backed up {} file(s) for patch {}",
        saved.len(),
        style(&args.uuid).cyan()
    );
    Ok(())
}
