//! Status command - compare patched files on disk with the manifest

use crate::cli::args::StatusArgs;
use crate::context::PatchContext;
use crate::error::{PatchError, PatchResult};
use crate::manifest::{status::patch_status, FileStatus};
use console::style;
use std::path::Path;

/// Execute the status command
pub async fn execute(args: StatusArgs, ctx: &PatchContext, project: &Path) -> PatchResult<()> {
    let record = ctx
        .manifest(project)
        .get_patch(&args.package_id)
        .await?
        .ok_or_else(|| PatchError::PatchNotFound(args.package_id.clone()))?;

    let base = args.base.as_deref().unwrap_or(project);
    let status = patch_status(base, &record).await?;

    for (path, file_status) in &status.files {
        let styled = match file_status {
            FileStatus::Applied => style(file_status.to_string()).green(),
            FileStatus::Original => style(file_status.to_string()).yellow(),
            FileStatus::Modified => style(file_status.to_string()).red(),
            FileStatus::Missing => style(file_status.to_string()).dim(),
        };
        println!("{:<10} {}", styled, path);
    }

    let has_backup = ctx.engine().metadata().load(&record.uuid).await?.is_some();
    println!();
    println!(
        "Patch {} ({}), local backup: {}",
        style(&record.uuid).cyan(),
        if status.is_applied() { "applied" } else { "not fully applied" },
        if has_backup { "yes" } else { "no" }
    );
    Ok(())
}
