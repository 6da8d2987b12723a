//! Restore command - put original files back

use crate::cli::args::RestoreArgs;
use crate::context::PatchContext;
use crate::error::PatchResult;
use console::style;

/// Execute the restore command
pub async fn execute(args: RestoreArgs, ctx: &PatchContext) -> PatchResult<()> {
    if let Some(file) = &args.file {
        ctx.engine().restore_file(&args.uuid, file).await?;
        println!("{} Restored {}", style("✓").green(), file);
        return Ok(());
    }

    let engine = ctx.engine().clone();
    let engine = if args.strict {
        engine.with_strict_restore(true)
    } else {
        engine
    };

    let report = engine.restore(&args.uuid).await?;

    for path in &report.restored {
        println!("{} {}", style("✓").green(), path);
    }
    for (path, err) in &report.failed {
        println!("{} {}: {}", style("✗").red(), path, err);
    }

    report.into_result().map(|_| ())
}
