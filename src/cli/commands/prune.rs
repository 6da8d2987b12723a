//! Prune command - drop old backups

use crate::cli::args::PruneArgs;
use crate::config::Config;
use crate::context::PatchContext;
use crate::error::PatchResult;
use console::style;

/// Execute the prune command
pub async fn execute(args: PruneArgs, ctx: &PatchContext, config: &Config) -> PatchResult<()> {
    let days = args.days.unwrap_or(config.restore.prune_after_days);
    if days == 0 {
        println!(
            "{} Pruning is disabled (set restore.prune_after_days or pass --days)",
            style("!").yellow()
        );
        return Ok(());
    }

    let pruned = ctx
        .engine()
        .prune(chrono::Duration::days(i64::from(days)))
        .await?;

    for uuid in &pruned {
        println!("{} {}", style("-").dim(), uuid);
    }
    println!("Pruned {} patch backup(s) older than {} day(s)", pruned.len(), days);
    Ok(())
}
