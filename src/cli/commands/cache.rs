//! Cache command - inspect the content cache

use crate::cache::CacheEntry;
use crate::cli::args::{CacheAction, CacheArgs, OutputFormat};
use crate::context::PatchContext;
use crate::error::PatchResult;
use chrono::{TimeZone, Utc};
use console::style;
use futures_util::TryStreamExt;
use std::io::{self, Write};

/// Execute the cache command
pub async fn execute(args: CacheArgs, ctx: &PatchContext) -> PatchResult<()> {
    match args.action {
        CacheAction::List { format } => list_entries(ctx, format).await,
        CacheAction::Verify => verify(ctx).await,
        CacheAction::Clear { yes } => clear(ctx, yes).await,
    }
}

async fn list_entries(ctx: &PatchContext, format: OutputFormat) -> PatchResult<()> {
    let mut entries: Vec<CacheEntry> = ctx.engine().cache().list().try_collect().await?;
    entries.sort_by(|a, b| a.key.cmp(&b.key));

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&entries)?),
        OutputFormat::Plain => {
            for entry in &entries {
                println!("{}", entry.key);
            }
        }
        OutputFormat::Table => {
            if entries.is_empty() {
                println!("Cache is empty.");
                return Ok(());
            }
            println!(
                "{:<45} {:>10} {:<20}",
                style("KEY").bold(),
                style("SIZE").bold(),
                style("CREATED").bold()
            );
            println!("{}", "-".repeat(77));
            for entry in &entries {
                let created = Utc
                    .timestamp_millis_opt(entry.time)
                    .single()
                    .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_else(|| "-".to_string());
                println!("{:<45} {:>10} {:<20}", entry.key, entry.size, created);
            }
            println!();
            println!("Total: {} entr(ies)", entries.len());
        }
    }

    Ok(())
}

async fn verify(ctx: &PatchContext) -> PatchResult<()> {
    let report = ctx.engine().cache().verify().await?;

    for key in &report.missing {
        println!("{} missing content: {}", style("✗").red(), key);
    }
    for key in &report.corrupt {
        println!("{} corrupt content: {}", style("✗").red(), key);
    }

    if report.is_clean() {
        println!("{} {} entr(ies) verified", style("✓").green(), report.checked);
    } else {
        println!(
            "{} of {} entr(ies) failed verification",
            report.missing.len() + report.corrupt.len(),
            report.checked
        );
    }
    Ok(())
}

async fn clear(ctx: &PatchContext, yes: bool) -> PatchResult<()> {
    let dir = ctx.engine().cache().dir();

    if !yes {
        print!("Delete every entry in {}? [y/N] ", dir.display());
        io::stdout().flush().ok();

        let mut input = String::new();
        io::stdin().read_line(&mut input).ok();
        if !input.trim().eq_ignore_ascii_case("y") {
            println!("Aborted.");
            return Ok(());
        }
    }

    ctx.engine().cache().clear().await?;
    println!("{} Cache cleared", style("✓").green());
    Ok(())
}
