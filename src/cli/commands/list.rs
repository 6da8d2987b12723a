//! List command - show backed up patches

use crate::backup::BackupEntry;
use crate::cli::args::{ListArgs, OutputFormat};
use crate::context::PatchContext;
use crate::error::PatchResult;
use console::style;
use std::collections::BTreeMap;

/// Execute the list command
pub async fn execute(args: ListArgs, ctx: &PatchContext) -> PatchResult<()> {
    match args.uuid {
        Some(uuid) => list_files(ctx, &uuid, args.format).await,
        None => list_patches(ctx, args.format).await,
    }
}

async fn list_patches(ctx: &PatchContext, format: OutputFormat) -> PatchResult<()> {
    let uuids = ctx.engine().metadata().list_patch_uuids().await?;

    match format {
        OutputFormat::Json => {
            let stats = ctx.engine().stats().await?;
            let json = serde_json::json!({ "patches": uuids, "stats": stats });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        OutputFormat::Plain => {
            for uuid in &uuids {
                println!("{}", uuid);
            }
        }
        OutputFormat::Table => {
            if uuids.is_empty() {
                println!("No patch backups found.");
                return Ok(());
            }
            let stats = ctx.engine().stats().await?;
            for uuid in &uuids {
                println!("{}", style(uuid).cyan());
            }
            println!();
            println!(
                "{} patch(es), {} file(s), {} bytes",
                stats.patch_count, stats.file_count, stats.total_size
            );
        }
    }

    Ok(())
}

async fn list_files(ctx: &PatchContext, uuid: &str, format: OutputFormat) -> PatchResult<()> {
    let backups = ctx.engine().list_backups(uuid).await?;

    match format {
        OutputFormat::Table => print_table(&backups),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&backups)?),
        OutputFormat::Plain => {
            for path in backups.keys() {
                println!("{}", path);
            }
        }
    }

    Ok(())
}

fn print_table(backups: &BTreeMap<String, BackupEntry>) {
    println!(
        "{:<50} {:>10} {:<20}",
        style("PATH").bold(),
        style("SIZE").bold(),
        style("BACKED UP").bold()
    );
    println!("{}", "-".repeat(82));

    for (path, entry) in backups {
        println!(
            "{:<50} {:>10} {:<20}",
            path,
            entry.size,
            entry.backed_up_at.format("%Y-%m-%d %H:%M")
        );
    }

    println!();
    println!("{} file(s)", backups.len());
}
