//! Manifest command - inspect and edit the patch manifest

use crate::cli::args::{ManifestAction, ManifestArgs, OutputFormat};
use crate::context::PatchContext;
use crate::error::{PatchError, PatchResult};
use crate::manifest::PatchManifest;
use console::style;
use std::path::Path;

/// Execute the manifest command
pub async fn execute(args: ManifestArgs, ctx: &PatchContext, project: &Path) -> PatchResult<()> {
    let store = ctx.manifest(project);

    match args.action {
        ManifestAction::Show { format } => {
            let manifest = store.read().await?;
            match format {
                OutputFormat::Table => print_table(&manifest),
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&manifest)?),
                OutputFormat::Plain => {
                    for package_id in manifest.patches.keys() {
                        println!("{}", package_id);
                    }
                }
            }
            Ok(())
        }
        ManifestAction::Has { package_id } => {
            if store.has_patch(&package_id).await? {
                println!("{}", package_id);
                Ok(())
            } else {
                Err(PatchError::PatchNotFound(package_id))
            }
        }
        ManifestAction::Remove {
            package_id,
            cleanup,
        } => {
            let record = store.get_patch(&package_id).await?;
            if !store.remove_patch(&package_id).await? {
                return Err(PatchError::PatchNotFound(package_id));
            }
            println!("Removed patch for {}", style(&package_id).cyan());

            if let (true, Some(record)) = (cleanup, record) {
                let report = ctx.engine().cleanup(&record.uuid).await?;
                println!("Removed {} backup(s)", report.removed_keys);
            }
            Ok(())
        }
    }
}

fn print_table(manifest: &PatchManifest) {
    if manifest.patches.is_empty() {
        println!("No patches in manifest.");
        return;
    }

    println!(
        "{:<45} {:<38} {:>5} {:<8}",
        style("PACKAGE").bold(),
        style("UUID").bold(),
        style("FILES").bold(),
        style("TIER").bold()
    );
    println!("{}", "-".repeat(99));

    for (package_id, record) in &manifest.patches {
        println!(
            "{:<45} {:<38} {:>5} {:<8}",
            package_id,
            record.uuid,
            record.files.len(),
            record.tier
        );
    }

    println!();
    println!("{} patch(es), manifest version {}", manifest.patches.len(), manifest.version);
}
