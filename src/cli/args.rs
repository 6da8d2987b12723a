//! CLI argument definitions using clap derive

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// socket-patch - back up, restore and track dependency patches
///
/// Debugging harness over the backup engine and the patch manifest.
#[derive(Parser, Debug)]
#[command(name = "socket-patch")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "SOCKET_PATCH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Project root holding .socket/manifest.json (defaults to current directory)
    #[arg(short = 'C', long, global = true)]
    pub project: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Back up files before patching them
    Backup(BackupArgs),

    /// Restore the original files of a patch
    Restore(RestoreArgs),

    /// Delete the backups of a patch
    Cleanup(CleanupArgs),

    /// List backed up patches, or the files of one patch
    List(ListArgs),

    /// Remove backups older than a number of days
    Prune(PruneArgs),

    /// Inspect or edit the patch manifest
    Manifest(ManifestArgs),

    /// Compare patched files on disk with the manifest
    Status(StatusArgs),

    /// Inspect the content cache
    Cache(CacheArgs),
}

/// Arguments for the backup command
#[derive(Parser, Debug)]
pub struct BackupArgs {
    /// Patch uuid
    pub uuid: String,

    /// Files to back up, in order
    #[arg(required = true)]
    pub files: Vec<PathBuf>,
}

/// Arguments for the restore command
#[derive(Parser, Debug)]
pub struct RestoreArgs {
    /// Patch uuid
    pub uuid: String,

    /// Restore only this file
    #[arg(long)]
    pub file: Option<String>,

    /// Restore every file or none
    #[arg(long)]
    pub strict: bool,
}

/// Arguments for the cleanup command
#[derive(Parser, Debug)]
pub struct CleanupArgs {
    /// Patch uuid
    pub uuid: String,
}

/// Arguments for the list command
#[derive(Parser, Debug)]
pub struct ListArgs {
    /// Show the files of this patch
    pub uuid: Option<String>,

    /// Output format
    #[arg(short, long, default_value = "table")]
    pub format: OutputFormat,
}

/// Arguments for the prune command
#[derive(Parser, Debug)]
pub struct PruneArgs {
    /// Remove backups older than N days (default: from config)
    #[arg(long)]
    pub days: Option<u32>,
}

/// Arguments for the manifest command
#[derive(Parser, Debug)]
pub struct ManifestArgs {
    /// Subcommand for manifest
    #[command(subcommand)]
    pub action: ManifestAction,
}

/// Manifest subcommands
#[derive(Subcommand, Debug)]
pub enum ManifestAction {
    /// Show the patches in the manifest
    Show {
        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Exit successfully if a package has a patch
    Has {
        /// Package identifier (e.g. pkg:npm/lodash@4.17.20)
        package_id: String,
    },

    /// Remove the patch for a package
    Remove {
        /// Package identifier
        package_id: String,

        /// Also delete the local backups of the removed patch
        #[arg(long)]
        cleanup: bool,
    },
}

/// Arguments for the status command
#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// Package identifier
    pub package_id: String,

    /// Directory the manifest file paths are relative to (defaults to the project root)
    #[arg(long)]
    pub base: Option<PathBuf>,
}

/// Arguments for the cache command
#[derive(Parser, Debug)]
pub struct CacheArgs {
    /// Subcommand for cache
    #[command(subcommand)]
    pub action: CacheAction,
}

/// Cache subcommands
#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// List every cache entry (walks the whole index)
    List {
        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Check every entry against its integrity
    Verify,

    /// Delete every entry and blob
    Clear {
        /// Skip confirmation
        #[arg(short, long)]
        yes: bool,
    },
}

/// Output format for listing commands
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table
    Table,
    /// JSON output
    Json,
    /// Simple text (one per line)
    Plain,
}
