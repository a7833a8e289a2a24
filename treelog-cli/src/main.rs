use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use treelog::logging::{self, init_diagnostics};
use treelog::provider::FsProvider;
use treelog::settings::{default_settings_path, load_settings, save_settings, BackendSettings};
use treelog::{LogSettings, LogStore, Severity, StorageHandle, TreeResolver};

#[derive(Parser)]
#[command(name = "treelog", version, about = "Append-only log files on document trees")]
struct Cli {
    /// Settings file (defaults to the platform config directory)
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Write a settings file
    Init {
        /// Locate the log by name anywhere below this directory
        #[arg(long, conflicts_with = "legacy", required_unless_present = "legacy")]
        tree: Option<PathBuf>,
        /// Plain file below this directory, rotated by size
        #[arg(long)]
        legacy: Option<PathBuf>,
        /// Log file path relative to the root
        #[arg(long)]
        path: Option<String>,
        /// Rotation limit for the legacy backend
        #[arg(long)]
        max_bytes: Option<u64>,
        /// Keep logging switched off
        #[arg(long)]
        disabled: bool,
    },
    /// Append one record
    Log {
        level: Severity,
        tag: String,
        message: String,
    },
    /// Create the log file if it is missing
    Provision,
    /// Breadth-first search for a file below the root
    Find { name: String },
    /// Create every missing directory along a path below the root
    Mkdirs { path: String },
    /// Show where the log is and how large it has grown
    Info,
    /// Zip the log for support
    Export {
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Delete the log file
    Clear,
}

fn main() {
    if let Err(e) = init_diagnostics("warn", None) {
        eprintln!("Failed to initialize diagnostics: {:#}", e);
    }

    if let Err(e) = run(Cli::parse()) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let settings_path = match cli.settings {
        Some(path) => path,
        None => default_settings_path()?,
    };

    if let Cmd::Init {
        tree,
        legacy,
        path,
        max_bytes,
        disabled,
    } = cli.cmd
    {
        return cmd_init(&settings_path, tree, legacy, path, max_bytes, disabled);
    }

    let settings = load_settings(&settings_path)?;
    tracing::debug!("Loaded settings from {:?}", settings_path);

    let store = LogStore::global();
    settings.apply(store)?;

    match cli.cmd {
        Cmd::Init { .. } => Ok(()),
        Cmd::Log {
            level,
            tag,
            message,
        } => {
            store
                .append(&tag, &message, level)
                .with_context(|| format!("Failed to write to {}", describe(store)))?;
            Ok(())
        }
        Cmd::Provision => {
            store
                .provision_log_file()
                .context("Failed to provision log file")?;
            println!("{}", describe(store));
            Ok(())
        }
        Cmd::Find { name } => {
            let (resolver, root) = open_tree(&settings)?;
            match resolver.find_file_by_name(&root, &name) {
                Some(handle) => {
                    println!("{}", handle.document_id);
                    Ok(())
                }
                None => anyhow::bail!("{} not found", name),
            }
        }
        Cmd::Mkdirs { path } => {
            let (resolver, root) = open_tree(&settings)?;
            let dir = resolver
                .resolve_path(&root, &path)
                .with_context(|| format!("Failed to create {}", path))?;
            println!("{}", dir.document_id);
            Ok(())
        }
        Cmd::Info => {
            let info = logging::log_info(store)?;
            println!("{}", serde_json::to_string_pretty(&info)?);
            Ok(())
        }
        Cmd::Export { output } => {
            let written = logging::export_logs(store, output)?;
            println!("{}", written.display());
            Ok(())
        }
        Cmd::Clear => {
            if logging::clear_log(store)? {
                println!("Log cleared");
            } else {
                println!("No log file");
            }
            Ok(())
        }
    }
}

fn cmd_init(
    settings_path: &std::path::Path,
    tree: Option<PathBuf>,
    legacy: Option<PathBuf>,
    path: Option<String>,
    max_bytes: Option<u64>,
    disabled: bool,
) -> Result<()> {
    let mut settings = load_settings(settings_path)?;

    settings.backend = match (tree, legacy) {
        (Some(root_dir), _) => BackendSettings::Tree { root_dir },
        (None, Some(base_dir)) => BackendSettings::Legacy { base_dir },
        (None, None) => anyhow::bail!("Either --tree or --legacy is required"),
    };
    if let Some(path) = path {
        settings.path = logging::normalize_path(&path);
    }
    if let Some(max_bytes) = max_bytes {
        settings.max_bytes = max_bytes;
    }
    settings.enabled = !disabled;

    // Fail early on a root that cannot be opened.
    settings.root()?;

    save_settings(settings_path, &settings)?;
    println!("Saved settings to {}", settings_path.display());
    Ok(())
}

/// Provider over whichever directory the settings point at
fn open_tree(settings: &LogSettings) -> Result<(TreeResolver, StorageHandle)> {
    let dir = match &settings.backend {
        BackendSettings::Tree { root_dir } => root_dir,
        BackendSettings::Legacy { base_dir } => base_dir,
    };
    let provider = FsProvider::new(dir.clone())
        .with_context(|| format!("Failed to open {:?}", dir))?;
    let root = provider.root_handle();
    Ok((TreeResolver::new(Arc::new(provider)), root))
}

fn describe(store: &LogStore) -> String {
    store.location().unwrap_or_else(|| store.path())
}
