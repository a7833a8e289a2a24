//! Log management commands
//!
//! Size reporting, ZIP export and clearing of the current log file.

use std::io::Write;
use std::path::PathBuf;

use anyhow::Context;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use super::store::{LogStore, DEFAULT_LOG_FILE};
use super::backend::split_path;

/// Information about the log file
#[derive(Debug, Clone, serde::Serialize)]
pub struct LogInfo {
    pub location: Option<String>,
    pub enabled: bool,
    pub exists: bool,
    pub size_bytes: u64,
    pub size_human: String,
    pub max_bytes: u64,
}

/// Format bytes into human-readable string
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}

/// Get information about the log file
pub fn log_info(store: &LogStore) -> anyhow::Result<LogInfo> {
    let size = store
        .log_size()
        .context("Failed to get log size")?;

    Ok(LogInfo {
        location: store.location(),
        enabled: store.is_enabled(),
        exists: size.is_some(),
        size_bytes: size.unwrap_or(0),
        size_human: format_bytes(size.unwrap_or(0)),
        max_bytes: store.max_bytes(),
    })
}

/// Export the log as a ZIP file
///
/// The archive holds the log file and a short system info file. If no path is
/// provided, saves to the user's Downloads folder.
pub fn export_logs(store: &LogStore, output_path: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    let contents = store
        .read_log()
        .context("Failed to read log file")?
        .ok_or_else(|| anyhow::anyhow!("No log file found to export"))?;

    let output_path = match output_path {
        Some(path) => path,
        None => {
            let downloads = dirs::download_dir()
                .ok_or_else(|| anyhow::anyhow!("Could not determine Downloads folder"))?;
            let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
            downloads.join(format!("treelog_{}.zip", timestamp))
        }
    };

    let file = std::fs::File::create(&output_path)
        .with_context(|| format!("Failed to create ZIP file {:?}", output_path))?;

    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated)
        .compression_level(Some(6));

    let path = store.path();
    let file_name = match split_path(&path).1 {
        "" => DEFAULT_LOG_FILE,
        name => name,
    };
    zip.start_file(file_name, options)
        .context("Failed to add log file to ZIP")?;
    zip.write_all(&contents).context("Failed to write to ZIP")?;

    zip.start_file("system_info.txt", options)
        .context("Failed to add system info to ZIP")?;
    zip.write_all(generate_system_info(store).as_bytes())
        .context("Failed to write system info")?;

    zip.finish().context("Failed to finish ZIP file")?;

    tracing::info!("Logs exported to: {:?}", output_path);
    Ok(output_path)
}

/// Generate system information for debugging
fn generate_system_info(store: &LogStore) -> String {
    let mut info = String::new();

    info.push_str("=== treelog export ===\n\n");
    info.push_str(&format!("Generated: {}\n", chrono::Local::now().format("%Y-%m-%d %H:%M:%S")));
    info.push_str(&format!("Version: {}\n", env!("CARGO_PKG_VERSION")));
    info.push_str(&format!("OS: {}\n", std::env::consts::OS));
    info.push_str(&format!("Architecture: {}\n", std::env::consts::ARCH));
    if let Some(location) = store.location() {
        info.push_str(&format!("Log location: {}\n", location));
    }
    info.push_str(&format!("Rotation limit: {}\n", format_bytes(store.max_bytes())));

    info.push_str("\n=== End ===\n");
    info
}

/// Delete the log file
pub fn clear_log(store: &LogStore) -> anyhow::Result<bool> {
    let removed = store.clear_log().context("Failed to clear log file")?;
    tracing::info!("Cleared log file: {}", removed);
    Ok(removed)
}
