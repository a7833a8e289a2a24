//! Log Store
//!
//! Holds the logging configuration and serializes every write. The resolved
//! tree document is cached together with the configuration generation it was
//! resolved under, so a new root or path is never written through a stale handle.

use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use super::backend::{split_path, LogBackend, LogRoot};
use super::diagnostics::{DiagnosticSink, TracingSink};
use super::line::{format_line_now, with_error};
use super::Severity;
use crate::error::LogFault;
use crate::provider::StorageHandle;

/// Default log file name, also appended to paths ending in `/`
pub const DEFAULT_LOG_FILE: &str = "ApplicationLog.txt";

/// Size past which the legacy backend starts a fresh file (2 MiB)
pub const DEFAULT_MAX_BYTES: u64 = 2 * 1024 * 1024;

const TAG: &str = "Log";

/// Called after every successful write with `(tag, message)`
pub type LogListener = Arc<dyn Fn(&str, &str) + Send + Sync>;

static GLOBAL_STORE: OnceLock<LogStore> = OnceLock::new();

#[derive(Debug, Clone)]
struct ResolvedFile {
    generation: u64,
    handle: StorageHandle,
}

struct LogConfiguration {
    enabled: bool,
    path: String,
    max_bytes: u64,
    backend: Option<LogBackend>,
    /// Bumped whenever the root or path changes
    generation: u64,
    resolved_file: Option<ResolvedFile>,
    listener: Option<LogListener>,
}

impl Default for LogConfiguration {
    fn default() -> Self {
        Self {
            enabled: false,
            path: DEFAULT_LOG_FILE.to_string(),
            max_bytes: DEFAULT_MAX_BYTES,
            backend: None,
            generation: 0,
            resolved_file: None,
            listener: None,
        }
    }
}

impl LogConfiguration {
    fn invalidate(&mut self) {
        self.generation += 1;
        self.resolved_file = None;
    }

    fn file_name(&self) -> &str {
        split_path(&self.path).1
    }

    fn cached_handle(&self) -> Option<StorageHandle> {
        self.resolved_file
            .as_ref()
            .filter(|r| r.generation == self.generation)
            .map(|r| r.handle.clone())
    }

    /// Tree file handle, from the cache or a fresh search
    fn tree_file(&mut self) -> Result<StorageHandle, LogFault> {
        if let Some(handle) = self.cached_handle() {
            return Ok(handle);
        }
        let file_name = self.file_name().to_string();
        let Some(LogBackend::TreeProvider(backend)) = self.backend.as_ref() else {
            return Err(LogFault::Unconfigured);
        };

        let handle = backend
            .resolve(&file_name)
            .ok_or(LogFault::Unresolved { file_name })?;
        self.resolved_file = Some(ResolvedFile {
            generation: self.generation,
            handle: handle.clone(),
        });
        Ok(handle)
    }

    fn write(&mut self, line: &str) -> Result<(), LogFault> {
        match self.backend.as_ref() {
            None => Err(LogFault::Unconfigured),
            Some(LogBackend::LegacyPath(backend)) => {
                if backend.append(&self.path, self.max_bytes, line)? {
                    tracing::debug!("Rotated {} after it exceeded {} bytes", self.path, self.max_bytes);
                }
                Ok(())
            }
            Some(LogBackend::TreeProvider(_)) => {
                let file = self.tree_file()?;
                let Some(LogBackend::TreeProvider(backend)) = self.backend.as_ref() else {
                    return Err(LogFault::Unconfigured);
                };
                backend.append(&file, line).map_err(LogFault::from)
            }
        }
    }
}

/// Append-only log with a switchable backend
pub struct LogStore {
    config: Mutex<LogConfiguration>,
    sink: Arc<dyn DiagnosticSink>,
}

impl Default for LogStore {
    fn default() -> Self {
        Self::new(Arc::new(TracingSink))
    }
}

impl LogStore {
    pub fn new(sink: Arc<dyn DiagnosticSink>) -> Self {
        Self {
            config: Mutex::new(LogConfiguration::default()),
            sink,
        }
    }

    /// Process-wide store reporting through `tracing`
    pub fn global() -> &'static LogStore {
        GLOBAL_STORE.get_or_init(LogStore::default)
    }

    fn lock(&self) -> MutexGuard<'_, LogConfiguration> {
        self.config.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Set the enabled flag and optionally a new root. `None` keeps the
    /// current root; disabling never discards it.
    pub fn configure(&self, root: Option<LogRoot>, enabled: bool) {
        let mut config = self.lock();
        config.enabled = enabled;
        if let Some(root) = root {
            Self::replace_root(&mut config, root);
        }
    }

    pub fn set_root(&self, root: LogRoot) {
        let mut config = self.lock();
        Self::replace_root(&mut config, root);
    }

    fn replace_root(config: &mut LogConfiguration, root: LogRoot) {
        let unchanged = config
            .backend
            .as_ref()
            .map(|b| b.root().same_as(&root))
            .unwrap_or(false);
        if unchanged {
            return;
        }
        let backend = root.into_backend();
        tracing::debug!("Log root set, backend {}", backend.name());
        config.backend = Some(backend);
        config.invalidate();
    }

    /// Set the log file path relative to the root. A trailing `/` names a
    /// directory holding the default file; a missing `.txt` is appended.
    pub fn set_path(&self, path: &str) {
        let normalized = normalize_path(path);
        let mut config = self.lock();
        if config.path != normalized {
            config.path = normalized;
            config.invalidate();
        }
    }

    pub fn path(&self) -> String {
        self.lock().path.clone()
    }

    pub fn set_max_bytes(&self, max_bytes: u64) {
        self.lock().max_bytes = max_bytes;
    }

    pub fn max_bytes(&self) -> u64 {
        self.lock().max_bytes
    }

    pub fn is_enabled(&self) -> bool {
        self.lock().enabled
    }

    pub fn root(&self) -> Option<LogRoot> {
        self.lock().backend.as_ref().map(LogBackend::root)
    }

    pub fn set_listener<F>(&self, listener: F)
    where
        F: Fn(&str, &str) + Send + Sync + 'static,
    {
        self.lock().listener = Some(Arc::new(listener));
    }

    pub fn remove_listener(&self) {
        self.lock().listener = None;
    }

    /// Write one line `"<timestamp> [<tag>]:<message>\r\n"`.
    ///
    /// Disabled logging returns [`LogFault::Disabled`] without touching storage.
    /// Storage failures are reported to the diagnostic sink and returned.
    pub fn append(&self, tag: &str, message: &str, severity: Severity) -> Result<(), LogFault> {
        let listener = {
            let mut config = self.lock();
            if !config.enabled {
                return Err(LogFault::Disabled);
            }

            let line = format_line_now(tag, message);
            match config.write(&line) {
                Ok(()) => config.listener.clone(),
                Err(fault) => {
                    drop(config);
                    self.report(severity, &fault);
                    return Err(fault);
                }
            }
        };

        if let Some(listener) = listener {
            listener(tag, message);
        }
        Ok(())
    }

    fn report(&self, severity: Severity, fault: &LogFault) {
        match fault {
            LogFault::Disabled => {}
            LogFault::Unconfigured => {
                self.sink
                    .emit(TAG, "Unable to log to file. No log root configured.", None);
            }
            LogFault::Unresolved { file_name } => {
                tracing::debug!("Skipping {} record, {} not provisioned", severity, file_name);
            }
            LogFault::WriteFailed(err) => {
                self.sink.emit(TAG, "Unable to log exception to file.", Some(err));
            }
        }
    }

    fn log(
        &self,
        severity: Severity,
        tag: &str,
        message: &str,
        error: Option<&(dyn std::error::Error + 'static)>,
    ) {
        if !self.is_enabled() {
            return;
        }
        self.sink.echo(severity, tag, message);

        let text = match error {
            Some(err) => with_error(message, err),
            None => message.to_string(),
        };
        let _ = self.append(tag, &text, severity);
    }

    pub fn verbose(&self, tag: &str, message: &str, error: Option<&(dyn std::error::Error + 'static)>) {
        self.log(Severity::Verbose, tag, message, error);
    }

    pub fn debug(&self, tag: &str, message: &str, error: Option<&(dyn std::error::Error + 'static)>) {
        self.log(Severity::Debug, tag, message, error);
    }

    pub fn info(&self, tag: &str, message: &str, error: Option<&(dyn std::error::Error + 'static)>) {
        self.log(Severity::Info, tag, message, error);
    }

    pub fn warn(&self, tag: &str, message: &str, error: Option<&(dyn std::error::Error + 'static)>) {
        self.log(Severity::Warn, tag, message, error);
    }

    pub fn error(&self, tag: &str, message: &str, error: Option<&(dyn std::error::Error + 'static)>) {
        self.log(Severity::Error, tag, message, error);
    }

    /// Create the log file explicitly. Writes never create it on the tree
    /// backend, so callers provision it once after granting the root.
    pub fn provision_log_file(&self) -> Result<(), LogFault> {
        let mut config = self.lock();
        let generation = config.generation;
        let path = config.path.clone();
        match config.backend.as_ref() {
            None => Err(LogFault::Unconfigured),
            Some(LogBackend::LegacyPath(backend)) => backend.ensure_file(&path).map(|_| ()),
            Some(LogBackend::TreeProvider(backend)) => {
                let handle = backend.provision(&path)?;
                tracing::info!("Provisioned log file {}", handle.display_name);
                config.resolved_file = Some(ResolvedFile { generation, handle });
                Ok(())
            }
        }
    }

    /// Current size of the log file, `None` when it does not exist
    pub fn log_size(&self) -> Result<Option<u64>, LogFault> {
        let mut config = self.lock();
        let path = config.path.clone();
        match config.backend.as_ref() {
            None => Err(LogFault::Unconfigured),
            Some(LogBackend::LegacyPath(backend)) => backend.size(&path),
            Some(LogBackend::TreeProvider(_)) => match config.tree_file() {
                Ok(file) => match config.backend.as_ref() {
                    Some(LogBackend::TreeProvider(backend)) => Ok(backend.size(&file)),
                    _ => Err(LogFault::Unconfigured),
                },
                Err(LogFault::Unresolved { .. }) => Ok(None),
                Err(e) => Err(e),
            },
        }
    }

    /// Full content of the log file, `None` when it does not exist
    pub fn read_log(&self) -> Result<Option<Vec<u8>>, LogFault> {
        let mut config = self.lock();
        let path = config.path.clone();
        match config.backend.as_ref() {
            None => Err(LogFault::Unconfigured),
            Some(LogBackend::LegacyPath(backend)) => backend.read(&path),
            Some(LogBackend::TreeProvider(_)) => match config.tree_file() {
                Ok(file) => match config.backend.as_ref() {
                    Some(LogBackend::TreeProvider(backend)) => Ok(Some(backend.read(&file)?)),
                    _ => Err(LogFault::Unconfigured),
                },
                Err(LogFault::Unresolved { .. }) => Ok(None),
                Err(e) => Err(e),
            },
        }
    }

    /// Delete the log file. Returns whether there was one.
    pub fn clear_log(&self) -> Result<bool, LogFault> {
        let mut config = self.lock();
        let path = config.path.clone();
        let removed = match config.backend.as_ref() {
            None => return Err(LogFault::Unconfigured),
            Some(LogBackend::LegacyPath(backend)) => backend.remove(&path)?,
            Some(LogBackend::TreeProvider(_)) => match config.tree_file() {
                Ok(file) => match config.backend.as_ref() {
                    Some(LogBackend::TreeProvider(backend)) => backend.remove(&file)?,
                    _ => false,
                },
                Err(LogFault::Unresolved { .. }) => false,
                Err(e) => return Err(e),
            },
        };
        config.resolved_file = None;
        Ok(removed)
    }

    /// Human-readable location of the log file
    pub fn location(&self) -> Option<String> {
        let config = self.lock();
        match config.backend.as_ref()? {
            LogBackend::LegacyPath(backend) => {
                Some(backend.target(&config.path).to_string_lossy().to_string())
            }
            LogBackend::TreeProvider(backend) => Some(format!(
                "{}:{}/{}",
                backend.root().tree_id,
                backend.root().display_name,
                config.path
            )),
        }
    }
}

/// Apply the path rules: `dir/` → `dir/ApplicationLog.txt`, `name` → `name.txt`
pub fn normalize_path(path: &str) -> String {
    if path.is_empty() || path.ends_with('/') {
        format!("{}{}", path, DEFAULT_LOG_FILE)
    } else if !path.ends_with(".txt") {
        format!("{}.txt", path)
    } else {
        path.to_string()
    }
}
