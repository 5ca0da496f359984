//! Configuration for the migrator.
//!
//! Values are layered: built-in defaults, then an optional TOML file, then
//! environment variables. Command-line flags are applied last by the binary.
//!
//! # Environment Variables
//!
//! - `REDIS_HOST` / `REDIS_PORT` - turn buffer location
//! - `USER_ID` - subject migrated when `--user-id` is not given
//! - `MEMFLUSH_DURABLE_URL` - durable store endpoint (unset = integration absent)
//! - `MEMFLUSH_DURABLE_API_KEY` - bearer token for the durable store
//! - `MEMFLUSH_BACKUP_DIR` - directory for JSONL fallback files

use memflush_memory::{BackupConfig, BufferConfig, DurableConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Main migrator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigratorConfig {
    /// Subject migrated when none is given on the command line
    #[serde(default = "default_user_id")]
    pub default_user_id: String,

    /// Redis turn buffer
    #[serde(default)]
    pub buffer: BufferConfig,

    /// Durable store integration
    #[serde(default)]
    pub durable: DurableConfig,

    /// File fallback
    #[serde(default)]
    pub backup: BackupConfig,
}

fn default_user_id() -> String {
    "default".into()
}

impl Default for MigratorConfig {
    fn default() -> Self {
        Self {
            default_user_id: default_user_id(),
            buffer: BufferConfig::default(),
            durable: DurableConfig::default(),
            backup: BackupConfig::default(),
        }
    }
}

impl MigratorConfig {
    /// Load configuration from a TOML file.
    ///
    /// Symlinks are followed. On Unix the target must not be world-writable,
    /// and must not be world-readable when it sets `durable.api_key`.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {e}", path.display()))?;
        let config: Self = toml::from_str(&content)?;
        let has_api_key = config.durable.api_key.is_some();

        #[cfg(unix)]
        check_permissions(path, has_api_key)?;

        if has_api_key {
            warn!(
                "Durable store API key found in config file '{}'. \
                 Prefer MEMFLUSH_DURABLE_API_KEY.",
                path.display()
            );
        }

        Ok(config)
    }

    /// Overlay values from the process environment.
    pub fn apply_process_env(&mut self) -> anyhow::Result<()> {
        self.apply_env(|name| std::env::var(name).ok())
    }

    /// Overlay values from an environment lookup.
    pub fn apply_env<F>(&mut self, lookup: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("REDIS_HOST") {
            self.buffer.host = host;
        }
        if let Some(port) = lookup("REDIS_PORT") {
            self.buffer.port = port
                .trim()
                .parse()
                .map_err(|e| anyhow::anyhow!("Invalid REDIS_PORT '{port}': {e}"))?;
        }
        if let Some(user_id) = lookup("USER_ID") {
            self.default_user_id = user_id;
        }
        if let Some(url) = lookup("MEMFLUSH_DURABLE_URL") {
            self.durable.endpoint = Some(url);
        }
        if let Some(key) = lookup("MEMFLUSH_DURABLE_API_KEY") {
            self.durable.api_key = Some(key);
        }
        if let Some(dir) = lookup("MEMFLUSH_BACKUP_DIR") {
            self.backup.dir = PathBuf::from(dir);
        }
        Ok(())
    }
}

/// Refuse world-writable config files, and world-readable ones that hold
/// the durable store key.
#[cfg(unix)]
fn check_permissions(path: &Path, has_api_key: bool) -> anyhow::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mode = std::fs::metadata(path)?.permissions().mode() & 0o777;

    if mode & 0o002 != 0 {
        anyhow::bail!(
            "Config file '{}' is world-writable (mode {mode:04o}). Fix with: chmod o-w {}",
            path.display(),
            path.display()
        );
    }
    if has_api_key && mode & 0o004 != 0 {
        anyhow::bail!(
            "Config file '{}' sets durable.api_key but is world-readable (mode {mode:04o}). \
             Fix with: chmod 600 {}",
            path.display(),
            path.display()
        );
    }
    Ok(())
}
