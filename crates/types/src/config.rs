//! Shared configuration structures for the AIFS engine.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Deployment mode. Development mode enables RPC reflection and the
/// introspection surface.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Hardened defaults; introspection disabled.
    #[default]
    Production,
    /// Reflection and introspection enabled.
    Development,
}

/// Top-level engine configuration.
///
/// Every field has a default so a bare `EngineConfig::default()` yields a
/// working local engine; deployment plumbing overlays values from the
/// `AIFS_*` environment variables.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct EngineConfig {
    /// Root directory for chunk files and the metadata database.
    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,
    /// RPC bind host.
    #[serde(default = "default_host")]
    pub host: String,
    /// RPC bind port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Worker threads for the request dispatcher; 0 means one per core.
    #[serde(default)]
    pub max_workers: usize,
    /// Default zstd level for chunk compression, `1..=22`.
    #[serde(default = "default_compression_level")]
    pub compression_level: i32,
    /// Log filter directive, e.g. `info` or `aifs_engine=debug`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Deployment mode.
    #[serde(default)]
    pub mode: RunMode,
}

fn default_storage_dir() -> PathBuf {
    PathBuf::from("./aifs-data")
}
fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    50051
}
fn default_compression_level() -> i32 {
    1
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            storage_dir: default_storage_dir(),
            host: default_host(),
            port: default_port(),
            max_workers: 0,
            compression_level: default_compression_level(),
            log_level: default_log_level(),
            mode: RunMode::default(),
        }
    }
}

impl EngineConfig {
    /// Overlays recognized `AIFS_*` environment variables onto `self`.
    ///
    /// Unparseable values are ignored rather than fatal so that a stray
    /// variable cannot keep the engine from starting.
    pub fn overlay_env(mut self) -> Self {
        if let Ok(v) = std::env::var("AIFS_STORAGE_DIR") {
            self.storage_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("AIFS_HOST") {
            self.host = v;
        }
        if let Ok(v) = std::env::var("AIFS_PORT") {
            if let Ok(port) = v.parse() {
                self.port = port;
            }
        }
        if let Ok(v) = std::env::var("AIFS_MAX_WORKERS") {
            if let Ok(n) = v.parse() {
                self.max_workers = n;
            }
        }
        if let Ok(v) = std::env::var("AIFS_COMPRESSION_LEVEL") {
            if let Ok(level) = v.parse::<i32>() {
                if (1..=22).contains(&level) {
                    self.compression_level = level;
                }
            }
        }
        if let Ok(v) = std::env::var("AIFS_LOG_LEVEL") {
            self.log_level = v;
        }
        if let Ok(v) = std::env::var("AIFS_MODE") {
            match v.as_str() {
                "production" => self.mode = RunMode::Production,
                "development" => self.mode = RunMode::Development,
                _ => {}
            }
        }
        self
    }

    /// The metadata database file inside the storage root.
    pub fn metadata_path(&self) -> PathBuf {
        self.storage_dir.join("metadata.redb")
    }

    /// The chunk store root inside the storage root.
    pub fn chunks_dir(&self) -> PathBuf {
        self.storage_dir.join("chunks")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.port, 50051);
        assert_eq!(cfg.compression_level, 1);
        assert_eq!(cfg.mode, RunMode::Production);
    }

    #[test]
    fn paths_derive_from_storage_dir() {
        let cfg = EngineConfig {
            storage_dir: PathBuf::from("/var/lib/aifs"),
            ..Default::default()
        };
        assert_eq!(cfg.metadata_path(), PathBuf::from("/var/lib/aifs/metadata.redb"));
        assert_eq!(cfg.chunks_dir(), PathBuf::from("/var/lib/aifs/chunks"));
    }
}
