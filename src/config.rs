//! Configuration model — a validated, typed view over the fixed JSON
//! configuration format.
//!
//! The on-disk key names are hyphenated and longer than anything we want to
//! thread through the rest of the crate, so every field is renamed here once.
//! Defaults live in the `Default` impls and nowhere else.

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::{Error, Result};

/// Default config location relative to the repository root, matching the
/// automation layout this tool ships in.
pub const DEFAULT_CONFIG_PATH: &str = "FreeCAD_Automation/config.json";

// ── Config ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Advisory only: enforcement (e.g. via VCS hooks) is external to this
    /// tool. The `.lockfile` marker is written regardless.
    #[serde(rename = "require-lock-to-modify-FreeCAD-files")]
    pub require_lock: bool,

    #[serde(rename = "include-thumbnails")]
    pub include_thumbnails: bool,

    #[serde(rename = "uncompressed-directory-structure")]
    pub directory: DirectoryNaming,

    #[serde(rename = "compress-non-human-readable-FreeCAD-files")]
    pub compression: CompressionConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DirectoryNaming {
    #[serde(rename = "uncompressed-directory-suffix")]
    pub suffix: String,

    #[serde(rename = "uncompressed-directory-prefix")]
    pub prefix: String,

    #[serde(rename = "subdirectory")]
    pub subdirectory: Subdirectory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Subdirectory {
    #[serde(rename = "put-uncompressed-directory-in-subdirectory")]
    pub enabled: bool,

    #[serde(rename = "subdirectory-name")]
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompressionConfig {
    pub enabled: bool,

    /// Ordered glob patterns matched against root-relative posix paths.
    /// An empty list is legal and matches nothing.
    #[serde(rename = "files-to-compress")]
    pub patterns: Vec<String>,

    #[serde(rename = "max-compressed-file-size-gigabyte")]
    pub max_size_gb: f64,

    /// Deflate level, 0-9.
    #[serde(rename = "compression-level")]
    pub level: i64,

    /// Bucket files are named `{prefix}{N}.zip`, N starting at 1.
    #[serde(rename = "zip-file-prefix")]
    pub bucket_prefix: String,
}

// ── Defaults ─────────────────────────────────────────────────────────────────

impl Default for Config {
    fn default() -> Self {
        Self {
            require_lock:       true,
            include_thumbnails: true,
            directory:          DirectoryNaming::default(),
            compression:        CompressionConfig::default(),
        }
    }
}

impl Default for DirectoryNaming {
    fn default() -> Self {
        Self {
            suffix:       String::new(),
            prefix:       String::from("FCStd_"),
            subdirectory: Subdirectory::default(),
        }
    }
}

impl Default for Subdirectory {
    fn default() -> Self {
        Self {
            enabled: true,
            name:    String::from("uncompressed"),
        }
    }
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            enabled:       true,
            patterns:      vec![
                String::from("*.brp"),
                String::from("*.bmp"),
                String::from("no_extension/*"),
            ],
            max_size_gb:   0.09, // stays under common VCS host per-file limits
            level:         6,
            bucket_prefix: String::from("compressed_binaries"),
        }
    }
}

// ── Loading / validation ─────────────────────────────────────────────────────

impl Config {
    /// Read and parse a configuration file, then validate it.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read '{}': {e}", path.display()))
        })?;
        let config: Config = serde_json::from_str(&raw).map_err(|e| {
            Error::Config(format!("cannot parse '{}': {e}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field invariants that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        let c = &self.compression;
        if !c.enabled {
            return Ok(());
        }
        if c.max_bucket_size_bytes() == 0 {
            return Err(Error::Config(format!(
                "max-compressed-file-size-gigabyte must be > 0 when compression is enabled (got {})",
                c.max_size_gb
            )));
        }
        if !(0..=9).contains(&c.level) {
            return Err(Error::Config(format!(
                "compression-level must be within 0-9 (got {})",
                c.level
            )));
        }
        if c.bucket_prefix.is_empty() {
            return Err(Error::Config(
                "zip-file-prefix must not be empty when compression is enabled".into(),
            ));
        }
        Ok(())
    }
}

impl CompressionConfig {
    /// Size cap in bytes. The config stores a gigabyte float so small test
    /// caps (fractions of a GB) stay expressible.
    pub fn max_bucket_size_bytes(&self) -> u64 {
        (self.max_size_gb * (1024u64.pow(3) as f64)) as u64
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
