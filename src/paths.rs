//! Path derivation between an archive and its expanded directory.
//!
//! The forward direction doubles as a pre-flight existence gate: callers rely
//! on `NotFound` surfacing here before any destructive step runs. Symlinks
//! are never resolved; the result stays in the caller's relative-or-absolute
//! convention.

use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};

use path_absolutize::Absolutize;

use crate::config::Config;
use crate::error::{Error, Result};

/// Canonical archive extension, re-appended by the best-effort inverse.
pub const ARCHIVE_EXTENSION: &str = "FCStd";

/// Derive the expanded-directory path for an archive:
/// `{parent}[/{subdirectory}]/{prefix}{stem}{suffix}`.
pub fn expanded_dir_for(archive_path: &Path, config: &Config) -> Result<PathBuf> {
    if !archive_path.exists() {
        return Err(Error::NotFound(archive_path.to_path_buf()));
    }

    let naming = &config.directory;
    let stem = archive_path
        .file_stem()
        .unwrap_or_else(|| OsStr::new(""))
        .to_string_lossy();
    let dir_name = format!("{}{}{}", naming.prefix, stem, naming.suffix);
    let parent = archive_path.parent().unwrap_or_else(|| Path::new(""));

    if naming.subdirectory.enabled {
        Ok(parent.join(&naming.subdirectory.name).join(dir_name))
    } else {
        Ok(parent.join(dir_name))
    }
}

/// Best-effort inverse: reconstruct the archive path from an expanded
/// directory. Lossy when the configured prefix/suffix is empty or occurs in
/// the document name itself — advisory only, never a correctness dependency.
pub fn archive_for(expanded_dir: &Path, config: &Config) -> PathBuf {
    let naming = &config.directory;
    let base = expanded_dir
        .file_name()
        .unwrap_or_else(|| OsStr::new(""))
        .to_string_lossy()
        .into_owned();
    let mut stem: &str = &base;
    if let Some(s) = stem.strip_prefix(naming.prefix.as_str()) {
        stem = s;
    }
    if let Some(s) = stem.strip_suffix(naming.suffix.as_str()) {
        stem = s;
    }

    let mut location = expanded_dir.parent().unwrap_or_else(|| Path::new(""));
    if naming.subdirectory.enabled {
        location = location.parent().unwrap_or_else(|| Path::new(""));
    }
    location.join(format!("{stem}.{ARCHIVE_EXTENSION}"))
}

/// Lexical relative path from `base` to `target`, anchored at the current
/// working directory. Does not touch the filesystem beyond cwd lookup and
/// never resolves symlinks.
pub fn relative_to(target: &Path, base: &Path) -> Result<PathBuf> {
    let target = target.absolutize()?;
    let base = base.absolutize()?;

    let t: Vec<Component> = target.components().collect();
    let b: Vec<Component> = base.components().collect();
    let common = t.iter().zip(b.iter()).take_while(|(x, y)| x == y).count();

    let mut out = PathBuf::new();
    for _ in common..b.len() {
        out.push("..");
    }
    for component in &t[common..] {
        out.push(component.as_os_str());
    }
    Ok(out)
}

/// Render a path with forward-slash separators regardless of platform.
pub fn to_posix_string(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;

    fn naming_config(prefix: &str, suffix: &str, subdir: bool, name: &str) -> Config {
        let mut config = Config::default();
        config.directory.prefix = prefix.into();
        config.directory.suffix = suffix.into();
        config.directory.subdirectory.enabled = subdir;
        config.directory.subdirectory.name = name.into();
        config
    }

    #[test]
    fn derivation_is_deterministic() {
        let tmp = tempfile::tempdir().unwrap();
        let foo = tmp.path().join("foo");
        std::fs::create_dir(&foo).unwrap();
        let archive = foo.join("bar.FCStd");
        File::create(&archive).unwrap();

        let config = naming_config("FCStd_", "_FCStd", true, "uncompressed");
        let derived = expanded_dir_for(&archive, &config).unwrap();
        assert_eq!(derived, foo.join("uncompressed").join("FCStd_bar_FCStd"));
    }

    #[test]
    fn derivation_without_subdirectory() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = tmp.path().join("part.FCStd");
        File::create(&archive).unwrap();

        let config = naming_config("pre_", "", false, "ignored");
        let derived = expanded_dir_for(&archive, &config).unwrap();
        assert_eq!(derived, tmp.path().join("pre_part"));
    }

    #[test]
    fn missing_archive_is_not_found() {
        let config = Config::default();
        let err = expanded_dir_for(Path::new("missing/never.FCStd"), &config).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn inverse_reconstruction_round_trips() {
        let config = naming_config("FCStd_", "_FCStd", true, "uncompressed");
        let dir = Path::new("foo/uncompressed/FCStd_bar_FCStd");
        assert_eq!(archive_for(dir, &config), Path::new("foo/bar.FCStd"));

        let flat = naming_config("", "_dir", false, "");
        let dir = Path::new("foo/bar_dir");
        assert_eq!(archive_for(dir, &flat), Path::new("foo/bar.FCStd"));
    }

    #[test]
    fn relative_path_steps_out_of_subdirectories() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = tmp.path().join("bar.FCStd");
        let dir = tmp.path().join("uncompressed").join("FCStd_bar");
        let rel = relative_to(&archive, &dir).unwrap();
        assert_eq!(to_posix_string(&rel), "../../bar.FCStd");
    }
}
