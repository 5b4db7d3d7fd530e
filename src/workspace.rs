//! Import/export orchestration.
//!
//! `export` turns an archive into its expanded directory; `import` turns the
//! directory back into an archive. Import staging (bucket extraction,
//! extension-less release, write-permission toggling) lives in an RAII
//! [`ImportScope`] whose `Drop` undoes all of it on every exit path,
//! including converter failures. Teardown failures are logged; the original
//! error is the one surfaced.

use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::bucket;
use crate::config::Config;
use crate::convert::{DocumentConverter, DOCUMENT_XML, THUMBNAILS_DIR};
use crate::error::{Error, Result};
use crate::paths;
use crate::relocate;
use crate::repack;

/// Empty advisory marker: "this export is the checked-out copy".
pub const LOCKFILE: &str = ".lockfile";
/// Human-readable export provenance record.
pub const CHANGEFILE: &str = ".changefile";
/// Thumbnail path inside both archive and expanded directory.
pub const THUMBNAIL_FILE: &str = "Thumbnail.png";

// ── Permissions ──────────────────────────────────────────────────────────────

#[cfg(unix)]
fn set_writable(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o644))
}

#[cfg(unix)]
fn set_readonly(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o444))
}

#[cfg(not(unix))]
fn set_writable(path: &Path) -> io::Result<()> {
    let mut perms = fs::metadata(path)?.permissions();
    #[allow(clippy::permissions_set_readonly_false)]
    perms.set_readonly(false);
    fs::set_permissions(path, perms)
}

#[cfg(not(unix))]
fn set_readonly(path: &Path) -> io::Result<()> {
    let mut perms = fs::metadata(path)?.permissions();
    perms.set_readonly(true);
    fs::set_permissions(path, perms)
}

// ── Export ───────────────────────────────────────────────────────────────────

/// Export `archive_path` into `target_dir`. Any prior contents of
/// `target_dir` are destroyed first: export always starts from a clean slate.
pub fn export(
    converter: &dyn DocumentConverter,
    archive_path: &Path,
    target_dir: &Path,
    config: Option<&Config>,
    include_thumbnails: bool,
) -> Result<()> {
    if !archive_path.exists() {
        return Err(Error::NotFound(archive_path.to_path_buf()));
    }

    if target_dir.exists() {
        let lockfile = target_dir.join(LOCKFILE);
        if lockfile.exists() {
            // A read-only lockfile would make the tree removal fail.
            set_writable(&lockfile)?;
            fs::remove_file(&lockfile)?;
        }
        fs::remove_dir_all(target_dir)?;
    }
    fs::create_dir_all(target_dir)?;

    converter
        .extract_document(archive_path, target_dir)
        .map_err(|e| wrap_extraction(archive_path, e))?;

    if !include_thumbnails {
        let thumbnails = target_dir.join(THUMBNAILS_DIR);
        if thumbnails.exists() {
            fs::remove_dir_all(&thumbnails)?;
        }
    }

    if let Some(config) = config {
        relocate::hide(target_dir)?;
        if config.compression.enabled {
            bucket::pack(target_dir, &config.compression)?;
        }
        write_markers(target_dir, archive_path)?;
    }

    tracing::debug!(
        archive = %archive_path.display(),
        dir = %target_dir.display(),
        "export complete"
    );
    Ok(())
}

/// Write `.changefile` (timestamp + archive relpath) and an empty
/// `.lockfile`, both fsynced before returning.
fn write_markers(dir: &Path, archive_path: &Path) -> Result<()> {
    let rel = paths::relative_to(archive_path, dir)?;
    let stamp = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false);

    let mut changefile = File::create(dir.join(CHANGEFILE))?;
    write!(
        changefile,
        "File Last Exported On: {stamp}\nFCStd_file_relpath='{}'\n",
        paths::to_posix_string(&rel)
    )?;
    changefile.flush()?;
    changefile.sync_all()?;

    let lockfile = File::create(dir.join(LOCKFILE))?;
    lockfile.sync_all()?;
    Ok(())
}

// ── Import ───────────────────────────────────────────────────────────────────

/// Import `expanded_dir` back into `archive_path`. The staging scope is torn
/// down whether or not construction succeeds, so an expanded directory never
/// leaks extracted blobs.
pub fn import(
    converter: &dyn DocumentConverter,
    expanded_dir: &Path,
    archive_path: &Path,
    config: Option<&Config>,
    include_thumbnails: bool,
) -> Result<()> {
    if !expanded_dir.exists() {
        return Err(Error::NotFound(expanded_dir.to_path_buf()));
    }

    let scope = ImportScope::enter(expanded_dir, archive_path, config)?;
    let result = run_import(converter, expanded_dir, archive_path, include_thumbnails);
    drop(scope);

    if result.is_ok() {
        tracing::debug!(
            dir = %expanded_dir.display(),
            archive = %archive_path.display(),
            "import complete"
        );
    }
    result
}

fn run_import(
    converter: &dyn DocumentConverter,
    expanded_dir: &Path,
    archive_path: &Path,
    include_thumbnails: bool,
) -> Result<()> {
    let document_xml = expanded_dir.join(DOCUMENT_XML);
    let warnings = converter
        .create_document(&document_xml, archive_path)
        .map_err(|e| wrap_construction(archive_path, e))?;

    if warnings.iter().any(|w| w.is_duplicate_root_entry()) {
        tracing::warn!(
            archive = %archive_path.display(),
            "duplicate root entry reported by converter; repacking"
        );
        repack::repack(archive_path)?;
    }

    if include_thumbnails {
        embed_thumbnail(expanded_dir, archive_path)?;
    }
    Ok(())
}

/// Append `thumbnails/Thumbnail.png` to the archive when the expanded
/// directory carries one; silently skip otherwise.
fn embed_thumbnail(expanded_dir: &Path, archive_path: &Path) -> Result<()> {
    let thumbnail = expanded_dir.join(THUMBNAILS_DIR).join(THUMBNAIL_FILE);
    if !thumbnail.is_file() {
        return Ok(());
    }

    let file = OpenOptions::new().read(true).write(true).open(archive_path)?;
    let mut writer = ZipWriter::new_append(file)?;
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    writer.start_file(format!("{THUMBNAILS_DIR}/{THUMBNAIL_FILE}"), options)?;
    writer.write_all(&fs::read(&thumbnail)?)?;
    writer.finish()?;
    Ok(())
}

fn wrap_extraction(archive: &Path, error: Error) -> Error {
    match error {
        wrapped @ Error::Extraction { .. } => wrapped,
        other => Error::Extraction {
            archive: archive.to_path_buf(),
            source: Box::new(other),
        },
    }
}

fn wrap_construction(archive: &Path, error: Error) -> Error {
    match error {
        wrapped @ Error::Construction { .. } => wrapped,
        other => Error::Construction {
            archive: archive.to_path_buf(),
            source: Box::new(other),
        },
    }
}

// ── Import scope ─────────────────────────────────────────────────────────────

/// Staging scope for one import: acquired up front, undone in `Drop`.
///
/// Entry order mirrors teardown in reverse of intent, matching the packed
/// on-disk form the directory must return to: make the archive writable,
/// extract buckets, release extension-less files. Entirely inert when no
/// configuration was supplied.
struct ImportScope {
    root: PathBuf,
    archive: PathBuf,
    restore_readonly: bool,
    extracted: Vec<PathBuf>,
    released: Vec<OsString>,
    active: bool,
}

impl ImportScope {
    fn enter(root: &Path, archive: &Path, config: Option<&Config>) -> Result<Self> {
        let Some(config) = config else {
            return Ok(Self {
                root: root.to_path_buf(),
                archive: archive.to_path_buf(),
                restore_readonly: false,
                extracted: Vec::new(),
                released: Vec::new(),
                active: false,
            });
        };

        let restore_readonly =
            archive.exists() && fs::metadata(archive)?.permissions().readonly();
        if restore_readonly {
            set_writable(archive)?;
        }

        let extracted = if config.compression.enabled {
            bucket::extract(root, &config.compression.bucket_prefix)?
        } else {
            Vec::new()
        };
        let released = relocate::release(root)?;

        Ok(Self {
            root: root.to_path_buf(),
            archive: archive.to_path_buf(),
            restore_readonly,
            extracted,
            released,
            active: true,
        })
    }
}

impl Drop for ImportScope {
    fn drop(&mut self) {
        if !self.active {
            return;
        }

        if self.restore_readonly {
            if let Err(e) = set_readonly(&self.archive) {
                tracing::warn!(archive = %self.archive.display(), error = %e,
                    "could not restore read-only permissions");
            }
        }

        if let Err(e) = relocate::rehide(&self.root, &self.released) {
            tracing::warn!(dir = %self.root.display(), error = %e,
                "could not re-hide extension-less files");
        }

        for path in &self.extracted {
            let removed = if path.is_dir() {
                fs::remove_dir_all(path)
            } else if path.exists() {
                fs::remove_file(path)
            } else {
                Ok(())
            };
            if let Err(e) = removed {
                tracing::warn!(path = %path.display(), error = %e,
                    "could not remove staged file");
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markers_record_timestamp_and_relpath() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("uncompressed").join("FCStd_doc");
        fs::create_dir_all(&dir).unwrap();
        let archive = tmp.path().join("doc.FCStd");
        fs::write(&archive, b"stub").unwrap();

        write_markers(&dir, &archive).unwrap();

        let lockfile = dir.join(LOCKFILE);
        assert!(lockfile.is_file());
        assert_eq!(fs::metadata(&lockfile).unwrap().len(), 0);

        let changefile = fs::read_to_string(dir.join(CHANGEFILE)).unwrap();
        let mut lines = changefile.lines();
        assert!(lines.next().unwrap().starts_with("File Last Exported On: "));
        assert_eq!(
            lines.next().unwrap(),
            "FCStd_file_relpath='../../doc.FCStd'"
        );
    }

    #[test]
    fn scope_without_config_is_inert() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("dir");
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join("GuiDocument"), b"x").unwrap();
        let archive = tmp.path().join("doc.FCStd");
        fs::write(&archive, b"stub").unwrap();

        {
            let _scope = ImportScope::enter(&root, &archive, None).unwrap();
        }
        // Nothing moved, nothing created.
        assert!(root.join("GuiDocument").is_file());
        assert!(!root.join(relocate::NO_EXTENSION_SUBDIR).exists());
    }

    #[test]
    fn scope_restores_readonly_archive() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("dir");
        fs::create_dir_all(&root).unwrap();
        let archive = tmp.path().join("doc.FCStd");
        fs::write(&archive, b"stub").unwrap();
        set_readonly(&archive).unwrap();

        let config = Config::default();
        {
            let _scope = ImportScope::enter(&root, &archive, Some(&config)).unwrap();
            assert!(!fs::metadata(&archive).unwrap().permissions().readonly());
        }
        assert!(fs::metadata(&archive).unwrap().permissions().readonly());
        set_writable(&archive).unwrap(); // let the tempdir clean up
    }
}
