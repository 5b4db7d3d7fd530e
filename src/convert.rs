//! Document-converter seam.
//!
//! The CAD document (de)serialization proper is an external capability; the
//! orchestrator only needs the two operations in [`DocumentConverter`] and a
//! way to observe the duplicate-root-entry diagnostic. [`ZipConverter`] is
//! the built-in implementation so the tool works stand-alone: an `.FCStd`
//! file is a plain zip whose payload root is `Document.xml`.

use std::ffi::OsStr;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::{Error, Result};
use crate::paths;

/// Warning substring emitted by converter implementations that duplicate the
/// phantom root entry. Versioned contract: matched only as a fallback when a
/// converter cannot produce the typed diagnostic.
pub const DUPLICATE_ROOT_WARNING: &str = "Duplicate name: './'";

/// Payload file the importer requires at the expanded-directory root.
pub const DOCUMENT_XML: &str = "Document.xml";

/// Subtree the converter never embeds; thumbnail re-injection is the
/// orchestrator's decision.
pub const THUMBNAILS_DIR: &str = "thumbnails";

// ── Diagnostics ──────────────────────────────────────────────────────────────

/// Non-fatal diagnostic emitted by [`DocumentConverter::create_document`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConverterWarning {
    /// The produced archive carried a duplicate `"./"` root entry.
    DuplicateRootEntry,
    /// Free-form warning from a converter without typed diagnostics.
    Message(String),
}

impl ConverterWarning {
    pub fn is_duplicate_root_entry(&self) -> bool {
        match self {
            ConverterWarning::DuplicateRootEntry => true,
            ConverterWarning::Message(text) => text.contains(DUPLICATE_ROOT_WARNING),
        }
    }
}

// ── Trait ────────────────────────────────────────────────────────────────────

pub trait DocumentConverter {
    /// Unpack a legal archive into `dest_dir`.
    fn extract_document(&self, archive_path: &Path, dest_dir: &Path) -> Result<()>;

    /// Build an archive at `archive_path` from the document rooted at
    /// `document_xml_path`, returning any non-fatal warnings.
    fn create_document(
        &self,
        document_xml_path: &Path,
        archive_path: &Path,
    ) -> Result<Vec<ConverterWarning>>;
}

// ── Built-in zip converter ───────────────────────────────────────────────────

/// Self-contained converter backed by the zip format directly.
///
/// Construction rules: `Document.xml` goes first, then the remaining payload
/// files in sorted root-relative order. Dot-files, the `thumbnails/` subtree
/// and caller-supplied exclusion globs are never embedded.
pub struct ZipConverter {
    excludes: Option<GlobSet>,
}

impl ZipConverter {
    pub fn new() -> Self {
        Self { excludes: None }
    }

    /// Exclude files matching any of `patterns` (root-relative posix paths)
    /// from constructed archives. Used to keep tooling artifacts such as
    /// bucket files out of documents.
    pub fn with_excludes(patterns: &[String]) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            let glob = Glob::new(pattern).map_err(|source| Error::Pattern {
                pattern: pattern.clone(),
                source,
            })?;
            builder.add(glob);
        }
        let set = builder.build().map_err(|source| Error::Pattern {
            pattern: patterns.join(", "),
            source,
        })?;
        Ok(Self { excludes: Some(set) })
    }

    fn is_excluded(&self, rel: &Path) -> bool {
        if rel.components().next().map(|c| c.as_os_str()) == Some(OsStr::new(THUMBNAILS_DIR)) {
            return true;
        }
        if rel
            .file_name()
            .map(|n| n.to_string_lossy().starts_with('.'))
            .unwrap_or(false)
        {
            return true;
        }
        match &self.excludes {
            Some(set) => set.is_match(paths::to_posix_string(rel)),
            None => false,
        }
    }
}

impl Default for ZipConverter {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentConverter for ZipConverter {
    fn extract_document(&self, archive_path: &Path, dest_dir: &Path) -> Result<()> {
        let file = File::open(archive_path)?;
        let mut archive = ZipArchive::new(file)?;
        for idx in 0..archive.len() {
            let mut entry = archive.by_index(idx)?;
            let Some(rel) = entry.enclosed_name() else {
                tracing::warn!(entry = entry.name(), "skipped unsafe archive entry");
                continue;
            };
            let dest = dest_dir.join(rel);
            if entry.is_dir() {
                fs::create_dir_all(&dest)?;
            } else {
                if let Some(parent) = dest.parent() {
                    fs::create_dir_all(parent)?;
                }
                let mut out = File::create(&dest)?;
                io::copy(&mut entry, &mut out)?;
            }
        }
        Ok(())
    }

    fn create_document(
        &self,
        document_xml_path: &Path,
        archive_path: &Path,
    ) -> Result<Vec<ConverterWarning>> {
        if !document_xml_path.is_file() {
            return Err(Error::NotFound(document_xml_path.to_path_buf()));
        }
        let root = document_xml_path
            .parent()
            .ok_or_else(|| Error::NotFound(document_xml_path.to_path_buf()))?;

        // Document.xml first, then everything else in sorted walk order.
        let mut payload: Vec<PathBuf> = Vec::new();
        for entry in WalkDir::new(root).sort_by_file_name() {
            let entry = entry.map_err(io::Error::from)?;
            if !entry.file_type().is_file() || entry.path() == archive_path {
                continue;
            }
            let rel = match entry.path().strip_prefix(root) {
                Ok(rel) => rel.to_path_buf(),
                Err(_) => continue,
            };
            if rel == Path::new(DOCUMENT_XML) || self.is_excluded(&rel) {
                continue;
            }
            payload.push(rel);
        }

        let file = File::create(archive_path)?;
        let mut writer = ZipWriter::new(file);
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        writer.start_file(DOCUMENT_XML, options)?;
        let mut doc = File::open(document_xml_path)?;
        io::copy(&mut doc, &mut writer)?;

        for rel in &payload {
            writer.start_file(paths::to_posix_string(rel), options)?;
            let mut src = File::open(root.join(rel))?;
            io::copy(&mut src, &mut writer)?;
        }

        let mut file = writer.finish()?;
        file.flush()?;
        file.sync_all()?;
        Ok(Vec::new())
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn entry_names(path: &Path) -> Vec<String> {
        let mut archive = ZipArchive::new(File::open(path).unwrap()).unwrap();
        (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_owned())
            .collect()
    }

    #[test]
    fn construction_puts_document_xml_first() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("doc");
        fs::create_dir_all(root.join("shapes")).unwrap();
        fs::write(root.join(DOCUMENT_XML), b"<Document/>").unwrap();
        fs::write(root.join("shapes/body.brp"), b"brep").unwrap();
        fs::write(root.join("GuiDocument.xml"), b"<Gui/>").unwrap();

        let archive = tmp.path().join("out.FCStd");
        let converter = ZipConverter::new();
        let warnings = converter
            .create_document(&root.join(DOCUMENT_XML), &archive)
            .unwrap();
        assert!(warnings.is_empty());

        let names = entry_names(&archive);
        assert_eq!(names[0], DOCUMENT_XML);
        assert!(names.contains(&"GuiDocument.xml".to_string()));
        assert!(names.contains(&"shapes/body.brp".to_string()));
    }

    #[test]
    fn construction_skips_markers_thumbnails_and_excludes() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("doc");
        fs::create_dir_all(root.join(THUMBNAILS_DIR)).unwrap();
        fs::write(root.join(DOCUMENT_XML), b"<Document/>").unwrap();
        fs::write(root.join(".lockfile"), b"").unwrap();
        fs::write(root.join(".changefile"), b"stamp").unwrap();
        fs::write(root.join(THUMBNAILS_DIR).join("Thumbnail.png"), b"png").unwrap();
        fs::write(root.join("FCStd_zipped_1.zip"), b"bucket").unwrap();

        let archive = tmp.path().join("out.FCStd");
        let converter = ZipConverter::with_excludes(&["FCStd_zipped_*.zip".into()]).unwrap();
        converter
            .create_document(&root.join(DOCUMENT_XML), &archive)
            .unwrap();

        let names = entry_names(&archive);
        assert_eq!(names, vec![DOCUMENT_XML.to_string()]);
    }

    #[test]
    fn extract_round_trips_construction() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("doc");
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join(DOCUMENT_XML), b"<Document/>").unwrap();
        fs::write(root.join("GuiDocument.xml"), b"<Gui/>").unwrap();

        let archive = tmp.path().join("out.FCStd");
        let converter = ZipConverter::new();
        converter
            .create_document(&root.join(DOCUMENT_XML), &archive)
            .unwrap();

        let dest = tmp.path().join("unpacked");
        fs::create_dir_all(&dest).unwrap();
        converter.extract_document(&archive, &dest).unwrap();
        assert_eq!(fs::read(dest.join(DOCUMENT_XML)).unwrap(), b"<Document/>");
        assert_eq!(fs::read(dest.join("GuiDocument.xml")).unwrap(), b"<Gui/>");
    }

    #[test]
    fn missing_document_xml_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let converter = ZipConverter::new();
        let err = converter
            .create_document(&tmp.path().join(DOCUMENT_XML), &tmp.path().join("o.FCStd"))
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn warning_substring_fallback_matches() {
        let typed = ConverterWarning::DuplicateRootEntry;
        let text = ConverterWarning::Message(format!("zipfile: {DUPLICATE_ROOT_WARNING}"));
        let other = ConverterWarning::Message("something else".into());
        assert!(typed.is_duplicate_root_entry());
        assert!(text.is_duplicate_root_entry());
        assert!(!other.is_duplicate_root_entry());
    }
}
