//! Archive repacking — the duplicate-root-entry workaround.
//!
//! Some document-converter implementations duplicate a phantom `"./"` entry
//! at the archive root, which breaks re-opening the document. Recovery is a
//! full rewrite: every surviving entry is re-materialized in its original
//! order. This is a targeted workaround, not a general archive-repair tool.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::Result;

/// Literal name of the phantom self-referential root entry.
const PHANTOM_ROOT_ENTRY: &str = "./";

/// Rewrite `archive_path` in place, dropping any `"./"` entry and preserving
/// the order and content of everything else. Durable on return.
pub fn repack(archive_path: &Path) -> Result<()> {
    let mut entries: Vec<(String, bool, Vec<u8>)> = Vec::new();
    {
        let file = File::open(archive_path)?;
        let mut archive = ZipArchive::new(file)?;
        for idx in 0..archive.len() {
            let mut entry = archive.by_index(idx)?;
            if entry.name() == PHANTOM_ROOT_ENTRY {
                continue;
            }
            let mut data = Vec::with_capacity(entry.size() as usize);
            entry.read_to_end(&mut data)?;
            entries.push((entry.name().to_owned(), entry.is_dir(), data));
        }
    }

    let file = File::create(archive_path)?;
    let mut writer = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    for (name, is_dir, data) in &entries {
        if *is_dir {
            writer.add_directory(name.as_str(), options)?;
        } else {
            writer.start_file(name.as_str(), options)?;
            writer.write_all(data)?;
        }
    }
    let mut file = writer.finish()?;
    file.flush()?;
    file.sync_all()?;
    tracing::debug!(archive = %archive_path.display(), entries = entries.len(), "repacked archive");
    Ok(())
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
    fn drops_phantom_root_and_preserves_order() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("doc.FCStd");
        {
            let mut writer = ZipWriter::new(File::create(&path).unwrap());
            let options =
                SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
            writer.start_file("Document.xml", options).unwrap();
            writer.write_all(b"<Document/>").unwrap();
            writer.add_directory(".", options).unwrap();
            writer.start_file("GuiDocument.xml", options).unwrap();
            writer.write_all(b"<Gui/>").unwrap();
            writer.finish().unwrap();
        }
        assert!(entry_names(&path).iter().any(|n| n == "./"));

        repack(&path).unwrap();

        let names = entry_names(&path);
        assert_eq!(names, vec!["Document.xml", "GuiDocument.xml"]);
        assert!(!names.iter().any(|n| n.contains("./")));
    }

    #[test]
    fn content_survives_repack() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("doc.FCStd");
        {
            let mut writer = ZipWriter::new(File::create(&path).unwrap());
            let options =
                SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
            writer.start_file("Document.xml", options).unwrap();
            writer.write_all(b"<Document name='x'/>").unwrap();
            writer.finish().unwrap();
        }

        repack(&path).unwrap();

        let mut archive = ZipArchive::new(File::open(&path).unwrap()).unwrap();
        let mut entry = archive.by_name("Document.xml").unwrap();
        let mut data = Vec::new();
        entry.read_to_end(&mut data).unwrap();
        assert_eq!(data, b"<Document name='x'/>");
    }
}
