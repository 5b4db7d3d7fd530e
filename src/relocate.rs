//! Extension-less file relocation.
//!
//! Some VCS-adjacent tooling conflates extension-less files with reserved
//! entries, so exported directories keep them under a dedicated
//! subdirectory. That also makes them addressable by a `no_extension/*`
//! bucketing pattern. Only direct children of the root are considered.

use std::ffi::OsString;
use std::fs;
use std::path::Path;

use crate::error::Result;

/// Subdirectory holding extension-less files in an expanded directory.
pub const NO_EXTENSION_SUBDIR: &str = "no_extension";

/// Move every extension-less regular file at the top level of `root` into
/// `root/no_extension/`. Idempotent: a second pass finds nothing to move.
pub fn hide(root: &Path) -> Result<()> {
    let subdir = root.join(NO_EXTENSION_SUBDIR);
    fs::create_dir_all(&subdir)?;

    for entry in fs::read_dir(root)? {
        let entry = entry?;
        let name = entry.file_name();
        let path = entry.path();
        if path.is_file() && !name.to_string_lossy().contains('.') {
            fs::rename(&path, subdir.join(&name))?;
        }
    }
    Ok(())
}

/// Move everything in `root/no_extension/` back to the top level, returning
/// the moved names so [`rehide`] can undo exactly this set.
pub fn release(root: &Path) -> Result<Vec<OsString>> {
    let subdir = root.join(NO_EXTENSION_SUBDIR);
    fs::create_dir_all(&subdir)?;

    let mut moved = Vec::new();
    for entry in fs::read_dir(&subdir)? {
        let entry = entry?;
        let name = entry.file_name();
        fs::rename(entry.path(), root.join(&name))?;
        moved.push(name);
    }
    Ok(moved)
}

/// Return previously released files to the subdirectory. Names that no
/// longer exist at the top level are skipped.
pub fn rehide(root: &Path, names: &[OsString]) -> Result<()> {
    let subdir = root.join(NO_EXTENSION_SUBDIR);
    fs::create_dir_all(&subdir)?;

    for name in names {
        let src = root.join(name);
        if src.exists() {
            fs::rename(&src, subdir.join(name))?;
        }
    }
    Ok(())
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;

    fn touch(path: &Path, contents: &[u8]) {
        File::create(path).unwrap().write_all(contents).unwrap();
    }

    #[test]
    fn hides_only_extensionless_top_level_files() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        touch(&root.join("GuiDocument"), b"meta");
        touch(&root.join("Document.xml"), b"<xml/>");
        fs::create_dir(root.join("nested")).unwrap();
        touch(&root.join("nested").join("inner"), b"stays");

        hide(root).unwrap();

        assert!(root.join(NO_EXTENSION_SUBDIR).join("GuiDocument").is_file());
        assert!(!root.join("GuiDocument").exists());
        assert!(root.join("Document.xml").is_file());
        assert!(root.join("nested").join("inner").is_file());
    }

    #[test]
    fn hiding_twice_is_a_no_op() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        touch(&root.join("GuiDocument"), b"meta");

        hide(root).unwrap();
        hide(root).unwrap();

        let hidden = root.join(NO_EXTENSION_SUBDIR).join("GuiDocument");
        assert!(hidden.is_file());
        assert_eq!(fs::read(&hidden).unwrap(), b"meta");
        // The subdirectory itself has no dot, but it is a directory and must
        // never be swallowed by a second pass.
        assert!(root.join(NO_EXTENSION_SUBDIR).is_dir());
    }

    #[test]
    fn release_and_rehide_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        touch(&root.join("GuiDocument"), b"a");
        touch(&root.join("DocumentMeta"), b"b");
        hide(root).unwrap();

        let moved = release(root).unwrap();
        assert_eq!(moved.len(), 2);
        assert!(root.join("GuiDocument").is_file());
        assert!(root.join("DocumentMeta").is_file());

        rehide(root, &moved).unwrap();
        assert!(!root.join("GuiDocument").exists());
        assert!(root.join(NO_EXTENSION_SUBDIR).join("GuiDocument").is_file());
        assert!(root.join(NO_EXTENSION_SUBDIR).join("DocumentMeta").is_file());
    }
}
