//! Binary bucketing engine.
//!
//! Large non-text assets are packed into a bounded sequence of size-capped
//! zip "buckets" so version control sees a few opaque blobs instead of many.
//! Packing is an online bin-packing pass with byte-exact enforcement: the
//! serialized bucket is the unit of measurement, and the rollback point is a
//! snapshot of its bytes. A file that overflows a *fresh* bucket is a fatal
//! configuration error, not a silently oversized bucket.

use std::fs::{self, File};
use std::io::{self, Cursor, Write};
use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::config::CompressionConfig;
use crate::error::{Error, Result};
use crate::paths;

// ── Pattern matching ─────────────────────────────────────────────────────────

fn build_matcher(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|source| Error::Pattern {
            pattern: pattern.clone(),
            source,
        })?;
        builder.add(glob);
    }
    builder.build().map_err(|source| Error::Pattern {
        pattern: patterns.join(", "),
        source,
    })
}

/// Walk the tree in sorted order and collect every file whose root-relative
/// posix path matches a configured pattern.
fn collect_candidates(root: &Path, matcher: &GlobSet) -> Result<Vec<PathBuf>> {
    let mut candidates = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = match entry.path().strip_prefix(root) {
            Ok(rel) => rel,
            Err(_) => continue,
        };
        if matcher.is_match(paths::to_posix_string(rel)) {
            candidates.push(entry.path().to_path_buf());
        }
    }
    Ok(candidates)
}

// ── Bucket ───────────────────────────────────────────────────────────────────

/// One in-memory zip archive accumulating entries up to the size cap.
/// `bytes` is always a fully serialized zip (or empty before the first
/// accepted entry), so it serves as its own rollback snapshot.
struct Bucket {
    bytes: Vec<u8>,
    level: i64,
}

impl Bucket {
    fn new(level: i64) -> Self {
        Self { bytes: Vec::new(), level }
    }

    fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Serialize this bucket with one more entry appended, without mutating
    /// the bucket itself. The caller decides whether to accept the result.
    fn with_entry(&self, name: &str, data: &[u8]) -> Result<Vec<u8>> {
        let mut writer = if self.bytes.is_empty() {
            ZipWriter::new(Cursor::new(Vec::new()))
        } else {
            ZipWriter::new_append(Cursor::new(self.bytes.clone()))?
        };
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .compression_level(Some(self.level));
        writer.start_file(name, options)?;
        writer.write_all(data)?;
        Ok(writer.finish()?.into_inner())
    }

    /// Write the bucket durably to `{prefix}{index}.zip` under `root`.
    fn flush_to_disk(&self, root: &Path, prefix: &str, index: u32) -> Result<PathBuf> {
        let path = root.join(format!("{prefix}{index}.zip"));
        let mut file = File::create(&path)?;
        file.write_all(&self.bytes)?;
        file.flush()?;
        file.sync_all()?;
        tracing::debug!(bucket = %path.display(), bytes = self.bytes.len(), "flushed bucket");
        Ok(path)
    }
}

// ── Forward: pack ────────────────────────────────────────────────────────────

/// Pack every pattern-matched file under `root` into size-capped buckets,
/// deleting the originals. Returns the bucket files written, in index order.
///
/// Candidates are retried at most once against a fresh bucket; a fresh-bucket
/// overflow surfaces as [`Error::Capacity`]. Entry names are root-relative
/// posix paths, so subdirectory structure survives the round trip.
pub fn pack(root: &Path, config: &CompressionConfig) -> Result<Vec<PathBuf>> {
    let matcher = build_matcher(&config.patterns)?;
    let candidates = collect_candidates(root, &matcher)?;
    let max_bytes = config.max_bucket_size_bytes();

    let mut bucket = Bucket::new(config.level);
    let mut index = 1u32;
    let mut written = Vec::new();

    let mut i = 0;
    while i < candidates.len() {
        let file = &candidates[i];
        let rel = file.strip_prefix(root).unwrap_or(file);
        let data = fs::read(file)?;

        let trial = bucket.with_entry(&paths::to_posix_string(rel), &data)?;
        if trial.len() as u64 > max_bytes {
            if bucket.is_empty() {
                // A fresh bucket cannot hold this file alone. Everything
                // accepted so far is already flushed, so the tree stays
                // recoverable: bucketed files are in buckets, the rest are
                // untouched.
                return Err(Error::Capacity {
                    file:      file.clone(),
                    file_size: data.len() as u64,
                    max_bytes,
                    level:     config.level,
                });
            }
            // Roll back to the snapshot, flush it, retry the same candidate
            // against a fresh bucket.
            written.push(bucket.flush_to_disk(root, &config.bucket_prefix, index)?);
            index += 1;
            bucket = Bucket::new(config.level);
            continue;
        }

        bucket.bytes = trial;
        fs::remove_file(file)?;
        i += 1;
    }

    if !bucket.is_empty() {
        written.push(bucket.flush_to_disk(root, &config.bucket_prefix, index)?);
    }
    Ok(written)
}

// ── Reverse: extract ─────────────────────────────────────────────────────────

/// Bucket files under `root` matching `{prefix}*.zip`, in sorted name order.
pub fn list_buckets(root: &Path, prefix: &str) -> Result<Vec<PathBuf>> {
    let mut buckets = Vec::new();
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with(prefix) && name.ends_with(".zip") && entry.path().is_file() {
            buckets.push(entry.path());
        }
    }
    buckets.sort();
    Ok(buckets)
}

/// Extract every bucket into `root` (overwriting), returning the paths of
/// everything extracted. Callers own the lifetime of the extracted files;
/// the import scope deletes them on exit. Entries that would escape `root`
/// are skipped.
pub fn extract(root: &Path, prefix: &str) -> Result<Vec<PathBuf>> {
    let mut extracted = Vec::new();
    for bucket_path in list_buckets(root, prefix)? {
        let file = File::open(&bucket_path)?;
        let mut archive = ZipArchive::new(file)?;
        for idx in 0..archive.len() {
            let mut entry = archive.by_index(idx)?;
            let Some(rel) = entry.enclosed_name() else {
                tracing::warn!(entry = entry.name(), "skipped unsafe bucket entry");
                continue;
            };
            let dest = root.join(rel);
            if entry.is_dir() {
                fs::create_dir_all(&dest)?;
            } else {
                if let Some(parent) = dest.parent() {
                    fs::create_dir_all(parent)?;
                }
                let mut out = File::create(&dest)?;
                io::copy(&mut entry, &mut out)?;
            }
            extracted.push(dest);
        }
    }
    Ok(extracted)
}

// ── Tests ────────────────────────────────────────────────────────────────────
