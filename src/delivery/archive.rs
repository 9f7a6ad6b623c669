use std::fs::File;
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Component, Path, PathBuf};

use axum::http::{HeaderValue, header};
use tempfile::NamedTempFile;
use tracing::{debug, warn};
use walkdir::WalkDir;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use super::{Delivery, attachment};
use crate::config::Compression;
use crate::error::{ServeError, zip_error_to_io};
use crate::sink::ResponseSink;

/// Entries at or above this size need zip64 headers.
const LARGE_FILE_THRESHOLD: u64 = u32::MAX as u64;

const SCRATCH_PREFIX: &str = ".pathserve-";
const SCRATCH_SUFFIX: &str = ".zip";

/// Walks a directory into a scratch zip file, then streams it.
///
/// The scratch file gets a random per-request name inside `scratch_dir`, so
/// concurrent requests for directories with the same base name never share
/// storage. It is removed on every exit path.
pub struct ArchiveBuilder {
    dir: PathBuf,
    scratch_dir: PathBuf,
    compression: Compression,
}

/// Result of writing the archive to scratch storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveStats {
    pub entries: u64,
    pub size: u64,
}

impl ArchiveBuilder {
    pub fn new(dir: PathBuf, scratch_dir: PathBuf, compression: Compression) -> Self {
        Self {
            dir,
            scratch_dir,
            compression,
        }
    }

    /// Write every regular file under `dir` into `out` as a finalized zip.
    ///
    /// Entries are visited in file-name order and keyed by their `/`-separated
    /// path relative to `dir`. Directories get no entry of their own. The
    /// first error aborts the whole archive.
    ///
    /// When `scratch_dir` lies inside `dir`, scratch archives in it (this
    /// request's and any concurrent one's) are left out.
    pub fn write_archive<W: Write + Seek>(&self, out: W) -> io::Result<ArchiveStats> {
        let mut zip = ZipWriter::new(out);
        let options = SimpleFileOptions::default()
            .compression_method(self.compression.method())
            .unix_permissions(0o644);
        let scratch_within = self.scratch_within_dir();
        let mut entries = 0u64;

        for entry in WalkDir::new(&self.dir).follow_links(false).sort_by_file_name() {
            let entry = entry?;
            // Symlinks and special files are skipped; a FIFO would block the walk.
            if !entry.file_type().is_file() {
                continue;
            }

            if scratch_within
                .as_deref()
                .is_some_and(|scratch| is_scratch_entry(&self.dir, entry.path(), scratch))
            {
                debug!("Skipping scratch archive {}", entry.path().display());
                continue;
            }

            let name = entry_name(&self.dir, entry.path())?;
            let mut input = File::open(entry.path())?;
            let len = input.metadata()?.len();

            zip.start_file(name.as_str(), options.large_file(len >= LARGE_FILE_THRESHOLD))
                .map_err(zip_error_to_io)?;
            io::copy(&mut input, &mut zip)?;
            entries += 1;
        }

        let mut out = zip.finish().map_err(zip_error_to_io)?;
        out.flush()?;
        let size = out.seek(SeekFrom::End(0))?;

        Ok(ArchiveStats { entries, size })
    }

    /// Location of `scratch_dir` relative to `dir`, if it is inside it.
    fn scratch_within_dir(&self) -> Option<PathBuf> {
        let dir = self.dir.canonicalize().ok()?;
        let scratch = self.scratch_dir.canonicalize().ok()?;
        scratch.strip_prefix(&dir).ok().map(Path::to_path_buf)
    }

    fn stream_scratch(
        &self,
        scratch: &mut NamedTempFile,
        sink: &mut dyn ResponseSink,
    ) -> Result<(), ServeError> {
        let stats = self
            .write_archive(scratch.as_file_mut())
            .map_err(|err| ServeError::internal("Error creating ZIP", err))?;
        debug!(
            "Built archive of {} with {} entries ({} bytes)",
            self.dir.display(),
            stats.entries,
            stats.size
        );

        let mut reader = scratch
            .reopen()
            .map_err(|err| ServeError::internal("Error opening generated ZIP file", err))?;

        sink.set_header(
            header::CONTENT_DISPOSITION,
            attachment(&archive_name(&self.dir)),
        );
        sink.set_header(header::CONTENT_TYPE, HeaderValue::from_static("application/zip"));
        sink.set_header(header::CONTENT_LENGTH, HeaderValue::from(stats.size));

        io::copy(&mut reader, sink)
            .map_err(|err| ServeError::internal("Error sending ZIP file", err))?;

        Ok(())
    }
}

impl Delivery for ArchiveBuilder {
    fn deliver(&self, sink: &mut dyn ResponseSink) -> Result<(), ServeError> {
        debug!("Downloading directory as zip: {}", self.dir.display());

        let mut scratch = tempfile::Builder::new()
            .prefix(SCRATCH_PREFIX)
            .suffix(SCRATCH_SUFFIX)
            .tempfile_in(&self.scratch_dir)
            .map_err(|err| ServeError::internal("Could not create ZIP file", err))?;

        let result = self.stream_scratch(&mut scratch, sink);

        let scratch_path = scratch.path().to_path_buf();
        if let Err(err) = scratch.close() {
            warn!(
                "Failed to remove scratch archive {}: {}",
                scratch_path.display(),
                err
            );
        }

        result
    }
}

/// Advertised archive name: the directory's base name plus `.zip`.
///
/// Paths without a base name (`.`, `..`, `/`) fall back to the canonical
/// path's base name, then to `archive`.
pub fn archive_name(dir: &Path) -> String {
    let base = dir
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .or_else(|| {
            dir.canonicalize()
                .ok()
                .and_then(|p| p.file_name().map(|n| n.to_string_lossy().to_string()))
        })
        .unwrap_or_else(|| "archive".to_string());

    format!("{}.zip", base)
}

/// `scratch_within` is the scratch dir relative to `root`.
fn is_scratch_entry(root: &Path, path: &Path, scratch_within: &Path) -> bool {
    let Ok(relative) = path.strip_prefix(root) else {
        return false;
    };
    let in_scratch_dir = relative.parent() == Some(scratch_within);
    let scratch_named = relative
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with(SCRATCH_PREFIX) && n.ends_with(SCRATCH_SUFFIX));

    in_scratch_dir && scratch_named
}

fn entry_name(root: &Path, path: &Path) -> io::Result<String> {
    let relative = path
        .strip_prefix(root)
        .map_err(|err| io::Error::other(format!("{}: {}", path.display(), err)))?;

    let parts: Vec<String> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().to_string()),
            _ => None,
        })
        .collect();

    Ok(parts.join("/"))
}
