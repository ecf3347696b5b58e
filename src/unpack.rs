//! Extracts a tar stream under a destination root, skipping any entry whose
//! path would leave it.

use std::env;
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::{Error, Phase, Result, ResultExt};
use crate::fsx;
use crate::sanitize::{normalize_path, resolve_within, sanitize_extract_path};
use crate::tar::{EntryKind, TarReader};

/// Outcome of one extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnpackReport {
    /// Regular files written; rejected entries are not counted
    pub extracted_files: u64,
    pub directories: u64,
    /// Entries dropped by path sanitization
    pub skipped_entries: u64,
    /// Absolute destination root
    pub destination: PathBuf,
}

/// Extracts every entry of the tar stream `source` under `destination`.
///
/// `destination` must name a directory inside the working directory; anything
/// already there is removed first. Entries whose path is empty, absolute or
/// contains `..` are skipped and logged; any read or write error aborts the
/// call, leaving what was extracted so far on disk.
pub fn unpack_from<R: Read>(source: R, destination: impl AsRef<Path>) -> Result<UnpackReport> {
    let destination = destination.as_ref();
    let cwd = env::current_dir().context(Phase::ResolveDestination, destination)?;
    unpack_under(source, &cwd, destination)
}

/// Like [`unpack_from`], with `base` in place of the working directory.
///
/// The resolved destination must lie strictly inside `base`, otherwise
/// [`Error::InvalidDestination`] is returned before anything is removed.
pub fn unpack_under<R: Read>(source: R, base: &Path, destination: impl AsRef<Path>) -> Result<UnpackReport> {
    let root = prepare_destination(base, destination.as_ref())?;
    let mut report = UnpackReport {
        extracted_files: 0,
        directories: 0,
        skipped_entries: 0,
        destination: root.clone(),
    };

    let mut archive = TarReader::new(source);
    while let Some(mut entry) = archive.next_entry().stream(Phase::ReadArchive)? {
        let name = entry.header.name.clone();
        let target = match sanitize_extract_path(&name).and_then(|rel| resolve_within(&root, &rel)) {
            Ok(target) => target,
            Err(reason) => {
                tracing::warn!(entry = %name, %reason, "skipping archive entry");
                report.skipped_entries += 1;
                continue;
            }
        };

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).context(Phase::CreateDirectory, parent)?;
        }
        match entry.header.kind {
            EntryKind::Directory => {
                tracing::debug!(entry = %name, "creating directory");
                fsx::create_dir(&target, entry.header.mode).context(Phase::CreateDirectory, &target)?;
                report.directories += 1;
            }
            EntryKind::Regular => {
                tracing::debug!(entry = %name, size = entry.header.size, "extracting file");
                let mut file = fsx::create_file(&target, entry.header.mode).context(Phase::WriteFile, &target)?;
                copy_payload(&mut entry, &mut file, &target)?;
                report.extracted_files += 1;
            }
        }
    }

    tracing::info!(
        destination = %root.display(),
        files = report.extracted_files,
        skipped = report.skipped_entries,
        "extraction complete"
    );
    Ok(report)
}

/// Copies an entry's payload, blaming the archive for read failures and the
/// target for write failures.
fn copy_payload<R: Read, W: Write>(entry: &mut R, file: &mut W, target: &Path) -> Result<u64> {
    let mut buf = [0u8; 64 * 1024];
    let mut copied = 0;
    loop {
        let n = match entry.read(&mut buf) {
            Ok(0) => return Ok(copied),
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e).stream(Phase::ReadArchive),
        };
        file.write_all(&buf[..n]).context(Phase::WriteFile, target)?;
        copied += n as u64;
    }
}

/// Resolves the destination under `base`, clears whatever is there and
/// recreates it.
fn prepare_destination(base: &Path, destination: &Path) -> Result<PathBuf> {
    let base = if base.is_absolute() {
        normalize_path(base)
    } else {
        let cwd = env::current_dir().context(Phase::ResolveDestination, base)?;
        normalize_path(&cwd.join(base))
    };
    let root = normalize_path(&base.join(destination));
    if root == base || !root.starts_with(&base) {
        return Err(Error::InvalidDestination(root));
    }

    match fs::symlink_metadata(&root) {
        Ok(metadata) => {
            tracing::debug!(destination = %root.display(), "removing existing destination");
            let removed = if metadata.is_dir() {
                fs::remove_dir_all(&root)
            } else {
                fs::remove_file(&root)
            };
            removed.context(Phase::RemoveDestination, &root)?;
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e).context(Phase::RemoveDestination, &root),
    }
    fs::create_dir_all(&root).context(Phase::CreateDirectory, &root)?;
    Ok(root)
}
