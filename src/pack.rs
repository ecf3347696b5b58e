//! Walks filesystem roots and streams them into a tar archive.

use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::{Error, Phase, Result, ResultExt};
use crate::fsx;
use crate::sanitize::sanitize_tar_path;
use crate::tar::{EntryKind, TarHeader, TarWriter};

/// Totals for one pack call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PackSummary {
    /// Sum of the sizes of all regular files written
    pub original_bytes: u64,
    pub files: u64,
    pub directories: u64,
}

/// Streams filesystem trees into a tar archive written to `W`.
pub struct Packer<W: Write> {
    tar: TarWriter<W>,
    summary: PackSummary,
    skip: Option<PathBuf>,
}

impl<W: Write> Packer<W> {
    pub fn new(sink: W) -> Self {
        Self {
            tar: TarWriter::new(sink),
            summary: PackSummary::default(),
            skip: None,
        }
    }

    /// Never pack `path`; used to keep an archive out of itself.
    pub fn skip_path(mut self, path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        self.skip = Some(fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf()));
        self
    }

    /// Adds `root` and, for a directory, everything below it in pre-order,
    /// siblings sorted by name.
    pub fn add_source(&mut self, root: &Path) -> Result<()> {
        let base = base_name(root);
        for entry in WalkDir::new(root).follow_links(false).sort_by_file_name() {
            let entry = entry.map_err(|err| {
                let path = err.path().unwrap_or(root).to_path_buf();
                Error::Io {
                    phase: Phase::ReadSource,
                    path,
                    source: io::Error::from(err),
                }
            })?;
            let path = entry.path();
            if self.is_skipped(path) {
                tracing::debug!(path = %path.display(), "not packing the archive into itself");
                continue;
            }

            let relative = path.strip_prefix(root).unwrap_or(Path::new(""));
            let name = container_name(&base, relative);
            let metadata = entry.metadata().map_err(|err| Error::Io {
                phase: Phase::ReadSource,
                path: path.to_path_buf(),
                source: io::Error::from(err),
            })?;
            let mode = fsx::entry_mode(&metadata);
            let mtime = fsx::entry_mtime(&metadata);

            if metadata.is_dir() {
                tracing::debug!(name = %name, "adding directory");
                let header = TarHeader::new(name, EntryKind::Directory, mode, 0).with_mtime(mtime);
                self.tar.append_dir(&header).stream(Phase::WriteArchive)?;
                self.summary.directories += 1;
            } else if metadata.is_file() {
                let size = metadata.len();
                tracing::debug!(name = %name, size, "adding file");
                let file = File::open(path).context(Phase::ReadSource, path)?;
                let header = TarHeader::new(name, EntryKind::Regular, mode, size).with_mtime(mtime);
                append_file(&mut self.tar, &header, file, path)?;
                self.summary.original_bytes += size;
                self.summary.files += 1;
            } else {
                tracing::warn!(path = %path.display(), "skipping entry that is neither a file nor a directory");
            }
        }
        Ok(())
    }

    /// Writes the end-of-archive marker.
    pub fn finish(self) -> Result<PackSummary> {
        self.tar.finish().stream(Phase::WriteArchive)?;
        Ok(self.summary)
    }

    /// Only entries sharing the skipped file's name are canonicalized.
    fn is_skipped(&self, path: &Path) -> bool {
        let Some(skip) = &self.skip else {
            return false;
        };
        path.file_name() == skip.file_name() && fs::canonicalize(path).is_ok_and(|p| &p == skip)
    }
}

/// Appends one file, blaming the source for read failures or a file that
/// shrank and the archive for everything else.
fn append_file<W: Write, R: Read>(tar: &mut TarWriter<W>, header: &TarHeader, data: R, path: &Path) -> Result<()> {
    let mut source = TrackedRead { inner: data, failed: false };
    match tar.append(header, &mut source) {
        Ok(()) => Ok(()),
        Err(e) => {
            let phase = if source.failed { Phase::ReadSource } else { Phase::WriteArchive };
            Err(e).context(phase, path)
        }
    }
}

struct TrackedRead<R> {
    inner: R,
    failed: bool,
}

impl<R: Read> Read for TrackedRead<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let result = self.inner.read(buf);
        match &result {
            // The payload is read through `take(size)`, so EOF here means a short file
            Ok(0) if !buf.is_empty() => self.failed = true,
            Err(e) if e.kind() != io::ErrorKind::Interrupted => self.failed = true,
            _ => {}
        }
        result
    }
}

/// Packs `sources`, in order, into a tar stream written to `sink`.
///
/// Fails with [`Error::NoSources`] before touching anything when `sources` is
/// empty. The sink is left half-written on error.
pub fn pack_to<P: AsRef<Path>, W: Write>(sources: &[P], sink: W) -> Result<PackSummary> {
    if sources.is_empty() {
        return Err(Error::NoSources);
    }
    let mut packer = Packer::new(sink);
    for source in sources {
        packer.add_source(source.as_ref())?;
    }
    packer.finish()
}

/// Name a root is stored under; falls back to the canonical path's name for
/// roots like `.`.
fn base_name(root: &Path) -> String {
    root.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .or_else(|| {
            fs::canonicalize(root)
                .ok()
                .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        })
        .unwrap_or_else(|| "root".to_string())
}

fn container_name(base: &str, relative: &Path) -> String {
    let mut name = base.to_string();
    for component in relative.components() {
        name.push('/');
        name.push_str(&component.as_os_str().to_string_lossy());
    }
    sanitize_tar_path(&name)
}
