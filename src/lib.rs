//! Pack file trees into compressed tar archives and extract them safely
//!
//! Archives are tar streams wrapped in zstd (default), gzip (`.tar.gz`,
//! `.tgz`) or nothing (`.tar`). Extraction sanitizes every stored path and
//! skips entries that would escape the destination.
//!
//! # Usage
//!
//! ## Packing files and folders
//!
//! ```no_run
//! use tarzst::{pack, PackOptions};
//!
//! let stats = pack("photos.zst", &["holiday", "notes.txt"], &PackOptions::default()).unwrap();
//! println!("{} -> {} bytes", stats.original_size, stats.compressed_size);
//! ```
//!
//! ## Unpacking an archive
//!
//! ```no_run
//! use tarzst::unpack;
//!
//! // Anything already at `photos_extracted` is replaced
//! let report = unpack("photos.zst", "photos_extracted").unwrap();
//! println!("{} files in {}", report.extracted_files, report.destination.display());
//! ```
//!
//! ## Listing an archive
//!
//! ```no_run
//! use tarzst::list;
//!
//! match list("photos.zst") {
//!     Ok(headers) => {
//!         for header in headers {
//!             println!("  {} ({} bytes)", header.name, header.size);
//!         }
//!     }
//!     Err(e) => eprintln!("Error: {}", e),
//! }
//! ```
//!
//! ## Streams
//!
//! [`pack::pack_to`] and [`unpack::unpack_from`] work on any `Write`/`Read`,
//! for callers that manage the codec themselves.

pub mod codec;
pub mod error;
mod fsx;
pub mod pack;
pub mod sanitize;
pub mod service;
pub mod tar;
pub mod unpack;

use std::env;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

pub use codec::Compression;
pub use error::{Error, ErrorKind, Result};
pub use pack::{PackSummary, pack_to};
pub use tar::{EntryKind, TarHeader};
pub use unpack::{UnpackReport, unpack_from};

use error::{Phase, ResultExt};

/// Codec and level for [`pack`]; unset fields are derived from the archive
/// name and the codec's default level.
#[derive(Debug, Clone, Default)]
pub struct PackOptions {
    pub compression: Option<Compression>,
    pub level: Option<i32>,
}

impl PackOptions {
    pub fn compression(mut self, compression: Compression) -> Self {
        self.compression = Some(compression);
        self
    }

    pub fn level(mut self, level: i32) -> Self {
        self.level = Some(level);
        self
    }
}

/// Result of a successful [`pack`].
#[derive(Debug, Clone)]
pub struct PackStats {
    pub original_size: u64,
    pub compressed_size: u64,
    pub files: u64,
    pub directories: u64,
    pub duration: Duration,
    pub output: PathBuf,
}

impl PackStats {
    /// Compressed size as a percentage of the original; 0 when there was
    /// nothing to compress.
    pub fn ratio(&self) -> f64 {
        if self.original_size == 0 {
            return 0.0;
        }
        self.compressed_size as f64 / self.original_size as f64 * 100.0
    }
}

// ----------------------------------------------------------------
// simple methods for archives on disk
// ----------------------------------------------------------------
/// Packs `sources` into the archive file `archive`.
///
/// A failed call removes the partly written archive.
pub fn pack<P: AsRef<Path>>(
    archive: impl AsRef<Path>,
    sources: &[P],
    options: &PackOptions,
) -> Result<PackStats> {
    let archive = archive.as_ref();
    if sources.is_empty() {
        return Err(Error::NoSources);
    }
    let compression = options
        .compression
        .unwrap_or_else(|| Compression::from_path(archive));
    let level = options.level.unwrap_or(compression.default_level());
    compression.check_level(level)?;

    let started = Instant::now();
    let file = File::create(archive).context(Phase::WriteArchive, archive)?;
    let summary = match write_archive(file, archive, sources, compression, level) {
        Ok(summary) => summary,
        Err(e) => {
            if let Err(rm) = fs::remove_file(archive) {
                tracing::warn!(archive = %archive.display(), error = %rm, "could not remove partial archive");
            }
            return Err(e);
        }
    };
    let compressed_size = fs::metadata(archive)
        .context(Phase::WriteArchive, archive)?
        .len();

    let stats = PackStats {
        original_size: summary.original_bytes,
        compressed_size,
        files: summary.files,
        directories: summary.directories,
        duration: started.elapsed(),
        output: archive.to_path_buf(),
    };
    tracing::info!(
        archive = %archive.display(),
        ?compression,
        level,
        original = stats.original_size,
        compressed = stats.compressed_size,
        "archive created"
    );
    Ok(stats)
}

fn write_archive<P: AsRef<Path>>(
    file: File,
    archive: &Path,
    sources: &[P],
    compression: Compression,
    level: i32,
) -> Result<PackSummary> {
    let mut encoder = compression
        .encoder(BufWriter::new(file), level)
        .context(Phase::WriteArchive, archive)?;
    let mut packer = pack::Packer::new(&mut encoder).skip_path(archive);
    for source in sources {
        packer.add_source(source.as_ref())?;
    }
    let summary = packer.finish()?;
    encoder
        .finish()
        .and_then(|writer| writer.into_inner().map_err(|e| e.into_error()))
        .context(Phase::WriteArchive, archive)?;
    Ok(summary)
}

/// Extracts the archive file `archive` into `destination`, a directory
/// inside the working directory.
///
/// The archive is opened before the destination is cleared, so a missing
/// archive leaves the destination alone.
pub fn unpack(archive: impl AsRef<Path>, destination: impl AsRef<Path>) -> Result<UnpackReport> {
    let destination = destination.as_ref();
    let cwd = env::current_dir().context(Phase::ResolveDestination, destination)?;
    unpack_under(archive, &cwd, destination)
}

/// Like [`unpack`], with `base` in place of the working directory.
pub fn unpack_under(
    archive: impl AsRef<Path>,
    base: &Path,
    destination: impl AsRef<Path>,
) -> Result<UnpackReport> {
    let archive = archive.as_ref();
    if archive.as_os_str().is_empty() {
        return Err(Error::NoArchive);
    }
    let file = File::open(archive).context(Phase::ReadArchive, archive)?;
    let decoder = Compression::from_path(archive)
        .decoder(BufReader::new(file))
        .context(Phase::ReadArchive, archive)?;
    unpack::unpack_under(decoder, base, destination)
}

/// Lists the files and directories in an archive without extracting it.
pub fn list(archive: impl AsRef<Path>) -> Result<Vec<TarHeader>> {
    let archive = archive.as_ref();
    if archive.as_os_str().is_empty() {
        return Err(Error::NoArchive);
    }
    let file = File::open(archive).context(Phase::ReadArchive, archive)?;
    let decoder = Compression::from_path(archive)
        .decoder(BufReader::new(file))
        .context(Phase::ReadArchive, archive)?;
    let mut reader = tar::TarReader::new(decoder);
    let mut headers = Vec::new();
    while let Some(entry) = reader.next_entry().context(Phase::ReadArchive, archive)? {
        headers.push(entry.header.clone());
    }
    Ok(headers)
}
