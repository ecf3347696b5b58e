use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

/// Step of a pack or unpack call during which an I/O error happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    ReadSource,
    WriteArchive,
    ReadArchive,
    WriteFile,
    CreateDirectory,
    RemoveDestination,
    ResolveDestination,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = match self {
            Phase::ReadSource => "read source",
            Phase::WriteArchive => "write archive",
            Phase::ReadArchive => "read archive",
            Phase::WriteFile => "write file",
            Phase::CreateDirectory => "create directory",
            Phase::RemoveDestination => "remove existing destination",
            Phase::ResolveDestination => "resolve destination",
        };
        f.write_str(verb)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no source paths given")]
    NoSources,

    #[error("no archive specified")]
    NoArchive,

    #[error("compression level {level} is outside {min}..={max}")]
    InvalidLevel { level: i32, min: i32, max: i32 },

    #[error("refusing to extract into '{}': it contains the working directory", .0.display())]
    InvalidDestination(PathBuf),

    #[error("failed to {phase} '{}': {source}", path.display())]
    Io {
        phase: Phase,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to {phase}: {source}")]
    Stream {
        phase: Phase,
        #[source]
        source: io::Error,
    },
}

/// Coarse classification of [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad arguments, reported before any work starts.
    Config,
    /// A read or write failed part way through.
    Io,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NoSources
            | Error::NoArchive
            | Error::InvalidLevel { .. }
            | Error::InvalidDestination(_) => ErrorKind::Config,
            Error::Io { .. } | Error::Stream { .. } => ErrorKind::Io,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Attach a [`Phase`] (and a path, when there is one) to an `io::Result`.
pub trait ResultExt<T> {
    fn context(self, phase: Phase, path: impl AsRef<Path>) -> Result<T>;
    fn stream(self, phase: Phase) -> Result<T>;
}

impl<T> ResultExt<T> for io::Result<T> {
    fn context(self, phase: Phase, path: impl AsRef<Path>) -> Result<T> {
        self.map_err(|source| Error::Io {
            phase,
            path: path.as_ref().to_path_buf(),
            source,
        })
    }

    fn stream(self, phase: Phase) -> Result<T> {
        self.map_err(|source| Error::Stream { phase, source })
    }
}
