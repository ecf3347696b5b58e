//! Permission-aware file and directory creation.
//!
//! Unix keeps the stored mode bits (subject to the umask). Elsewhere modes are
//! synthesized on the way in and ignored on the way out.

use std::fs::{self, File, Metadata};
use std::io;
use std::path::Path;
use std::time::UNIX_EPOCH;

pub const DEFAULT_FILE_MODE: u32 = 0o644;
pub const DEFAULT_DIR_MODE: u32 = 0o755;

/// Permission bits to store for an entry.
#[cfg(unix)]
pub fn entry_mode(metadata: &Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & crate::tar::PERMISSION_BITS
}

#[cfg(not(unix))]
pub fn entry_mode(metadata: &Metadata) -> u32 {
    if metadata.is_dir() {
        DEFAULT_DIR_MODE
    } else if metadata.permissions().readonly() {
        0o444
    } else {
        DEFAULT_FILE_MODE
    }
}

/// Modification time in seconds since the epoch, 0 when unavailable.
pub fn entry_mtime(metadata: &Metadata) -> u64 {
    metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Creates or truncates a file with the permission bits of `mode` (0 means
/// the default).
pub fn create_file(path: &Path, mode: u32) -> io::Result<File> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(or_default(mode, DEFAULT_FILE_MODE));
    }
    #[cfg(not(unix))]
    let _ = mode;
    options.open(path)
}

/// Creates a directory and any missing parents; existing directories are
/// left as they are.
///
/// The owner always keeps rwx so the rest of the archive can be written into
/// it.
pub fn create_dir(path: &Path, mode: u32) -> io::Result<()> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(or_default(mode, DEFAULT_DIR_MODE) | 0o700);
    }
    #[cfg(not(unix))]
    let _ = mode;
    builder.create(path)
}

#[cfg(unix)]
fn or_default(mode: u32, default: u32) -> u32 {
    match mode & crate::tar::PERMISSION_BITS {
        0 => default,
        m => m,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn create_file_truncates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.txt");
        create_file(&path, 0o644).unwrap().write_all(b"long content").unwrap();
        create_file(&path, 0o644).unwrap().write_all(b"short").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"short");
    }

    #[test]
    fn create_dir_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a/b");
        create_dir(&path, 0o755).unwrap();
        create_dir(&path, 0o755).unwrap();
        assert!(path.is_dir());
    }

    #[cfg(unix)]
    #[test]
    fn modes_round_trip() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("script.sh");
        create_file(&path, 0o600).unwrap();
        let mode = entry_mode(&fs::metadata(&path).unwrap());
        assert_eq!(mode, 0o600);
        // Zero falls back to the default, then the umask applies
        let other = dir.path().join("zero.txt");
        create_file(&other, 0).unwrap();
        let mode = fs::metadata(&other).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode & 0o600, 0o600);
    }

    #[cfg(unix)]
    #[test]
    fn setuid_is_never_restored() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tool");
        create_file(&path, 0o4700).unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o7777, 0o700);
    }
}
