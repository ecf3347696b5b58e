//! Path cleanup for names going into an archive and coming out of one.
//!
//! Outbound names ([`sanitize_tar_path`]) are made portable. Inbound names
//! ([`sanitize_extract_path`]) are validated and confined: anything that could
//! land outside the extraction root is rejected, and [`resolve_within`] checks
//! the joined result once more before a single byte is written.

use std::borrow::Cow;
use std::path::{Component, Path, PathBuf};

/// Characters Windows refuses in file names (separators aside)
const INVALID_CHARS: &[char] = &['<', '>', ':', '"', '|', '?', '*'];

const MAX_DIRECTORY_NAME: usize = 100;

/// Why an archive entry's path was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    #[error("path is empty")]
    Empty,
    #[error("path is absolute")]
    Absolute,
    #[error("path contains a parent-directory segment")]
    Traversal,
    #[error("path escapes the destination root")]
    OutsideRoot,
}

/// Cleans a name before it is written to an archive header.
///
/// Drops a drive letter, strips leading separators, converts `\` to `/` and
/// replaces characters invalid on Windows with `_`.
pub fn sanitize_tar_path(path: &str) -> String {
    let (_, path) = split_drive_letter(path);
    let path = path.trim_start_matches(['/', '\\']);
    replace_invalid_chars(&path.replace('\\', "/"))
}

/// Validates an entry name read from an archive and turns it into a relative
/// host path.
pub fn sanitize_extract_path(raw: &str) -> Result<PathBuf, Rejection> {
    let (had_drive, rest) = split_drive_letter(raw);
    let unified = rest.replace('\\', "/");
    let relative = unified.trim_start_matches('/');
    if !had_drive && relative.len() != unified.len() {
        return Err(Rejection::Absolute);
    }
    if relative.chars().all(|c| c == '.' || c == '/') {
        return Err(Rejection::Empty);
    }

    let mut clean = PathBuf::new();
    for segment in relative.split('/') {
        match segment {
            "" | "." => continue,
            s if is_parent_like(s) => return Err(Rejection::Traversal),
            s => clean.push(&*host_file_name(s)),
        }
    }
    Ok(clean)
}

/// Joins `relative` onto `root` and returns the target only if it lies strictly
/// inside `root` after lexical normalization.
pub fn resolve_within(root: &Path, relative: &Path) -> Result<PathBuf, Rejection> {
    let root = normalize_path(root);
    let target = normalize_path(&root.join(relative));
    if target != root && target.starts_with(&root) {
        Ok(target)
    } else {
        Err(Rejection::OutsideRoot)
    }
}

/// Turns a user-supplied name into a single safe directory name.
pub fn sanitize_directory_name(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| {
            if INVALID_CHARS.contains(&c) || c == '/' || c == '\\' {
                '_'
            } else {
                c
            }
        })
        .collect();
    let trimmed = replaced.trim_matches([' ', '.']);
    if trimmed.is_empty() {
        return "extracted".to_string();
    }
    let mut end = trimmed.len().min(MAX_DIRECTORY_NAME);
    while !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    trimmed[..end].to_string()
}

/// Replaces characters invalid on Windows with `_`.
pub fn replace_invalid_chars(name: &str) -> String {
    name.chars()
        .map(|c| if INVALID_CHARS.contains(&c) { '_' } else { c })
        .collect()
}

/// Lexically resolves `.` and `..` without touching the filesystem.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut result = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                result.pop();
            }
            Component::CurDir => {}
            other => result.push(other.as_os_str()),
        }
    }
    result
}

/// Splits off `X:` when followed by a separator or nothing.
fn split_drive_letter(path: &str) -> (bool, &str) {
    let bytes = path.as_bytes();
    let is_drive = bytes.len() >= 2
        && bytes[0].is_ascii_alphabetic()
        && bytes[1] == b':'
        && matches!(bytes.get(2), None | Some(b'/') | Some(b'\\'));
    if is_drive {
        (true, &path[2..])
    } else {
        (false, path)
    }
}

/// `..`, and dot-only names Windows would collapse into `..` (`...`, `.. `)
fn is_parent_like(segment: &str) -> bool {
    segment.starts_with("..") && segment.trim_end_matches([' ', '.']).is_empty()
}

#[cfg(windows)]
fn host_file_name(segment: &str) -> Cow<'_, str> {
    Cow::Owned(replace_invalid_chars(segment))
}

#[cfg(not(windows))]
fn host_file_name(segment: &str) -> Cow<'_, str> {
    Cow::Borrowed(segment)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_root() -> &'static Path {
        if cfg!(windows) {
            Path::new("C:/srv/out")
        } else {
            Path::new("/srv/out")
        }
    }

    #[test]
    fn outbound_names_are_portable() {
        assert_eq!(sanitize_tar_path("docs/readme.md"), "docs/readme.md");
        assert_eq!(sanitize_tar_path("C:\\Users\\me\\a.txt"), "Users/me/a.txt");
        assert_eq!(sanitize_tar_path("/var/log/app.log"), "var/log/app.log");
        assert_eq!(sanitize_tar_path("notes/what?.txt"), "notes/what_.txt");
        assert_eq!(sanitize_tar_path("a<b>c|d\"e*"), "a_b_c_d_e_");
    }

    #[test]
    fn inbound_plain_paths() {
        assert_eq!(sanitize_extract_path("dir/file.txt").unwrap(), Path::new("dir").join("file.txt"));
        assert_eq!(sanitize_extract_path("./a/./b/").unwrap(), Path::new("a").join("b"));
        assert_eq!(sanitize_extract_path("a//b").unwrap(), Path::new("a").join("b"));
        // Dots inside a name are not traversal
        assert_eq!(sanitize_extract_path("a..b.txt").unwrap(), Path::new("a..b.txt"));
        assert_eq!(sanitize_extract_path(".hidden").unwrap(), Path::new(".hidden"));
    }

    #[test]
    fn inbound_traversal_is_rejected() {
        assert_eq!(sanitize_extract_path("../../etc/passwd"), Err(Rejection::Traversal));
        assert_eq!(sanitize_extract_path("..\\..\\x"), Err(Rejection::Traversal));
        assert_eq!(sanitize_extract_path("a/../../b"), Err(Rejection::Traversal));
        assert_eq!(sanitize_extract_path("a/.../b"), Err(Rejection::Traversal));
        assert_eq!(sanitize_extract_path("a/.. /b"), Err(Rejection::Traversal));
    }

    #[test]
    fn inbound_absolute_is_rejected() {
        assert_eq!(sanitize_extract_path("/etc/passwd"), Err(Rejection::Absolute));
        assert_eq!(sanitize_extract_path("\\\\server\\share\\x"), Err(Rejection::Absolute));
    }

    #[test]
    fn inbound_empty_is_rejected() {
        for raw in ["", ".", "...", "./", "C:", "C:\\"] {
            assert_eq!(sanitize_extract_path(raw), Err(Rejection::Empty), "{raw:?}");
        }
    }

    #[test]
    fn drive_letter_is_stripped() {
        let path = sanitize_extract_path("C:\\Windows\\x.txt").unwrap();
        assert_eq!(path, Path::new("Windows").join("x.txt"));
        let path = sanitize_extract_path("d:/data/y.bin").unwrap();
        assert_eq!(path, Path::new("data").join("y.bin"));
    }

    #[cfg(not(windows))]
    #[test]
    fn colon_names_are_kept_on_unix() {
        assert_eq!(sanitize_extract_path("a:b*c.txt").unwrap(), Path::new("a:b*c.txt"));
    }

    #[cfg(windows)]
    #[test]
    fn colon_names_are_replaced_on_windows() {
        assert_eq!(sanitize_extract_path("a:b*c.txt").unwrap(), Path::new("a_b_c.txt"));
    }

    #[test]
    fn invalid_chars_are_replaced() {
        assert_eq!(replace_invalid_chars("a:b*c.txt"), "a_b_c.txt");
        assert_eq!(replace_invalid_chars("plain.txt"), "plain.txt");
    }

    #[test]
    fn containment() {
        let root = test_root();
        let inside = resolve_within(root, Path::new("bin/tool")).unwrap();
        assert!(inside.starts_with(root));
        assert_eq!(resolve_within(root, Path::new("../escape")), Err(Rejection::OutsideRoot));
        assert_eq!(resolve_within(root, Path::new("a/../../escape")), Err(Rejection::OutsideRoot));
        assert_eq!(resolve_within(root, Path::new("")), Err(Rejection::OutsideRoot));
        // A sibling sharing the root's name as a prefix is still outside
        assert_eq!(resolve_within(root, Path::new("../out2/x")), Err(Rejection::OutsideRoot));
    }

    #[test]
    fn directory_names() {
        assert_eq!(sanitize_directory_name("photos"), "photos");
        assert_eq!(sanitize_directory_name("../etc"), "_etc");
        assert_eq!(sanitize_directory_name("a/b\\c:d"), "a_b_c_d");
        assert_eq!(sanitize_directory_name(" . "), "extracted");
        assert_eq!(sanitize_directory_name(""), "extracted");
        assert_eq!(sanitize_directory_name(&"x".repeat(300)).len(), 100);
    }

    #[test]
    fn normalization() {
        assert_eq!(normalize_path(Path::new("/a/./b/../c")), Path::new("/a/c"));
    }
}
