//! Per-response file output
//!
//! The filename is the URL with every run of non-alphanumeric characters
//! collapsed to a single `-`. The optional subdirectory is a prefix of the
//! filename's MD5, two hex chars for `subdir_length` 1-2 and four above
//! that, which keeps the directory fan-out at 256 or 65k entries.

use std::fs::File;
use std::path::{Path, PathBuf};

use md5::{Digest, Md5};

/// URL collapsed to a filesystem-safe filename
pub fn sanitized_filename(url: &str) -> String {
    let mut out = String::with_capacity(url.len());
    let mut last_dash = false;

    for c in url.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c);
            last_dash = false;
        } else if !last_dash {
            out.push('-');
            last_dash = true;
        }
    }

    out
}

/// Hashed subdirectory name for a filename, `None` when disabled
pub fn subdirectory(filename: &str, subdir_length: i32) -> Option<String> {
    if subdir_length <= 0 {
        return None;
    }

    let slice_end = if subdir_length > 2 { 2 } else { 1 };
    let digest = Md5::digest(filename.as_bytes());
    Some(hex::encode(&digest[..slice_end]))
}

/// Full target path for a response file
pub fn target_path(base: &Path, subdir_length: i32, filename: &str) -> PathBuf {
    match subdirectory(filename, subdir_length) {
        Some(subdir) => base.join(subdir).join(filename),
        None => base.join(filename),
    }
}

/// Create the target file, making directories on demand
pub fn create(path: &Path) -> std::io::Result<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    File::create(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitized_filename_collapses_runs() {
        assert_eq!(
            sanitized_filename("http://example.com/foo/1"),
            "http-example-com-foo-1"
        );
        assert_eq!(
            sanitized_filename("https://example.com/a?b=c&d=e"),
            "https-example-com-a-b-c-d-e"
        );
    }

    #[test]
    fn test_sanitized_filename_keeps_trailing_dash() {
        assert_eq!(sanitized_filename("http://example.com/"), "http-example-com-");
    }

    #[test]
    fn test_subdirectory_disabled() {
        assert!(subdirectory("file", 0).is_none());
        assert!(subdirectory("file", -3).is_none());
    }

    #[test]
    fn test_subdirectory_lengths() {
        // md5("x") = 9dd4e461268c8034f5c8564e155c67a6
        assert_eq!(subdirectory("x", 1).as_deref(), Some("9d"));
        assert_eq!(subdirectory("x", 2).as_deref(), Some("9d"));
        assert_eq!(subdirectory("x", 3).as_deref(), Some("9dd4"));
        assert_eq!(subdirectory("x", 16).as_deref(), Some("9dd4"));
    }

    #[test]
    fn test_target_path_with_and_without_subdir() {
        let base = Path::new("/tmp/out");
        assert_eq!(target_path(base, 0, "file"), PathBuf::from("/tmp/out/file"));

        let with_subdir = target_path(base, 2, "x");
        assert_eq!(with_subdir, PathBuf::from("/tmp/out/9d/x"));
    }

    #[test]
    fn test_create_makes_directories() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = target_path(dir.path(), 2, "some-file");
        let file = create(&path).expect("create");
        drop(file);
        assert!(path.exists());
    }
}
