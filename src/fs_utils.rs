//! Cross-platform filesystem utilities
//!
//! Helpers shared by the report store, the adapter result cache and the
//! transaction log:
//! - `normalize_path`: strips the Windows `\\?\` prefix from canonicalized paths
//! - `atomic_rename`: atomic file replacement (Windows requires explicit delete)
//! - `write_atomic`: write-then-rename with a directory fsync
//! - `cache_base_dir`: platform-appropriate cache directory

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Normalize Windows paths by removing the `\\?\` prefix if present.
///
/// On Windows, `Path::canonicalize()` returns extended-length paths
/// (`\\?\C:\...`) which break string comparison, hash computation and
/// user-facing display. No-op on Unix.
pub fn normalize_path(path: &Path) -> PathBuf {
    #[cfg(windows)]
    {
        let s = path.to_string_lossy();
        if let Some(stripped) = s.strip_prefix(r"\\?\UNC\") {
            return PathBuf::from(format!(r"\\{}", stripped));
        }
        if let Some(stripped) = s.strip_prefix(r"\\?\") {
            return PathBuf::from(stripped);
        }
    }
    path.to_path_buf()
}

/// Cross-platform atomic rename that handles Windows file replacement.
///
/// On Unix, `fs::rename` atomically replaces the target if it exists.
/// On Windows, the target must be deleted first.
pub fn atomic_rename(src: &Path, dst: &Path) -> io::Result<()> {
    #[cfg(windows)]
    {
        if dst.exists() {
            fs::remove_file(dst)?;
        }
    }
    fs::rename(src, dst)
}

/// Fsync a directory so a just-renamed entry survives a crash.
///
/// Directory handles cannot be opened for sync on Windows; the rename itself
/// is the strongest guarantee available there.
pub fn fsync_dir(dir: &Path) -> io::Result<()> {
    #[cfg(unix)]
    {
        fs::File::open(dir)?.sync_all()?;
    }
    #[cfg(not(unix))]
    {
        let _ = dir;
    }
    Ok(())
}

/// Durable atomic write: write to a sibling temp file, fsync it, rename over
/// the destination, then fsync the containing directory.
pub fn write_atomic(dst: &Path, contents: &[u8]) -> io::Result<()> {
    let parent = dst
        .parent()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "destination has no parent"))?;
    fs::create_dir_all(parent)?;

    let file_name = dst
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "destination has no file name"))?;
    let tmp = parent.join(format!(".{}.tmp", file_name.to_string_lossy()));

    {
        let mut file = fs::File::create(&tmp)?;
        io::Write::write_all(&mut file, contents)?;
        file.sync_all()?;
    }

    atomic_rename(&tmp, dst)?;
    fsync_dir(parent)
}

/// Platform cache base directory for adapter result caching.
///
/// - **Windows**: `%LOCALAPPDATA%\debloat\cache`
/// - **Unix**: `$XDG_CACHE_HOME/debloat` or `~/.cache/debloat`
/// - **Fallback**: system temp directory + `debloat`
pub fn cache_base_dir() -> PathBuf {
    #[cfg(windows)]
    {
        if let Ok(local_appdata) = std::env::var("LOCALAPPDATA") {
            return PathBuf::from(local_appdata).join("debloat").join("cache");
        }
        if let Some(home) = dirs::home_dir() {
            return home.join("AppData").join("Local").join("debloat").join("cache");
        }
    }

    #[cfg(not(windows))]
    {
        if let Ok(xdg_cache) = std::env::var("XDG_CACHE_HOME") {
            return PathBuf::from(xdg_cache).join("debloat");
        }
        if let Some(home) = dirs::home_dir() {
            return home.join(".cache").join("debloat");
        }
    }

    std::env::temp_dir().join("debloat")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path_preserves_regular_paths() {
        let unix_path = PathBuf::from("/home/user/repo");
        assert_eq!(normalize_path(&unix_path), unix_path);
    }

    #[test]
    fn test_write_atomic_creates_and_replaces() {
        let dir = tempfile::tempdir().expect("tempdir");
        let dst = dir.path().join("report.json");

        write_atomic(&dst, b"first").expect("first write");
        assert_eq!(fs::read(&dst).unwrap(), b"first");

        write_atomic(&dst, b"second").expect("second write");
        assert_eq!(fs::read(&dst).unwrap(), b"second");

        // No temp file left behind
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_write_atomic_creates_parent_dirs() {
        let dir = tempfile::tempdir().expect("tempdir");
        let dst = dir.path().join("nested").join("deep").join("file.json");
        write_atomic(&dst, b"content").expect("nested write");
        assert_eq!(fs::read(&dst).unwrap(), b"content");
    }

    #[test]
    fn test_cache_base_dir_contains_debloat() {
        let dir = cache_base_dir();
        assert!(dir.to_string_lossy().contains("debloat"));
    }
}
