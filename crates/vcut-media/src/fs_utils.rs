//! Filesystem helpers for job artifacts.

use std::io::ErrorKind;
use std::path::PathBuf;
use tokio::fs;

/// Delete a set of artifact files, best effort.
///
/// Missing files count as deleted. Other failures are logged and skipped.
/// Returns the number of files that could not be removed.
pub async fn delete_files(paths: &[PathBuf]) -> usize {
    let mut failures = 0;

    for path in paths {
        match fs::remove_file(path).await {
            Ok(()) => tracing::debug!("Deleted artifact {}", path.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                failures += 1;
                tracing::warn!("Failed to delete artifact {}: {}", path.display(), e);
            }
        }
    }

    failures
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_delete_files_removes_all() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.mp4");
        let b = dir.path().join("b.mp4");
        fs::write(&a, b"a").await.unwrap();
        fs::write(&b, b"b").await.unwrap();

        let failures = delete_files(&[a.clone(), b.clone()]).await;

        assert_eq!(failures, 0);
        assert!(!a.exists());
        assert!(!b.exists());
    }

    #[tokio::test]
    async fn test_delete_files_ignores_missing() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("gone.mp4");
        assert_eq!(delete_files(&[missing]).await, 0);
    }

    #[tokio::test]
    async fn test_delete_files_reports_failures() {
        let dir = TempDir::new().unwrap();
        // A non-empty directory cannot be removed with remove_file
        let nested = dir.path().join("nested");
        fs::create_dir(&nested).await.unwrap();
        fs::write(nested.join("x"), b"x").await.unwrap();
        let keep = dir.path().join("keep.mp4");
        fs::write(&keep, b"k").await.unwrap();

        let failures = delete_files(&[nested.clone(), keep.clone()]).await;

        assert_eq!(failures, 1);
        assert!(nested.exists());
        assert!(!keep.exists());
    }
}
