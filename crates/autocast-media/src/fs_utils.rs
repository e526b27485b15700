//! Scratch files and directories under a configured work directory.

use std::io::Write;
use std::path::Path;

use tempfile::{NamedTempFile, TempDir};
use tokio::fs;

use crate::error::MediaResult;

/// Create a self-deleting directory inside `parent`, creating `parent` first.
pub async fn scratch_dir(parent: impl AsRef<Path>, prefix: &str) -> MediaResult<TempDir> {
    let parent = parent.as_ref();
    fs::create_dir_all(parent).await?;
    let dir = tempfile::Builder::new().prefix(prefix).tempdir_in(parent)?;
    tracing::debug!(path = %dir.path().display(), "Created scratch directory");
    Ok(dir)
}

/// Write `bytes` to a self-deleting file inside `parent`.
pub async fn scratch_file(
    parent: impl AsRef<Path>,
    prefix: &str,
    suffix: &str,
    bytes: &[u8],
) -> MediaResult<NamedTempFile> {
    let parent = parent.as_ref();
    fs::create_dir_all(parent).await?;
    let mut file = tempfile::Builder::new()
        .prefix(prefix)
        .suffix(suffix)
        .tempfile_in(parent)?;
    file.write_all(bytes)?;
    file.flush()?;
    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scratch_dir_lives_under_parent() {
        let root = tempfile::tempdir().unwrap();
        let parent = root.path().join("work").join("nested");

        let dir = scratch_dir(&parent, "autocast-render-").await.unwrap();
        assert!(dir.path().starts_with(&parent));
        assert!(dir.path().is_dir());

        let path = dir.path().to_path_buf();
        drop(dir);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_scratch_file_keeps_suffix_and_bytes() {
        let root = tempfile::tempdir().unwrap();

        let file = scratch_file(root.path(), "autocast-probe-", ".mp3", b"ID3")
            .await
            .unwrap();
        assert!(file.path().starts_with(root.path()));
        assert_eq!(file.path().extension().and_then(|e| e.to_str()), Some("mp3"));
        assert_eq!(std::fs::read(file.path()).unwrap(), b"ID3");
    }
}
