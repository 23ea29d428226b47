//! Local storage for generated images and saved reference images.
//!
//! Every task gets its own directory under the artifact root, named by its
//! public id, so deleting a task is a single directory removal. Chain
//! resolution reads these files back lazily when a continuation replays
//! the dialogue.

use std::path::{Path, PathBuf};

/// Filesystem store rooted at the configured artifacts directory.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory holding a task's artifacts.
    pub fn task_dir(&self, public_id: &str) -> PathBuf {
        self.root.join(public_id)
    }

    /// Persist one generated image; returns its path.
    pub async fn save_image(
        &self,
        public_id: &str,
        index: usize,
        bytes: &[u8],
    ) -> std::io::Result<PathBuf> {
        self.write(public_id, format!("image_{index}.png"), bytes)
            .await
    }

    /// Persist one reference image attached at submission time.
    pub async fn save_reference(
        &self,
        public_id: &str,
        index: usize,
        bytes: &[u8],
    ) -> std::io::Result<PathBuf> {
        self.write(public_id, format!("ref_{index}.png"), bytes).await
    }

    /// Read an artifact back by the path stored on the task.
    pub async fn read(&self, path: &Path) -> std::io::Result<Vec<u8>> {
        tokio::fs::read(path).await
    }

    /// Remove a task's directory and everything in it. Missing directories
    /// are fine — the task may never have produced artifacts.
    pub async fn remove_task(&self, public_id: &str) -> std::io::Result<()> {
        match tokio::fs::remove_dir_all(self.task_dir(public_id)).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err),
        }
    }

    async fn write(
        &self,
        public_id: &str,
        filename: String,
        bytes: &[u8],
    ) -> std::io::Result<PathBuf> {
        let dir = self.task_dir(public_id);
        tokio::fs::create_dir_all(&dir).await?;
        let path = dir.join(filename);
        tokio::fs::write(&path, bytes).await?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn save_read_remove_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(tmp.path());

        let path = store.save_image("edit-abc", 0, b"png").await.unwrap();
        assert!(path.starts_with(store.task_dir("edit-abc")));
        assert_eq!(store.read(&path).await.unwrap(), b"png");

        store.remove_task("edit-abc").await.unwrap();
        assert!(store.read(&path).await.is_err());

        // Removing again is a no-op.
        store.remove_task("edit-abc").await.unwrap();
    }

    #[tokio::test]
    async fn references_and_results_share_the_task_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(tmp.path());

        let reference = store.save_reference("edit-x", 0, b"r").await.unwrap();
        let image = store.save_image("edit-x", 0, b"i").await.unwrap();
        assert_eq!(reference.parent(), image.parent());
        assert_ne!(reference, image);
    }
}
