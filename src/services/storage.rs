use std::path::{Path, PathBuf};

use uuid::Uuid;

/// Server-side artifact blob area. Files are written on job creation
/// and removed exactly once, when a job reaches `done`.
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create the storage directory if it does not exist.
    pub async fn init(&self) -> Result<(), StorageError> {
        tokio::fs::create_dir_all(&self.root).await?;
        Ok(())
    }

    /// Store artifact bytes durably; returns the stored path.
    /// The unique prefix keeps colliding upload names apart.
    pub async fn save(&self, original_name: &str, data: &[u8]) -> Result<String, StorageError> {
        let stored_name = format!("{}_{}", Uuid::new_v4(), sanitize_filename(original_name));
        let path = self.root.join(stored_name);
        tokio::fs::write(&path, data).await?;
        Ok(path.to_string_lossy().into_owned())
    }

    /// Read artifact bytes back.
    pub async fn load(&self, stored_path: &str) -> Result<Vec<u8>, StorageError> {
        Ok(tokio::fs::read(stored_path).await?)
    }

    /// Remove an artifact file.
    pub async fn delete(&self, stored_path: &str) -> Result<(), StorageError> {
        tokio::fs::remove_file(stored_path).await?;
        Ok(())
    }

    pub async fn exists(&self, stored_path: &str) -> bool {
        tokio::fs::try_exists(stored_path).await.unwrap_or(false)
    }
}

/// Reduce an uploaded filename to its final path component with NUL
/// bytes stripped; never trust client-supplied paths.
pub fn sanitize_filename(name: &str) -> String {
    let base = Path::new(name)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let cleaned: String = base.chars().filter(|c| *c != '\0').collect();
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Artifact I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_directories() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("/tmp/report.pdf"), "report.pdf");
        assert_eq!(sanitize_filename("main.cpp"), "main.cpp");
    }

    #[test]
    fn sanitize_handles_degenerate_names() {
        assert_eq!(sanitize_filename(""), "upload");
        assert_eq!(sanitize_filename(".."), "upload");
        assert_eq!(sanitize_filename("a\0b.py"), "ab.py");
    }

    #[tokio::test]
    async fn save_load_delete_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        store.init().await.unwrap();

        let path = store.save("main.cpp", b"int main() {}").await.unwrap();
        assert!(store.exists(&path).await);
        assert_eq!(store.load(&path).await.unwrap(), b"int main() {}");

        store.delete(&path).await.unwrap();
        assert!(!store.exists(&path).await);
        assert!(store.delete(&path).await.is_err());
    }
}
