use crate::adapters::adls::AdlsClient;
use crate::domain::ports::Storage;
use crate::utils::error::Result;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct LocalStorage {
    base_path: PathBuf,
}

impl LocalStorage {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    fn full_path(&self, path: &str) -> PathBuf {
        self.base_path.join(path)
    }
}

impl Storage for LocalStorage {
    async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        Ok(tokio::fs::read(self.full_path(path)).await?)
    }

    async fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
        let full_path = self.full_path(path);

        if let Some(parent) = full_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        tokio::fs::write(full_path, data).await?;
        Ok(())
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        Ok(tokio::fs::try_exists(self.full_path(path)).await?)
    }

    fn location(&self, path: &str) -> String {
        self.full_path(path).display().to_string()
    }
}

/// `Storage` over an ADLS Gen2 filesystem, rooted at `base_dir`.
#[derive(Clone)]
pub struct AdlsStorage {
    client: AdlsClient,
    base_dir: String,
    overwrite: bool,
}

impl AdlsStorage {
    pub fn new(client: AdlsClient, base_dir: impl Into<String>, overwrite: bool) -> Self {
        Self {
            client,
            base_dir: base_dir.into().trim_matches('/').to_string(),
            overwrite,
        }
    }

    fn full_path(&self, path: &str) -> String {
        let path = path.trim_start_matches('/');
        if self.base_dir.is_empty() {
            path.to_string()
        } else {
            format!("{}/{}", self.base_dir, path)
        }
    }
}

impl Storage for AdlsStorage {
    async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        self.client.download(&self.full_path(path)).await
    }

    async fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
        self.client
            .upload(&self.full_path(path), data.to_vec(), self.overwrite)
            .await
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        self.client.exists(&self.full_path(path)).await
    }

    fn location(&self, path: &str) -> String {
        self.client.url_for(&self.full_path(path))
    }
}

pub fn file_name_of(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_local_storage_round_trip_creates_parents() {
        let dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(dir.path());

        assert!(!storage.exists("nested/out.csv").await.unwrap());
        storage.write_file("nested/out.csv", b"a,b\n").await.unwrap();

        assert!(storage.exists("nested/out.csv").await.unwrap());
        assert_eq!(storage.read_file("nested/out.csv").await.unwrap(), b"a,b\n");
        assert!(storage.location("nested/out.csv").ends_with("out.csv"));
    }

    #[test]
    fn test_file_name_of() {
        assert_eq!(file_name_of("raw/vidclub/jobs.csv"), "jobs.csv");
        assert_eq!(file_name_of("jobs.csv"), "jobs.csv");
    }
}
