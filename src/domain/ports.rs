use crate::domain::model::{Frame, TransformResult};
use crate::utils::error::Result;
use async_trait::async_trait;

pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
    fn exists(&self, path: &str) -> impl std::future::Future<Output = Result<bool>> + Send;
    /// Human readable location of `path`, used in logs and pipeline output.
    fn location(&self, path: &str) -> String;
}

/// A store of named secret values (Azure Key Vault in production).
#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn get_secret(&self, name: &str) -> Result<String>;
    /// Creates the secret, or a new version of it. Returns the secret id.
    async fn set_secret(&self, name: &str, value: &str) -> Result<String>;
}

#[async_trait]
pub trait Pipeline: Send + Sync {
    async fn extract(&self) -> Result<Frame>;
    async fn transform(&self, data: Frame) -> Result<TransformResult>;
    async fn load(&self, result: TransformResult) -> Result<String>;
}
