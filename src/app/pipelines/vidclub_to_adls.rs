use crate::adapters::storage::file_name_of;
use crate::app::tasks::{run_task, VidClubToDf};
use crate::domain::model::{Frame, TransformResult};
use crate::domain::ports::{Pipeline, Storage};
use crate::utils::error::Result;
use std::io::Write;
use zip::write::{FileOptions, ZipWriter};

pub const SKIPPED: &str = "skipped";

#[derive(Debug, Clone)]
pub struct LoadOptions {
    pub local_file_path: String,
    pub file_sep: u8,
    /// Path of the uploaded file, relative to the remote storage root.
    pub remote_path: String,
    /// Local path of an optional zip archive of the written file.
    pub zip_path: Option<String>,
}

/// Downloads one Vid Club endpoint and lands it in the data lake.
pub struct VidClubToAdls<L: Storage, R: Storage> {
    extract_task: VidClubToDf,
    local: L,
    remote: R,
    options: LoadOptions,
}

impl<L: Storage, R: Storage> VidClubToAdls<L, R> {
    pub fn new(extract_task: VidClubToDf, local: L, remote: R, options: LoadOptions) -> Self {
        Self {
            extract_task,
            local,
            remote,
            options,
        }
    }

    fn render(&self, result: &TransformResult) -> Result<String> {
        match self.options.file_sep {
            b',' => Ok(result.csv_output.clone()),
            b'\t' => Ok(result.tsv_output.clone()),
            sep => result.frame.to_delimited(sep),
        }
    }

    fn zip(&self, content: &[u8]) -> Result<Vec<u8>> {
        let mut zip = ZipWriter::new(std::io::Cursor::new(Vec::new()));
        zip.start_file::<_, ()>(
            file_name_of(&self.options.local_file_path),
            FileOptions::default(),
        )?;
        zip.write_all(content)?;
        let cursor = zip.finish()?;
        Ok(cursor.into_inner())
    }
}

#[async_trait::async_trait]
impl<L: Storage, R: Storage> Pipeline for VidClubToAdls<L, R> {
    async fn extract(&self) -> Result<Frame> {
        run_task(&self.extract_task).await
    }

    async fn transform(&self, data: Frame) -> Result<TransformResult> {
        let csv_output = data.to_delimited(b',')?;
        let tsv_output = data.to_delimited(b'\t')?;
        tracing::debug!("Rendered {} rows, {} columns", data.len(), data.columns.len());

        Ok(TransformResult {
            processed_records: data.rows.clone(),
            csv_output,
            tsv_output,
            frame: data,
        })
    }

    async fn load(&self, result: TransformResult) -> Result<String> {
        if result.frame.is_empty() {
            tracing::warn!("⚠️ No data to load, nothing was written or uploaded");
            return Ok(SKIPPED.to_string());
        }

        let content = self.render(&result)?;
        self.local
            .write_file(&self.options.local_file_path, content.as_bytes())
            .await?;
        tracing::info!(
            "💾 Wrote {} rows to {}",
            result.frame.len(),
            self.local.location(&self.options.local_file_path)
        );

        if let Some(zip_path) = &self.options.zip_path {
            let zip_data = self.zip(content.as_bytes())?;
            tracing::debug!("Writing ZIP file ({} bytes) to storage", zip_data.len());
            self.local.write_file(zip_path, &zip_data).await?;
            tracing::info!("📦 Archive saved: {}", self.local.location(zip_path));
        }

        self.remote
            .write_file(&self.options.remote_path, content.as_bytes())
            .await?;
        let location = self.remote.location(&self.options.remote_path);
        tracing::info!("☁️ Uploaded to {}", location);
        Ok(location)
    }
}
