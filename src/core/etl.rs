use crate::domain::ports::Pipeline;
use crate::utils::error::Result;
use crate::utils::monitor::SystemMonitor;
use std::time::Instant;

/// Drives a pipeline through extract, transform and load.
pub struct EtlEngine<P: Pipeline> {
    pipeline: P,
    monitor: SystemMonitor,
}

impl<P: Pipeline> EtlEngine<P> {
    pub fn new(pipeline: P) -> Self {
        Self::new_with_monitoring(pipeline, false)
    }

    pub fn new_with_monitoring(pipeline: P, monitor_enabled: bool) -> Self {
        Self {
            pipeline,
            monitor: SystemMonitor::new(monitor_enabled),
        }
    }

    pub async fn run(&self) -> Result<String> {
        let started = Instant::now();
        tracing::info!("🚀 Starting ETL process");
        self.monitor.log_stats("start");

        tracing::info!("📥 Extracting data...");
        let raw_data = self.pipeline.extract().await?;
        tracing::info!("Extracted {} records", raw_data.len());
        self.monitor.log_stats("extract");

        tracing::info!("🔄 Transforming data...");
        let transformed_result = self.pipeline.transform(raw_data).await?;
        tracing::info!(
            "Transformed {} records",
            transformed_result.processed_records.len()
        );
        self.monitor.log_stats("transform");

        tracing::info!("💾 Loading data...");
        let output_path = self.pipeline.load(transformed_result).await?;
        self.monitor.log_stats("load");

        tracing::info!(
            "✅ ETL process finished in {:.2}s, output: {}",
            started.elapsed().as_secs_f64(),
            output_path
        );
        self.monitor.log_final_stats();
        Ok(output_path)
    }
}
