use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::OnceCell;

use crate::cmapss::{Dataset, DatasetError, Sample};

/// Lazily loaded, shared test set. A failed load is not cached, so the next
/// call tries the file again.
#[derive(Debug)]
pub struct SampleStore {
    path: PathBuf,
    dataset: OnceCell<Arc<Dataset>>,
}

impl SampleStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            dataset: OnceCell::new(),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.dataset.initialized()
    }

    pub async fn dataset(&self) -> Result<Arc<Dataset>, DatasetError> {
        let dataset = self
            .dataset
            .get_or_try_init(|| async {
                stdio::system("Loading test data for simulation...");
                match Dataset::load(&self.path).await {
                    Ok(dataset) => {
                        stdio::success(
                            "DATA",
                            &format!(
                                "Test data loaded into memory ({} units)",
                                dataset.units().len()
                            ),
                        );
                        Ok(Arc::new(dataset))
                    }
                    Err(err) => {
                        tracing::warn!(
                            path = %self.path.display(),
                            error = %err,
                            "failed to load test data"
                        );
                        stdio::error("DATA", &err.to_string());
                        Err(err)
                    }
                }
            })
            .await?;
        Ok(Arc::clone(dataset))
    }

    /// Random unit sequence, loading the file on first use.
    pub async fn sample(&self) -> Result<Sample, DatasetError> {
        let dataset = self.dataset().await?;
        let sample = dataset
            .sample(&mut rand::thread_rng())
            .ok_or(DatasetError::Empty)?;
        stdio::success("DATA", &format!("Serving sequence for Unit #{}", sample.unit_id));
        Ok(sample)
    }
}
