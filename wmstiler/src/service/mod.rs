//! High-level facade for running tiling jobs.
//!
//! [`TilingService`] owns the shared collaborators - the fetch client,
//! the cropper and the progress ledger - and exposes the three entry
//! points of the crate: [`start`](TilingService::start),
//! [`cancel`](TilingService::cancel) and
//! [`progress`](TilingService::progress). Each service instance carries
//! its own ledger, so independent instances can coexist (and be tested)
//! without sharing state.

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::ClientConfig;
use crate::crop::{ImageCropper, TileCropper};
use crate::fetch::{FetchClient, FetchError, ReqwestFetcher};
use crate::grid;
use crate::job::{JobError, JobOutcome, JobRunner, TilingJob};
use crate::progress::{CancelAck, LedgerError, ProgressLedger, ProgressSnapshot};

/// Facade over the tile-download engine.
pub struct TilingService<F = ReqwestFetcher, C = ImageCropper> {
    fetcher: Arc<F>,
    cropper: Arc<C>,
    ledger: Arc<ProgressLedger>,
}

impl TilingService {
    /// Creates a service with the real HTTP and image collaborators.
    pub fn new(config: ClientConfig) -> Result<Self, FetchError> {
        Ok(Self::with_collaborators(
            Arc::new(ReqwestFetcher::new(&config)?),
            Arc::new(ImageCropper::new()),
        ))
    }
}

impl<F, C> TilingService<F, C>
where
    F: FetchClient,
    C: TileCropper + 'static,
{
    /// Creates a service over injected collaborators.
    ///
    /// This is the seam tests use to substitute a mock fetcher or
    /// cropper.
    pub fn with_collaborators(fetcher: Arc<F>, cropper: Arc<C>) -> Self {
        Self {
            fetcher,
            cropper,
            ledger: Arc::new(ProgressLedger::new()),
        }
    }

    /// Runs a job to a terminal state.
    ///
    /// Creates the job's progress entry (sized by a pre-count of all
    /// tiles, so percentages are accurate from the first query), drives
    /// the traversal and removes the entry again on every terminal path.
    ///
    /// # Errors
    ///
    /// The first error of any tile unit, grid planning or the workspace
    /// filesystem; `LedgerError::DuplicateJob` via [`JobError::Ledger`]
    /// if a job with the same id is live.
    pub async fn start(&self, job: TilingJob) -> Result<JobOutcome, JobError> {
        let resolutions = job
            .resolutions
            .iter()
            .map(|resolution| resolution.resolve())
            .collect::<Result<Vec<_>, _>>()?;
        let total_tiles = grid::total_tile_count(
            &job.area,
            &resolutions,
            job.tile_size_px,
            job.gutter_px,
            job.sources.len(),
        )?;

        let token = self.ledger.begin(&job.id, total_tiles)?;
        info!(job = %job.id, title = %job.title, total_tiles, "job started");

        let runner = JobRunner::new(
            &job,
            &resolutions,
            Arc::clone(&self.fetcher),
            Arc::clone(&self.cropper),
            Arc::clone(&self.ledger),
            token,
        );
        let result = runner.run().await;

        // The acknowledger fires only after all in-flight units drained,
        // and only when the cancellation actually took effect.
        if matches!(&result, Ok(JobOutcome::Canceled)) {
            if let Some(acknowledger) = self.ledger.take_acknowledger(&job.id) {
                let _ = acknowledger.send(job.id.clone());
            }
        }
        self.ledger.end(&job.id);

        match &result {
            Ok(JobOutcome::Completed) => info!(job = %job.id, "job completed"),
            Ok(JobOutcome::Canceled) => info!(job = %job.id, "job canceled"),
            Err(error) => warn!(job = %job.id, error = %error, "job failed"),
        }
        result
    }

    /// Requests cooperative cancellation of a running job.
    ///
    /// Returns immediately. The returned [`CancelAck`] resolves with the
    /// job id once the job has drained; if the job terminates naturally
    /// first, the channel closes without a value.
    ///
    /// # Errors
    ///
    /// [`LedgerError::UnknownJob`] if no job with this id is live.
    pub fn cancel(&self, job_id: &str) -> Result<CancelAck, LedgerError> {
        self.ledger.request_cancel(job_id)
    }

    /// Returns the progress of a running job, or `None` for unknown ids.
    pub fn progress(&self, job_id: &str) -> Option<ProgressSnapshot> {
        self.ledger.snapshot(job_id)
    }

    /// The service's progress ledger.
    pub fn ledger(&self) -> &ProgressLedger {
        &self.ledger
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_with_default_config() {
        let service = TilingService::new(ClientConfig::default()).unwrap();
        assert_eq!(service.ledger().active_jobs(), 0);
    }

    #[test]
    fn test_progress_unknown_job_is_none() {
        let service = TilingService::new(ClientConfig::default()).unwrap();
        assert!(service.progress("missing").is_none());
    }

    #[test]
    fn test_cancel_unknown_job_fails() {
        let service = TilingService::new(ClientConfig::default()).unwrap();
        assert_eq!(
            service.cancel("missing").unwrap_err(),
            LedgerError::UnknownJob("missing".to_string())
        );
    }
}
