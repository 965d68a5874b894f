//! Traversal orchestration.
//!
//! Walks the three nested levels of a job - resolutions, sources, tile
//! grid - in list order, creating each level's workspace directory on the
//! way down. Tiles flow through a bounded buffer of concurrent units;
//! with the default width of one this is the strict sequential row-major
//! traversal. The first tile failure or an observed cancellation stops
//! every enclosing level: nothing new starts, in-flight units drain and
//! keep their credits.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::{JobError, JobOutcome, MapSource, TilingJob};
use crate::crop::TileCropper;
use crate::fetch::FetchClient;
use crate::format::{self, TileFormat};
use crate::grid::{ResolvedResolution, TileGrid};
use crate::progress::ProgressLedger;
use crate::tile::{TileError, TileOutcome, TileProcessor, TileUnit};

/// Drives one job through its resolution/source/tile traversal.
pub(crate) struct JobRunner<'a, F, C> {
    job: &'a TilingJob,
    resolutions: &'a [ResolvedResolution],
    processor: TileProcessor<F, C>,
    ledger: Arc<ProgressLedger>,
    token: CancellationToken,
}

impl<'a, F, C> JobRunner<'a, F, C>
where
    F: FetchClient,
    C: TileCropper + 'static,
{
    pub(crate) fn new(
        job: &'a TilingJob,
        resolutions: &'a [ResolvedResolution],
        fetcher: Arc<F>,
        cropper: Arc<C>,
        ledger: Arc<ProgressLedger>,
        token: CancellationToken,
    ) -> Self {
        Self {
            job,
            resolutions,
            processor: TileProcessor::new(fetcher, cropper, Arc::clone(&ledger)),
            ledger,
            token,
        }
    }

    /// Runs the traversal to a terminal state.
    ///
    /// The caller owns the ledger entry; this method only reads and
    /// credits it.
    pub(crate) async fn run(&self) -> Result<JobOutcome, JobError> {
        let job = self.job;
        let output_format = format::from_mime(&job.output_format)
            .ok_or_else(|| JobError::UnsupportedFormat(job.output_format.clone()))?;

        ensure_dir(&job.workspace_root).await?;
        let job_dir = job.workspace_root.join(&job.id);
        ensure_dir(&job_dir).await?;

        'traversal: for resolution in self.resolutions {
            // a single resolution writes directly into the job directory
            let resolution_dir = if self.resolutions.len() == 1 {
                job_dir.clone()
            } else {
                job_dir.join(&resolution.id)
            };
            ensure_dir(&resolution_dir).await?;

            for source in &job.sources {
                let source_dir = if job.sources.len() == 1 {
                    resolution_dir.clone()
                } else {
                    resolution_dir.join(&source.id)
                };
                ensure_dir(&source_dir).await?;

                let input_mime = source
                    .format()
                    .ok_or_else(|| JobError::MissingSourceFormat(source.id.clone()))?;
                let input_format = format::from_mime(input_mime)
                    .ok_or_else(|| JobError::UnsupportedFormat(input_mime.to_string()))?;

                let grid = TileGrid::plan(&job.area, resolution, job.tile_size_px, job.gutter_px)?;
                info!(
                    job = %job.id,
                    resolution = %resolution.id,
                    source = %source.id,
                    tiles = grid.tile_count(),
                    "processing tile grid"
                );

                self.run_grid(&grid, &source_dir, source, resolution, input_format, output_format)
                    .await?;

                if self.token.is_cancelled() {
                    break 'traversal;
                }
            }
        }

        // A cancel that loses the race against the final tile does not
        // turn a fully produced job into a canceled one.
        if self.token.is_cancelled() {
            let fully_done = self
                .ledger
                .snapshot(&job.id)
                .map(|snapshot| snapshot.tiles_completed >= snapshot.total_tiles)
                .unwrap_or(false);
            if fully_done {
                Ok(JobOutcome::Completed)
            } else {
                Ok(JobOutcome::Canceled)
            }
        } else {
            Ok(JobOutcome::Completed)
        }
    }

    /// Processes one grid with at most `parallelism` units in flight.
    async fn run_grid(
        &self,
        grid: &TileGrid,
        dir: &Path,
        source: &MapSource,
        resolution: &ResolvedResolution,
        input_format: &'static TileFormat,
        output_format: &'static TileFormat,
    ) -> Result<(), JobError> {
        let stop = AtomicBool::new(false);
        let width = self.job.parallelism.max(1);

        let units = futures::stream::iter(grid.coords())
            .map(|coord| {
                let unit = TileUnit {
                    job_id: self.job.id.as_str(),
                    source,
                    resolution,
                    grid,
                    coord,
                    dir,
                    input_format,
                    output_format,
                };
                let stop = &stop;
                async move {
                    if stop.load(Ordering::Acquire) || self.token.is_cancelled() {
                        return Ok(TileOutcome::Skipped);
                    }
                    self.processor.process(&unit).await
                }
            })
            .buffered(width);
        futures::pin_mut!(units);

        // Drain the whole stream even after a terminal signal: units
        // already in flight must finish and keep their credits.
        let mut first_error: Option<TileError> = None;
        while let Some(result) = units.next().await {
            match result {
                Ok(TileOutcome::Completed) | Ok(TileOutcome::Skipped) => {}
                Ok(TileOutcome::CancelObserved) => {
                    stop.store(true, Ordering::Release);
                }
                Err(error) => {
                    stop.store(true, Ordering::Release);
                    if first_error.is_none() {
                        first_error = Some(error);
                    } else {
                        warn!(job = %self.job.id, error = %error, "tile failure while draining");
                    }
                }
            }
        }

        match first_error {
            Some(error) => Err(error.into()),
            None => Ok(()),
        }
    }
}

async fn ensure_dir(path: &Path) -> Result<(), JobError> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|source| JobError::Io {
            path: path.to_path_buf(),
            source,
        })
}
