//! Per-tile unit of work.
//!
//! One tile unit fetches a gutter-expanded image, crops it to the net
//! tile, writes the georeferencing world file and credits the progress
//! ledger. The cancellation check comes strictly after the credit, so
//! progress counts are monotonic and a canceled job never rolls back a
//! finished tile.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::crop::{CropError, TileCropper};
use crate::fetch::{FetchClient, FetchError};
use crate::format::TileFormat;
use crate::grid::{ResolvedResolution, TileCoord, TileGrid};
use crate::job::MapSource;
use crate::progress::ProgressLedger;
use crate::tile::request;
use crate::worldfile;

/// Errors that can abort a tile unit.
#[derive(Debug, Error)]
pub enum TileError {
    /// The GetMap fetch failed.
    #[error("tile fetch failed: {0}")]
    Fetch(#[from] FetchError),

    /// The gutter crop failed.
    #[error("tile crop failed: {0}")]
    Crop(#[from] CropError),

    /// A tile or transient file could not be written or removed.
    #[error("filesystem operation failed on {}: {}", .path.display(), .source)]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The crop task panicked on the blocking pool.
    #[error("crop task panicked: {0}")]
    TaskPanicked(String),
}

/// Terminal state of one tile unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileOutcome {
    /// The tile was produced and credited.
    Completed,
    /// The tile was produced and credited, and a pending cancellation
    /// was observed afterwards.
    CancelObserved,
    /// The unit never started because the job is shutting down. No side
    /// effects.
    Skipped,
}

/// Everything a tile unit needs, borrowed from the running job.
#[derive(Debug, Clone, Copy)]
pub struct TileUnit<'a> {
    /// Id of the owning job, for progress crediting.
    pub job_id: &'a str,
    /// Source the tile is fetched from.
    pub source: &'a MapSource,
    /// Resolution the tile is rendered at.
    pub resolution: &'a ResolvedResolution,
    /// Grid the tile belongs to.
    pub grid: &'a TileGrid,
    /// Position within the grid.
    pub coord: TileCoord,
    /// Directory the tile is persisted into.
    pub dir: &'a Path,
    /// Format of the fetched image.
    pub input_format: &'static TileFormat,
    /// Format of the persisted tile.
    pub output_format: &'static TileFormat,
}

/// Executes tile units against the injected collaborators.
#[derive(Debug)]
pub struct TileProcessor<F, C> {
    fetcher: Arc<F>,
    cropper: Arc<C>,
    ledger: Arc<ProgressLedger>,
}

impl<F, C> TileProcessor<F, C>
where
    F: FetchClient,
    C: TileCropper + 'static,
{
    /// Creates a processor sharing the job's collaborators.
    pub fn new(fetcher: Arc<F>, cropper: Arc<C>, ledger: Arc<ProgressLedger>) -> Self {
        Self {
            fetcher,
            cropper,
            ledger,
        }
    }

    /// Runs one tile unit to completion.
    ///
    /// Side effects on success: one durable tile + world-file pair in
    /// `unit.dir`, one ledger credit. The transient gutter file never
    /// outlives the call.
    pub async fn process(&self, unit: &TileUnit<'_>) -> Result<TileOutcome, TileError> {
        let grid = unit.grid;
        let (x0, y0) = grid.tile_top_left(unit.coord);
        let extent = grid.gutter_extent(unit.coord);
        let tile_size_px = grid.tile_side_px + 2 * grid.gutter_px;
        let url = request::getmap_url(unit.source, &extent, tile_size_px, tile_size_px);

        let stem = format!("{}_{}", unit.coord.col, unit.coord.row);
        let gutter_path = unit
            .dir
            .join(format!("{}_gutter.{}", stem, unit.input_format.file_ext));
        let tile_path = unit
            .dir
            .join(format!("{}.{}", stem, unit.output_format.file_ext));
        let world_path = unit
            .dir
            .join(format!("{}.{}", stem, unit.output_format.world_file_ext));

        debug!(
            job = unit.job_id,
            source = %unit.source.id,
            col = unit.coord.col,
            row = unit.coord.row,
            "fetching tile"
        );

        let body = self.fetcher.fetch(&url).await?;
        tokio::fs::write(&gutter_path, &body)
            .await
            .map_err(|source| TileError::Io {
                path: gutter_path.clone(),
                source,
            })?;

        // CPU-bound image work stays off the async worker threads.
        let cropper = Arc::clone(&self.cropper);
        let (crop_in, crop_out) = (gutter_path.clone(), tile_path.clone());
        let (tile_side_px, gutter_px) = (grid.tile_side_px, grid.gutter_px);
        tokio::task::spawn_blocking(move || {
            cropper.crop(&crop_in, &crop_out, tile_side_px, gutter_px)
        })
        .await
        .map_err(|e| TileError::TaskPanicked(e.to_string()))??;

        tokio::fs::remove_file(&gutter_path)
            .await
            .map_err(|source| TileError::Io {
                path: gutter_path.clone(),
                source,
            })?;

        let content = worldfile::world_file_content(x0, y0, unit.resolution.ground_resolution);
        tokio::fs::write(&world_path, content)
            .await
            .map_err(|source| TileError::Io {
                path: world_path.clone(),
                source,
            })?;

        // Credit first, then look at the cancel flag: a finished tile
        // always counts, even on a job that is being canceled.
        match self.ledger.complete_tile(unit.job_id) {
            Some(credit) if credit.cancel_requested => Ok(TileOutcome::CancelObserved),
            _ => Ok(TileOutcome::Completed),
        }
    }
}
