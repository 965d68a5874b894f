//! Job description and execution.
//!
//! A [`TilingJob`] describes one end-to-end tiling request: the area, the
//! target resolutions, the GetMap sources and the workspace to persist
//! into. The job is immutable for the lifetime of a run; execution state
//! lives in the [`crate::progress::ProgressLedger`].

mod runner;

pub(crate) use runner::JobRunner;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::grid::{BoundingBox, GridError, Resolution};
use crate::progress::LedgerError;
use crate::tile::TileError;

/// One end-to-end tiling request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TilingJob {
    /// Unique job id, also the name of the job's workspace directory.
    pub id: String,
    /// Human-readable title for logging.
    pub title: String,
    /// MIME type of the produced tiles (e.g. `image/png`).
    pub output_format: String,
    /// Directory under which the job's workspace is created.
    pub workspace_root: PathBuf,
    /// Area to cover, in ground units.
    pub area: BoundingBox,
    /// Side of a fetched tile in pixels, gutter included.
    pub tile_size_px: u32,
    /// Gutter width in pixels on each side of a fetched tile.
    pub gutter_px: u32,
    /// Target resolutions, processed in list order.
    pub resolutions: Vec<Resolution>,
    /// GetMap sources, processed in list order.
    pub sources: Vec<MapSource>,
    /// Number of tile units allowed in flight at once. `1` (the
    /// default) preserves strict row-major completion order.
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
}

/// A GetMap source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapSource {
    /// Identifier, used as the workspace subdirectory name.
    pub id: String,
    /// Base URL up to and including the `?` (or trailing `&`) of the
    /// query string; key-value pairs are appended verbatim.
    pub base_url: String,
    /// Query parameters in the order they are appended. Must contain a
    /// `FORMAT` entry naming the source's image MIME type.
    pub params: Vec<(String, String)>,
}

impl MapSource {
    /// The source's image MIME type from its `FORMAT` parameter.
    pub fn format(&self) -> Option<&str> {
        self.params
            .iter()
            .find(|(key, _)| key == "FORMAT")
            .map(|(_, value)| value.as_str())
    }
}

fn default_parallelism() -> usize {
    1
}

/// Terminal state of a job that did not error.
///
/// Cancellation is a normal outcome, not an error: the job stopped
/// because it was asked to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    /// All tiles were produced.
    Completed,
    /// Cancellation took effect before the last tile.
    Canceled,
}

/// Errors that can terminate a job.
#[derive(Debug, Error)]
pub enum JobError {
    /// Grid planning rejected the job's geometry.
    #[error("grid planning failed: {0}")]
    Grid(#[from] GridError),

    /// The progress ledger rejected the job.
    #[error("progress ledger rejected the job: {0}")]
    Ledger(#[from] LedgerError),

    /// A tile unit failed; the job aborts at the first one.
    #[error("tile unit failed: {0}")]
    Tile(#[from] TileError),

    /// The output format or a source's `FORMAT` is not supported.
    #[error("unsupported image format: {0}")]
    UnsupportedFormat(String),

    /// A source carries no `FORMAT` parameter.
    #[error("source '{0}' does not name an image format")]
    MissingSourceFormat(String),

    /// A workspace directory could not be created.
    #[error("filesystem operation failed on {}: {}", .path.display(), .source)]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}
