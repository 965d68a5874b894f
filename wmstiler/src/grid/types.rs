//! Geometry type definitions

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Ground distance of one inch, used to derive a ground resolution
/// from a map scale and a dpi value.
pub const METERS_PER_INCH: f64 = 0.0254;

/// Rectangular area in ground units (e.g. meters).
///
/// Invariant: `xmax > xmin` and `ymax > ymin`. The grid planner rejects
/// degenerate boxes with [`GridError::EmptyBoundingBox`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Western edge
    pub xmin: f64,
    /// Southern edge
    pub ymin: f64,
    /// Eastern edge
    pub xmax: f64,
    /// Northern edge
    pub ymax: f64,
}

impl BoundingBox {
    /// Width of the box in ground units.
    #[inline]
    pub fn width(&self) -> f64 {
        self.xmax - self.xmin
    }

    /// Height of the box in ground units.
    #[inline]
    pub fn height(&self) -> f64 {
        self.ymax - self.ymin
    }
}

/// A target resolution, given either directly as a ground resolution or
/// as a map scale plus a dpi value.
///
/// Exactly one of the two forms must be resolvable. Resolving never
/// mutates the entity; jobs work on the [`ResolvedResolution`] copy, so
/// sharing a `Resolution` across jobs is safe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    /// Identifier, used as the workspace subdirectory name.
    pub id: String,
    /// Ground distance represented by one pixel, in ground units per pixel.
    #[serde(default)]
    pub ground_resolution: Option<f64>,
    /// Map scale denominator (e.g. `5000` for 1:5000).
    #[serde(default)]
    pub scale: Option<f64>,
    /// Dots per inch the scale refers to.
    #[serde(default)]
    pub dpi: Option<f64>,
}

impl Resolution {
    /// Resolves the effective ground resolution.
    ///
    /// An explicitly set `ground_resolution` always wins and is never
    /// recomputed from `scale`/`dpi`; otherwise it is derived as
    /// `0.0254 * scale / dpi`. Resolving twice yields the same value.
    pub fn resolve(&self) -> Result<ResolvedResolution, GridError> {
        if let Some(ground_resolution) = self.ground_resolution {
            return Ok(ResolvedResolution {
                id: self.id.clone(),
                ground_resolution,
            });
        }

        match (self.scale, self.dpi) {
            (Some(scale), Some(dpi)) if dpi > 0.0 => Ok(ResolvedResolution {
                id: self.id.clone(),
                ground_resolution: METERS_PER_INCH * scale / dpi,
            }),
            _ => Err(GridError::UnresolvableResolution {
                id: self.id.clone(),
            }),
        }
    }
}

/// A [`Resolution`] with its ground resolution derived, scoped to one job.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedResolution {
    /// Identifier of the resolution this was derived from.
    pub id: String,
    /// Ground units per pixel.
    pub ground_resolution: f64,
}

/// Position of a tile within a grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileCoord {
    /// Column index (east-west), 0 at the western edge
    pub col: u32,
    /// Row index (north-south), 0 at the northern edge
    pub row: u32,
}

/// Errors that can occur while planning a tile grid.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GridError {
    /// Neither `ground_resolution` nor `scale` + `dpi` were usable.
    #[error("resolution '{id}' has neither a ground resolution nor scale and dpi")]
    UnresolvableResolution { id: String },

    /// The gutter eats the whole tile: `tile_size_px - 2*gutter_px <= 0`.
    #[error("tile size {tile_size_px}px leaves no net tile after two {gutter_px}px gutters")]
    NonPositiveTileSide { tile_size_px: u32, gutter_px: u32 },

    /// Bounding box with non-positive width or height.
    #[error("bounding box has non-positive extent ({width} x {height})")]
    EmptyBoundingBox { width: f64, height: f64 },
}
