//! Tile grid planning.
//!
//! Pure geometry: converts a bounding box and a resolution into a grid of
//! fixed-size tiles. Because tile counts are rounded up, the grid is
//! usually larger than the requested area; the excess is split evenly on
//! both sides so the requested box sits centered within the grid. The
//! planner also knows each tile's ground extent and the gutter-expanded
//! request box around it.

mod types;

pub use types::{
    BoundingBox, GridError, ResolvedResolution, Resolution, TileCoord, METERS_PER_INCH,
};

/// A planned tile grid for one (resolution, source) pair.
///
/// All fields are derived from the job's area, tile size and gutter and
/// are read-only for the lifetime of the job.
#[derive(Debug, Clone, PartialEq)]
pub struct TileGrid {
    /// Net tile side in pixels, gutter excluded.
    pub tile_side_px: u32,
    /// Gutter width in pixels on each side of a fetched tile.
    pub gutter_px: u32,
    /// Net tile side in ground units.
    pub tile_side_ground: f64,
    /// Number of tile columns.
    pub col_count: u32,
    /// Number of tile rows.
    pub row_count: u32,
    /// Width of the whole grid in pixels.
    pub total_width_px: u64,
    /// Height of the whole grid in pixels.
    pub total_height_px: u64,
    /// Gutter width in ground units.
    pub gutter_ground: f64,
    /// Ground X of the grid's top-left corner.
    pub origin_x: f64,
    /// Ground Y of the grid's top-left corner.
    pub origin_y: f64,
}

impl TileGrid {
    /// Plans the grid covering `area` at the given resolution.
    ///
    /// # Errors
    ///
    /// * [`GridError::NonPositiveTileSide`] if the two gutters leave no
    ///   net tile.
    /// * [`GridError::EmptyBoundingBox`] if the area has no extent.
    pub fn plan(
        area: &BoundingBox,
        resolution: &ResolvedResolution,
        tile_size_px: u32,
        gutter_px: u32,
    ) -> Result<Self, GridError> {
        let width = area.width();
        let height = area.height();
        if width <= 0.0 || height <= 0.0 {
            return Err(GridError::EmptyBoundingBox { width, height });
        }

        let tile_side_px = tile_size_px as i64 - 2 * gutter_px as i64;
        if tile_side_px <= 0 {
            return Err(GridError::NonPositiveTileSide {
                tile_size_px,
                gutter_px,
            });
        }
        let tile_side_px = tile_side_px as u32;

        let ground_resolution = resolution.ground_resolution;
        let tile_side_ground = tile_side_px as f64 * ground_resolution;
        let col_count = (width / tile_side_ground).ceil() as u32;
        let row_count = (height / tile_side_ground).ceil() as u32;
        let total_width_px = col_count as u64 * tile_side_px as u64;
        let total_height_px = row_count as u64 * tile_side_px as u64;

        // The requested box is centered: half the ceiling excess lies west
        // of xmin, half north of ymax. Row indices grow southward.
        let origin_x = area.xmin - (total_width_px as f64 * ground_resolution - width) / 2.0;
        let origin_y = area.ymax + (total_height_px as f64 * ground_resolution - height) / 2.0;

        Ok(Self {
            tile_side_px,
            gutter_px,
            tile_side_ground,
            col_count,
            row_count,
            total_width_px,
            total_height_px,
            gutter_ground: gutter_px as f64 * ground_resolution,
            origin_x,
            origin_y,
        })
    }

    /// Number of tiles in this grid.
    #[inline]
    pub fn tile_count(&self) -> u64 {
        self.col_count as u64 * self.row_count as u64
    }

    /// Ground coordinate of a tile's top-left corner, gutter excluded.
    #[inline]
    pub fn tile_top_left(&self, coord: TileCoord) -> (f64, f64) {
        (
            self.origin_x + coord.col as f64 * self.tile_side_ground,
            self.origin_y - coord.row as f64 * self.tile_side_ground,
        )
    }

    /// Gutter-expanded request box around a tile's full extent.
    pub fn gutter_extent(&self, coord: TileCoord) -> BoundingBox {
        let (x0, y0) = self.tile_top_left(coord);
        BoundingBox {
            xmin: x0 - self.gutter_ground,
            ymin: y0 - self.tile_side_ground - self.gutter_ground,
            xmax: x0 + self.tile_side_ground + self.gutter_ground,
            ymax: y0 + self.gutter_ground,
        }
    }

    /// Returns an iterator over all tile coordinates of this grid.
    ///
    /// Coordinates are yielded in row-major order with the column index
    /// innermost: `(0,0), (1,0), ..., (0,1), ...`.
    #[inline]
    pub fn coords(&self) -> GridCoordsIterator {
        GridCoordsIterator {
            col_count: self.col_count,
            total: self.tile_count(),
            current: 0,
        }
    }
}

/// Iterator over all tile coordinates of a grid, row-major.
#[derive(Debug, Clone)]
pub struct GridCoordsIterator {
    col_count: u32,
    total: u64,
    current: u64,
}

impl Iterator for GridCoordsIterator {
    type Item = TileCoord;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current >= self.total {
            return None;
        }

        let col = (self.current % self.col_count as u64) as u32;
        let row = (self.current / self.col_count as u64) as u32;
        self.current += 1;

        Some(TileCoord { col, row })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.total - self.current) as usize;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for GridCoordsIterator {
    fn len(&self) -> usize {
        (self.total - self.current) as usize
    }
}

/// Sums the tile counts over all (resolution, source) pairs of a job.
///
/// Used to pre-size the progress ledger entry before any I/O begins, so
/// progress percentages are accurate from the first query.
pub fn total_tile_count(
    area: &BoundingBox,
    resolutions: &[ResolvedResolution],
    tile_size_px: u32,
    gutter_px: u32,
    source_count: usize,
) -> Result<u64, GridError> {
    let mut total = 0u64;
    for resolution in resolutions {
        let grid = TileGrid::plan(area, resolution, tile_size_px, gutter_px)?;
        total += grid.tile_count() * source_count as u64;
    }
    Ok(total)
}
