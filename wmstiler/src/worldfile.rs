//! World file generation.
//!
//! A world file is the six-line sidecar GIS tools use to georeference an
//! otherwise-unreferenced raster: pixel sizes, rotation terms (always zero
//! here) and the ground coordinate of the center of the top-left pixel.
//! The numeric layout is a compatibility surface and must not change.

/// Builds world file content for a tile.
///
/// # Arguments
///
/// * `x0` - Ground X of the tile's top-left corner (gutter excluded)
/// * `y0` - Ground Y of the tile's top-left corner (gutter excluded)
/// * `ground_resolution` - Ground units per pixel
///
/// # Returns
///
/// Six newline-separated numbers: pixel width, two zero rotation terms,
/// negative pixel height, and the ground X/Y of the center of the
/// top-left pixel. No trailing newline.
pub fn world_file_content(x0: f64, y0: f64, ground_resolution: f64) -> String {
    let half_px = ground_resolution / 2.0;
    format!(
        "{}\n0.0\n0.0\n-{}\n{}\n{}",
        ground_resolution,
        ground_resolution,
        x0 + half_px,
        y0 - half_px
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pixel_center_anchor() {
        let content = world_file_content(100.0, 200.0, 1.0);
        let lines: Vec<&str> = content.lines().collect();

        assert_eq!(lines.len(), 6);
        assert_eq!(lines[4], "100.5");
        assert_eq!(lines[5], "199.5");
    }

    #[test]
    fn test_pixel_size_lines() {
        let content = world_file_content(0.0, 0.0, 10.0);
        let lines: Vec<&str> = content.lines().collect();

        assert_eq!(lines[0], "10");
        assert_eq!(lines[1], "0.0");
        assert_eq!(lines[2], "0.0");
        assert_eq!(lines[3], "-10");
    }

    #[test]
    fn test_no_trailing_newline() {
        let content = world_file_content(0.0, 0.0, 1.0);
        assert!(!content.ends_with('\n'));
    }

    #[test]
    fn test_fractional_resolution() {
        let content = world_file_content(500_000.0, 5_000_000.0, 0.5);
        let lines: Vec<&str> = content.lines().collect();

        assert_eq!(lines[0], "0.5");
        assert_eq!(lines[3], "-0.5");
        assert_eq!(lines[4], "500000.25");
        assert_eq!(lines[5], "4999999.75");
    }
}
