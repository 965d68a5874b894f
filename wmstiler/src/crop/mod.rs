//! Gutter removal for fetched tiles.
//!
//! A fetched tile is gutter-expanded on all sides; this module produces
//! the net tile. For raster formats that is a pixel crop at the gutter
//! offset. For SVG it is a coordinate-space adjustment of the embedded
//! view box - no pixels are touched. Converting a transparent raster
//! source to an opaque target format flattens onto a white background
//! first, otherwise transparency would come out black.

use std::path::Path;
use std::sync::OnceLock;

use image::{DynamicImage, Rgb, RgbImage};
use regex::Regex;
use thiserror::Error;
use tracing::debug;

/// Errors that can occur while cropping a tile.
#[derive(Debug, Error)]
pub enum CropError {
    /// Input file could not be read.
    #[error("failed to read {path}: {message}")]
    Read { path: String, message: String },

    /// Output file could not be written.
    #[error("failed to write {path}: {message}")]
    Write { path: String, message: String },

    /// Image decoding failed.
    #[error("image decode failed: {0}")]
    Decode(String),

    /// Image encoding failed.
    #[error("image encode failed: {0}")]
    Encode(String),

    /// The fetched image is smaller than the crop region.
    #[error("image is {width}x{height}, too small for a {tile_side_px}px tile with {gutter_px}px gutter")]
    TooSmall {
        width: u32,
        height: u32,
        tile_side_px: u32,
        gutter_px: u32,
    },

    /// The SVG carries no usable `viewBox` attribute.
    #[error("missing or malformed viewBox in {path}")]
    ViewBox { path: String },

    /// The format combination cannot be cropped.
    #[error("unsupported conversion from .{from} to .{to}")]
    Unsupported { from: String, to: String },
}

/// Trait for gutter removal.
///
/// Implementations are called on the blocking pool; they may do CPU-bound
/// image work and synchronous file I/O.
pub trait TileCropper: Send + Sync {
    /// Crops the gutter-expanded image at `input` down to the net
    /// `tile_side_px` x `tile_side_px` tile at `output`.
    fn crop(
        &self,
        input: &Path,
        output: &Path,
        tile_side_px: u32,
        gutter_px: u32,
    ) -> Result<(), CropError>;
}

/// Cropper backed by the `image` crate, with SVG view-box handling.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageCropper;

impl ImageCropper {
    /// Creates a new cropper.
    pub fn new() -> Self {
        Self
    }
}

impl TileCropper for ImageCropper {
    fn crop(
        &self,
        input: &Path,
        output: &Path,
        tile_side_px: u32,
        gutter_px: u32,
    ) -> Result<(), CropError> {
        let from = extension(input);
        let to = extension(output);
        debug!(input = %input.display(), output = %output.display(), "cropping tile");

        match (from.as_str(), to.as_str()) {
            ("svg", "svg") => crop_svg(input, output, gutter_px),
            ("svg", _) => Err(CropError::Unsupported { from, to }),
            _ => crop_raster(input, output, tile_side_px, gutter_px, &to),
        }
    }
}

fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("")
        .to_ascii_lowercase()
}

fn crop_raster(
    input: &Path,
    output: &Path,
    tile_side_px: u32,
    gutter_px: u32,
    output_ext: &str,
) -> Result<(), CropError> {
    let img = image::open(input).map_err(|e| CropError::Decode(e.to_string()))?;

    let needed = gutter_px + tile_side_px;
    if img.width() < needed || img.height() < needed {
        return Err(CropError::TooSmall {
            width: img.width(),
            height: img.height(),
            tile_side_px,
            gutter_px,
        });
    }

    // Opaque targets cannot carry the source's alpha channel.
    let img = if matches!(output_ext, "jpg" | "jpeg" | "tif" | "tiff") && img.color().has_alpha() {
        flatten_onto_white(&img)
    } else {
        img
    };

    img.crop_imm(gutter_px, gutter_px, tile_side_px, tile_side_px)
        .save(output)
        .map_err(|e| CropError::Encode(e.to_string()))
}

/// Composites the image over a white background, dropping alpha.
fn flatten_onto_white(img: &DynamicImage) -> DynamicImage {
    let rgba = img.to_rgba8();
    let mut rgb = RgbImage::new(rgba.width(), rgba.height());

    for (x, y, pixel) in rgba.enumerate_pixels() {
        let alpha = pixel[3] as u32;
        let blend = |c: u8| ((c as u32 * alpha + 255 * (255 - alpha)) / 255) as u8;
        rgb.put_pixel(x, y, Rgb([blend(pixel[0]), blend(pixel[1]), blend(pixel[2])]));
    }

    DynamicImage::ImageRgb8(rgb)
}

fn view_box_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r#"viewBox\s*=\s*"([^"]+)""#).expect("valid regex"))
}

/// Moves the SVG view box inward by `gutter_px` on each side.
///
/// Everything outside the `viewBox` attribute is carried over unchanged.
fn crop_svg(input: &Path, output: &Path, gutter_px: u32) -> Result<(), CropError> {
    let content = std::fs::read_to_string(input).map_err(|e| CropError::Read {
        path: input.display().to_string(),
        message: e.to_string(),
    })?;

    let captures = view_box_pattern()
        .captures(&content)
        .ok_or_else(|| CropError::ViewBox {
            path: input.display().to_string(),
        })?;
    let values: Vec<f64> = captures[1]
        .split_whitespace()
        .filter_map(|v| v.parse().ok())
        .collect();
    if values.len() != 4 {
        return Err(CropError::ViewBox {
            path: input.display().to_string(),
        });
    }

    let gutter = gutter_px as f64;
    let adjusted = format!(
        r#"viewBox="{} {} {} {}""#,
        values[0] + gutter,
        values[1] + gutter,
        values[2] - 2.0 * gutter,
        values[3] - 2.0 * gutter
    );

    let range = captures.get(0).expect("whole match").range();
    let mut result = content;
    result.replace_range(range, &adjusted);

    std::fs::write(output, result).map_err(|e| CropError::Write {
        path: output.display().to_string(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn write_test_png(path: &Path, size: u32) {
        // pixel value encodes its position so crops are verifiable
        let img = RgbaImage::from_fn(size, size, |x, y| {
            Rgba([(x % 256) as u8, (y % 256) as u8, 0, 255])
        });
        img.save(path).unwrap();
    }

    #[test]
    fn test_raster_crop_offsets_by_gutter() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("tile_gutter.png");
        let output = dir.path().join("tile.png");
        write_test_png(&input, 120);

        ImageCropper.crop(&input, &output, 100, 10).unwrap();

        let cropped = image::open(&output).unwrap().to_rgba8();
        assert_eq!(cropped.dimensions(), (100, 100));
        // output (0,0) was input (10,10)
        assert_eq!(cropped.get_pixel(0, 0), &Rgba([10, 10, 0, 255]));
        assert_eq!(cropped.get_pixel(99, 99), &Rgba([109, 109, 0, 255]));
    }

    #[test]
    fn test_raster_crop_rejects_undersized_image() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("tile_gutter.png");
        let output = dir.path().join("tile.png");
        write_test_png(&input, 64);

        let result = ImageCropper.crop(&input, &output, 100, 10);
        assert!(matches!(result, Err(CropError::TooSmall { .. })));
    }

    #[test]
    fn test_transparent_png_to_jpg_flattens_white() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("tile_gutter.png");
        let output = dir.path().join("tile.jpg");

        let img = RgbaImage::from_pixel(120, 120, Rgba([0, 0, 0, 0]));
        img.save(&input).unwrap();

        ImageCropper.crop(&input, &output, 100, 10).unwrap();

        let flattened = image::open(&output).unwrap().to_rgb8();
        let pixel = flattened.get_pixel(50, 50);
        // JPEG is lossy; near-white is close enough
        assert!(pixel[0] > 250 && pixel[1] > 250 && pixel[2] > 250);
    }

    #[test]
    fn test_svg_view_box_moves_inward() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("tile_gutter.svg");
        let output = dir.path().join("tile.svg");
        std::fs::write(
            &input,
            r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 120 120"><rect/></svg>"#,
        )
        .unwrap();

        ImageCropper.crop(&input, &output, 100, 10).unwrap();

        let result = std::fs::read_to_string(&output).unwrap();
        assert!(result.contains(r#"viewBox="10 10 100 100""#));
        // the rest of the document is untouched
        assert!(result.contains("<rect/>"));
    }

    #[test]
    fn test_svg_without_view_box_fails() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("tile_gutter.svg");
        let output = dir.path().join("tile.svg");
        std::fs::write(&input, "<svg></svg>").unwrap();

        let result = ImageCropper.crop(&input, &output, 100, 10);
        assert!(matches!(result, Err(CropError::ViewBox { .. })));
    }

    #[test]
    fn test_svg_to_raster_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("tile_gutter.svg");
        let output = dir.path().join("tile.png");

        let result = ImageCropper.crop(&input, &output, 100, 10);
        assert!(matches!(result, Err(CropError::Unsupported { .. })));
    }
}
