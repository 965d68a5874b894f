//! Supported image formats.
//!
//! A tile format ties a MIME type (as it appears in a GetMap `FORMAT`
//! parameter or a job's output format) to the file extension of the tile
//! and the extension of its georeferencing world file.

/// A supported image format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileFormat {
    /// Human-readable name.
    pub title: &'static str,
    /// File extension of the tile image.
    pub file_ext: &'static str,
    /// File extension of the accompanying world file.
    pub world_file_ext: &'static str,
    /// MIME types identifying this format.
    pub mime_types: &'static [&'static str],
}

impl TileFormat {
    /// True for vector formats, which are cropped by adjusting their
    /// coordinate space instead of their pixels.
    #[inline]
    pub fn is_vector(&self) -> bool {
        self.file_ext == "svg"
    }
}

/// All formats the tile pipeline can produce.
pub const SUPPORTED_FORMATS: &[TileFormat] = &[
    TileFormat {
        title: "PNG",
        file_ext: "png",
        world_file_ext: "pgw",
        mime_types: &["image/png"],
    },
    TileFormat {
        title: "PNG 8-Bit",
        file_ext: "png",
        world_file_ext: "pgw",
        mime_types: &["image/png; mode=8bit"],
    },
    TileFormat {
        title: "JPG",
        file_ext: "jpg",
        world_file_ext: "jgw",
        mime_types: &["image/jpeg"],
    },
    TileFormat {
        title: "GIF",
        file_ext: "gif",
        world_file_ext: "gfw",
        mime_types: &["image/gif"],
    },
    TileFormat {
        title: "TIFF",
        file_ext: "tif",
        world_file_ext: "tfw",
        mime_types: &["image/tiff"],
    },
    // SVG support: experimental
    TileFormat {
        title: "SVG",
        file_ext: "svg",
        world_file_ext: "sgw",
        mime_types: &["image/svg+xml"],
    },
];

/// Looks up a supported format by MIME type.
pub fn from_mime(mime_type: &str) -> Option<&'static TileFormat> {
    SUPPORTED_FORMATS
        .iter()
        .find(|format| format.mime_types.contains(&mime_type))
}
