//! WMSTiler - tiled downloads from Web Map Services
//!
//! This library plans and executes large geospatial image-tiling jobs:
//! a rectangular area, one or more GetMap sources and one or more target
//! resolutions are turned into a grid of fixed-size tiles. Each tile is
//! fetched with an overlapping gutter margin, cropped back to its net size,
//! georeferenced with a world file and persisted to a per-job workspace,
//! while the job reports live progress and supports cooperative
//! cancellation.
//!
//! # High-Level API
//!
//! For most use cases, the [`service`] module provides a simplified facade:
//!
//! ```ignore
//! use wmstiler::config::ClientConfig;
//! use wmstiler::service::TilingService;
//!
//! let service = TilingService::new(ClientConfig::default())?;
//!
//! // Runs to completion, failure or cancellation.
//! let outcome = service.start(job).await?;
//! ```

pub mod config;
pub mod crop;
pub mod fetch;
pub mod format;
pub mod grid;
pub mod job;
pub mod logging;
pub mod progress;
pub mod service;
pub mod tile;
pub mod worldfile;

/// Version of the WMSTiler library.
///
/// This is synchronized across all components in the workspace.
/// The version is defined in `Cargo.toml` and injected at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
