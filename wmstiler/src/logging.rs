//! Logging setup for embedders.
//!
//! The library itself only emits `tracing` events; installing a
//! subscriber is the embedding application's choice. This helper sets up
//! a plain formatted subscriber filtered via `RUST_LOG` for applications
//! that don't bring their own.

use tracing_subscriber::EnvFilter;

/// Installs a formatted `tracing` subscriber.
///
/// The filter defaults to `info` when `RUST_LOG` is not set. Calling
/// this more than once is harmless; later calls are ignored.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
