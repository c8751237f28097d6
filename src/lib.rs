//! # Media Archiver
//!
//! Incrementally archives a media tree into `YEAR/MONTH` folders by true
//! capture date, keeping one original per unique content and never touching
//! the source.
//!
//! ## Core Guarantees
//! - **Never mutate the source** - files are copied, never moved or rewritten
//! - **Never overwrite** - an occupied destination name gets a numbered suffix
//! - **Re-runs are free** - the inventory remembers every fingerprint, and
//!   placement recognises files an interrupted run already copied
//!
//! ## Architecture
//! - `core` - The archiving engine
//! - `events` - Event-driven progress reporting
//! - `error` - User-friendly error types

pub mod core;
pub mod error;
pub mod events;

// Re-export commonly used types at the crate root
pub use error::{ArchiveError, Result};

/// Initialize tracing for the library
///
/// Called once by the application entry point. `RUST_LOG` wins when set;
/// otherwise only warnings are shown, or debug output with `verbose`.
pub fn init_tracing(verbose: bool) {
    let default = if verbose {
        "media_archiver=debug"
    } else {
        "media_archiver=warn"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));

    // A second initialisation (e.g. from tests) keeps the first subscriber
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
