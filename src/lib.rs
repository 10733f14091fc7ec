//! WaterMarker Library
//!
//! Adds a repeating, rotated, semi-transparent text watermark to every page
//! of a PDF. This library provides functionality to:
//! - Compute the watermark grid for any page size
//! - Render the grid into a single-page overlay
//! - Composite the overlay onto every page, reusing it across equally sized pages
//!
//! # Example
//!
//! ```no_run
//! use watermarker::config::WatermarkSpec;
//! use watermarker::pdf::{apply_watermark, FontRegistry, TextOverlayBuilder};
//! use std::path::Path;
//!
//! let mut fonts = FontRegistry::with_standard_fonts();
//! fonts.register_file("SimSun", Path::new("fonts/SimSun.ttf")).expect("Failed to load font");
//!
//! let spec = WatermarkSpec::new("机密");
//! apply_watermark(
//!     Path::new("report.pdf"),
//!     Path::new("report（添加水印）.pdf"),
//!     &spec,
//!     &mut TextOverlayBuilder::new(&fonts),
//! ).expect("Failed to add watermark");
//! ```

pub mod config;
pub mod error;
pub mod layout;
pub mod pdf;

// Re-export commonly used items
pub use config::{RunConfig, WatermarkSpec};
pub use error::{Error, Result};
