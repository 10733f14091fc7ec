//! PDF manipulation module

pub mod compose;
pub mod font;
pub mod metadata;
pub mod overlay;

// Re-export commonly used items
pub use compose::{apply_watermark, watermark_document, WatermarkReport};
pub use font::{FontRegistry, StandardFont};
pub use metadata::{count_pages, page_dimensions};
pub use overlay::{Overlay, OverlayBuilder, TextOverlayBuilder};
