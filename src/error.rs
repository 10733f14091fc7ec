//! Error types for the watermarker library

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the watermarker library
#[derive(Error, Debug)]
pub enum Error {
    /// Input path does not end in `.pdf`
    #[error("Input file is not a PDF: {}", .0.display())]
    InvalidInputFormat(PathBuf),

    /// PDF processing error
    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// File not found
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// Invalid PDF (no pages)
    #[error("PDF has no pages: {}", .0.display())]
    EmptyPdf(PathBuf),

    /// A page whose physical size cannot be determined
    #[error("Cannot determine size of page {page}: {reason}")]
    PageDimensions { page: u32, reason: String },

    /// Font identifier was never registered
    #[error("Font not registered: {0}")]
    FontNotRegistered(String),

    /// Font file could not be loaded or parsed
    #[error("Cannot register font {name}: {reason}")]
    FontRegistration { name: String, reason: String },

    /// Text could not be rendered with the chosen font
    #[error("Font error: {0}")]
    Font(String),

    /// Watermark option out of range
    #[error("Invalid option: {0}")]
    InvalidOption(String),

    /// General error
    #[error("{0}")]
    General(String),
}
