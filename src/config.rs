//! Watermark options and run configuration

use std::path::{Path, PathBuf};
use crate::error::{Error, Result};

/// Watermark text used when none was supplied
pub const DEFAULT_TEXT: &str = "watermark";

/// Font identifier used when none was supplied
pub const DEFAULT_FONT: &str = "SimSun";

/// Suffix appended to the input file stem for the default output path
pub const OUTPUT_SUFFIX: &str = "（添加水印）.pdf";

/// What to draw and how
#[derive(Debug, Clone, PartialEq)]
pub struct WatermarkSpec {
    /// Text repeated across the page
    pub text: String,
    /// Registered font identifier
    pub font: String,
    /// Font size in points on an A4 page; scaled for other sizes
    pub size: f32,
    /// Fill opacity, 0.0 (invisible) to 1.0 (opaque)
    pub alpha: f32,
    /// Rotation of the grid in degrees, counter-clockwise
    pub angle: f32,
}

impl Default for WatermarkSpec {
    fn default() -> Self {
        Self {
            text: DEFAULT_TEXT.to_string(),
            font: DEFAULT_FONT.to_string(),
            size: 30.0,
            alpha: 0.1,
            angle: 30.0,
        }
    }
}

impl WatermarkSpec {
    /// Create a spec for the given text with default styling
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    /// Check that every field is usable
    pub fn validate(&self) -> Result<()> {
        if self.text.is_empty() {
            return Err(Error::InvalidOption("watermark text is empty".to_string()));
        }
        if !self.size.is_finite() || self.size <= 0.0 {
            return Err(Error::InvalidOption(format!(
                "font size must be positive, got {}",
                self.size
            )));
        }
        if !(0.0..=1.0).contains(&self.alpha) {
            return Err(Error::InvalidOption(format!(
                "alpha must be between 0.0 and 1.0, got {}",
                self.alpha
            )));
        }
        if !self.angle.is_finite() {
            return Err(Error::InvalidOption(format!("angle is not finite: {}", self.angle)));
        }
        Ok(())
    }

    /// Opacity limited to [0, 1]
    pub fn clamped_alpha(&self) -> f32 {
        if self.alpha.is_nan() {
            0.0
        } else {
            self.alpha.clamp(0.0, 1.0)
        }
    }
}

/// Fully resolved options for one conversion
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Source PDF
    pub input: PathBuf,
    /// Destination PDF
    pub output: PathBuf,
    /// Watermark to apply
    pub spec: WatermarkSpec,
}

impl RunConfig {
    /// Resolve a configuration, deriving the output path when none was given
    pub fn resolve(input: PathBuf, output: Option<PathBuf>, spec: WatermarkSpec) -> Result<Self> {
        validate_input_path(&input)?;
        spec.validate()?;

        let output = match output {
            Some(path) => path,
            None => default_output_path(&input),
        };

        Ok(Self { input, output, spec })
    }
}

/// Accept only paths whose extension is exactly `pdf`
pub fn validate_input_path(path: &Path) -> Result<()> {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("pdf") => Ok(()),
        _ => Err(Error::InvalidInputFormat(path.to_path_buf())),
    }
}

/// `dir/report.pdf` → `dir/report（添加水印）.pdf`
pub fn default_output_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    input.with_file_name(format!("{}{}", stem, OUTPUT_SUFFIX))
}
