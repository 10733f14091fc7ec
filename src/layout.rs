//! Page and overlay geometry
//!
//! The watermark grid is designed against an A4 page (21 cm × 29.7 cm) and
//! stretched along each axis to fit the actual page.

use tiny_skia_path::Transform;

/// Points-to-centimeters factor used for overlay sizing.
///
/// Deliberately 0.0352 rather than 2.54 / 72 so overlay sizes stay identical
/// to those produced by earlier releases.
pub const PT_TO_CM: f64 = 0.0352;

/// Reference page width in centimeters (A4)
pub const REFERENCE_WIDTH_CM: f64 = 21.0;

/// Reference page height in centimeters (A4)
pub const REFERENCE_HEIGHT_CM: f64 = 29.7;

/// Number of tile columns
pub const GRID_COLUMNS: usize = 5;

/// Number of tile rows
pub const GRID_ROWS: usize = 10;

/// Simple length type in millimeters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Length(pub f64);

impl Length {
    /// Create a length from centimeters
    pub fn from_cm(cm: f64) -> Self {
        Length(cm * 10.0)
    }

    /// Create a length from points (1/72 inch)
    pub fn from_pt(pt: f64) -> Self {
        Length(pt * 25.4 / 72.0)
    }

    /// Get the value in millimeters
    pub fn mm(&self) -> f64 {
        self.0
    }

    /// Get the value in centimeters
    pub fn cm(&self) -> f64 {
        self.0 / 10.0
    }

    /// Get the value in points (1/72 inch)
    pub fn pt(&self) -> f64 {
        self.0 * 72.0 / 25.4
    }
}

/// Page dimensions as read from a media box, kept in points
///
/// Two pages share an overlay only when their dimensions compare equal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageDimensions {
    pub width: f64,
    pub height: f64,
}

impl PageDimensions {
    /// Create dimensions from a width and height in points
    pub fn from_points(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// US Letter size (612pt × 792pt)
    pub fn letter() -> Self {
        Self::from_points(612.0, 792.0)
    }

    /// A4 size (595pt × 842pt, as most producers round it)
    pub fn a4() -> Self {
        Self::from_points(595.0, 842.0)
    }
}

/// A single text placement in the rotated overlay coordinate system
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tile {
    pub column: usize,
    pub row: usize,
    pub x: Length,
    pub y: Length,
}

/// Geometry of one watermark overlay
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayLayout {
    /// Width of the drawing surface
    pub width: Length,
    /// Height of the drawing surface
    pub height: Length,
    /// Horizontal scale relative to A4
    pub ratio_w: f64,
    /// Vertical scale relative to A4
    pub ratio_h: f64,
    /// Origin translation applied before rotating
    pub origin: (Length, Length),
    /// Font size in points after scaling
    pub font_size: f64,
    /// Rotation in degrees, counter-clockwise
    pub angle: f64,
}

impl OverlayLayout {
    /// Compute the overlay geometry for a page
    pub fn new(page: PageDimensions, font_size: f64, angle: f64) -> Self {
        let width_cm = page.width * PT_TO_CM;
        let height_cm = page.height * PT_TO_CM;
        let ratio_w = width_cm / REFERENCE_WIDTH_CM;
        let ratio_h = height_cm / REFERENCE_HEIGHT_CM;

        Self {
            width: Length::from_cm(width_cm),
            height: Length::from_cm(height_cm),
            ratio_w,
            ratio_h,
            origin: (
                Length::from_cm(10.0 * ratio_w),
                Length::from_cm(5.0 * ratio_h),
            ),
            font_size: font_size * (ratio_w + ratio_h) / 2.0,
            angle,
        }
    }

    /// All text placements, column by column
    pub fn tiles(&self) -> Vec<Tile> {
        let mut tiles = Vec::with_capacity(GRID_COLUMNS * GRID_ROWS);
        for column in 0..GRID_COLUMNS {
            for row in 0..GRID_ROWS {
                let x = 10.0 * (column as f64 - 1.0) * self.ratio_w;
                let y = 5.0 * (row as f64 - 2.0) * self.ratio_h;
                tiles.push(Tile {
                    column,
                    row,
                    x: Length::from_cm(x),
                    y: Length::from_cm(y),
                });
            }
        }
        tiles
    }

    /// Translate-then-rotate transform in points, as written to the content stream
    pub fn transform(&self) -> Transform {
        Transform::from_translate(self.origin.0.pt() as f32, self.origin.1.pt() as f32)
            .pre_rotate(self.angle as f32)
    }
}
