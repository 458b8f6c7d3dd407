//! Watermark detection strategies.
//!
//! Watermarks overwhelmingly sit in one of the four frame corners, so the
//! built-in detectors partition each frame into quarter-width by
//! quarter-height corner regions and score each region independently. A
//! region whose qualifying-pixel fraction crosses the coverage ratio is
//! marked whole in the output mask.
//!
//! Detection is a pluggable stage: anything implementing
//! [`WatermarkDetector`] can replace the built-ins without touching the
//! orchestrator.

use tracing::info;

use crate::error::MediaResult;
use crate::frame::{Frame, Mask, Rect};

/// Fraction of region pixels that must qualify before the region is
/// considered watermarked.
pub const DEFAULT_COVERAGE_RATIO: f64 = 0.10;

/// Produces a binary watermark mask for a single frame.
pub trait WatermarkDetector: Send + Sync {
    /// Detect suspected watermark pixels in `frame`.
    ///
    /// The returned mask has the same dimensions as the frame. A frame
    /// with no qualifying region yields an all-background mask.
    fn detect(&self, frame: &Frame) -> MediaResult<Mask>;

    /// Human-readable name for logging.
    fn name(&self) -> &'static str;
}

/// The four corner regions of a frame, each a quarter of the width and
/// height. Regions are empty (and therefore never marked) for frames
/// smaller than 4x4.
fn corner_regions(width: u32, height: u32) -> [Rect; 4] {
    let qw = width / 4;
    let qh = height / 4;
    [
        Rect::new(0, 0, qw, qh),
        Rect::new(width - qw, 0, qw, qh),
        Rect::new(0, height - qh, qw, qh),
        Rect::new(width - qw, height - qh, qw, qh),
    ]
}

/// Luminance-contrast corner detector.
///
/// Within each corner region, pixels brighter than `mean + k * stddev`
/// of the region's luminance qualify; semi-opaque overlay text pushes a
/// cluster of pixels well past that threshold while flat content does
/// not.
#[derive(Debug, Clone)]
pub struct CornerContrastDetector {
    /// Stddev multiplier for the luminance threshold
    pub k: f64,
    /// Qualifying-pixel fraction that marks a region
    pub coverage_ratio: f64,
}

impl Default for CornerContrastDetector {
    fn default() -> Self {
        Self {
            k: 1.5,
            coverage_ratio: DEFAULT_COVERAGE_RATIO,
        }
    }
}

impl CornerContrastDetector {
    fn region_qualifies(&self, frame: &Frame, region: &Rect) -> bool {
        let area = region.area();
        if area == 0 {
            return false;
        }

        let mut sum = 0.0;
        let mut sum_sq = 0.0;
        for y in region.y..region.y + region.height {
            for x in region.x..region.x + region.width {
                let luma = frame.luma_at(x, y);
                sum += luma;
                sum_sq += luma * luma;
            }
        }

        let mean = sum / area as f64;
        let variance = (sum_sq / area as f64 - mean * mean).max(0.0);
        let threshold = mean + self.k * variance.sqrt();

        let qualifying = {
            let mut count = 0usize;
            for y in region.y..region.y + region.height {
                for x in region.x..region.x + region.width {
                    if frame.luma_at(x, y) > threshold {
                        count += 1;
                    }
                }
            }
            count
        };

        qualifying as f64 / area as f64 > self.coverage_ratio
    }
}

impl WatermarkDetector for CornerContrastDetector {
    fn detect(&self, frame: &Frame) -> MediaResult<Mask> {
        let mut mask = Mask::empty(frame.width(), frame.height());
        for region in corner_regions(frame.width(), frame.height()) {
            if self.region_qualifies(frame, &region) {
                mask.mark_rect(region);
            }
        }
        Ok(mask)
    }

    fn name(&self) -> &'static str {
        "corner_contrast"
    }
}

/// Edge-density corner detector.
///
/// Scores each corner region by the fraction of pixels whose forward
/// luminance gradient exceeds `edge_threshold`. Overlay glyph borders
/// produce dense edges that flat or smoothly varying content does not.
#[derive(Debug, Clone)]
pub struct EdgeDensityDetector {
    /// Gradient magnitude above which a pixel counts as an edge
    pub edge_threshold: f64,
    /// Edge-pixel fraction that marks a region
    pub coverage_ratio: f64,
}

impl Default for EdgeDensityDetector {
    fn default() -> Self {
        Self {
            edge_threshold: 64.0,
            coverage_ratio: DEFAULT_COVERAGE_RATIO,
        }
    }
}

impl EdgeDensityDetector {
    fn region_qualifies(&self, frame: &Frame, region: &Rect) -> bool {
        let area = region.area();
        if area == 0 {
            return false;
        }

        let last_x = frame.width() - 1;
        let last_y = frame.height() - 1;

        let mut edges = 0usize;
        for y in region.y..region.y + region.height {
            for x in region.x..region.x + region.width {
                let luma = frame.luma_at(x, y);
                let dx = if x < last_x {
                    frame.luma_at(x + 1, y) - luma
                } else {
                    0.0
                };
                let dy = if y < last_y {
                    frame.luma_at(x, y + 1) - luma
                } else {
                    0.0
                };
                if (dx * dx + dy * dy).sqrt() > self.edge_threshold {
                    edges += 1;
                }
            }
        }

        edges as f64 / area as f64 > self.coverage_ratio
    }
}

impl WatermarkDetector for EdgeDensityDetector {
    fn detect(&self, frame: &Frame) -> MediaResult<Mask> {
        let mut mask = Mask::empty(frame.width(), frame.height());
        for region in corner_regions(frame.width(), frame.height()) {
            if self.region_qualifies(frame, &region) {
                mask.mark_rect(region);
            }
        }
        Ok(mask)
    }

    fn name(&self) -> &'static str {
        "edge_density"
    }
}

/// No-op detector: every frame passes through untouched.
#[derive(Debug, Clone, Default)]
pub struct DisabledDetector;

impl WatermarkDetector for DisabledDetector {
    fn detect(&self, frame: &Frame) -> MediaResult<Mask> {
        Ok(Mask::empty(frame.width(), frame.height()))
    }

    fn name(&self) -> &'static str {
        "disabled"
    }
}

/// Detection strategy selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DetectorKind {
    /// Luminance mean + k*stddev contrast statistic per corner
    #[default]
    CornerContrast,
    /// Forward-gradient edge density per corner
    EdgeDensity,
    /// No detection; frames always pass through
    Disabled,
}

impl DetectorKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "corner_contrast" => Some(Self::CornerContrast),
            "edge_density" => Some(Self::EdgeDensity),
            "disabled" => Some(Self::Disabled),
            _ => None,
        }
    }
}

/// Build the detector for the configured strategy.
pub fn build_detector(kind: DetectorKind) -> Box<dyn WatermarkDetector> {
    match kind {
        DetectorKind::CornerContrast => {
            info!("Building corner-contrast watermark detector");
            Box::new(CornerContrastDetector::default())
        }
        DetectorKind::EdgeDensity => {
            info!("Building edge-density watermark detector");
            Box::new(EdgeDensityDetector::default())
        }
        DetectorKind::Disabled => {
            info!("Watermark detection disabled");
            Box::new(DisabledDetector)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 32x32 mid-gray frame with a bright speckle pattern (every fourth
    /// pixel) painted into the top-left corner region.
    fn frame_with_corner_overlay() -> Frame {
        let mut frame = Frame::filled(32, 32, [100, 100, 100]);
        for y in 0..8 {
            for x in 0..8 {
                if (x + y * 8) % 4 == 0 {
                    let i = frame.pixel_offset(x, y);
                    frame.as_bytes_mut()[i..i + 3].copy_from_slice(&[255, 255, 255]);
                }
            }
        }
        frame
    }

    #[test]
    fn test_uniform_frame_yields_empty_mask() {
        let frame = Frame::filled(32, 32, [100, 100, 100]);
        for detector in [
            Box::new(CornerContrastDetector::default()) as Box<dyn WatermarkDetector>,
            Box::new(EdgeDensityDetector::default()),
        ] {
            let mask = detector.detect(&frame).unwrap();
            assert!(!mask.any(), "{} marked a flat frame", detector.name());
        }
    }

    #[test]
    fn test_corner_contrast_marks_only_overlay_corner() {
        let frame = frame_with_corner_overlay();
        let mask = CornerContrastDetector::default().detect(&frame).unwrap();

        assert!(mask.any());
        // Whole top-left region marked
        assert!(mask.is_marked(0, 0));
        assert!(mask.is_marked(7, 7));
        // Other corners untouched
        assert!(!mask.is_marked(31, 0));
        assert!(!mask.is_marked(0, 31));
        assert!(!mask.is_marked(31, 31));
        // Center untouched
        assert!(!mask.is_marked(16, 16));
        assert_eq!(mask.marked_count(), 8 * 8);
    }

    #[test]
    fn test_edge_density_marks_overlay_corner() {
        let frame = frame_with_corner_overlay();
        let mask = EdgeDensityDetector::default().detect(&frame).unwrap();

        assert!(mask.is_marked(0, 0));
        assert!(!mask.is_marked(16, 16));
        assert!(!mask.is_marked(31, 31));
    }

    #[test]
    fn test_regions_are_independent() {
        // Overlay in two diagonal corners; both must be marked.
        let mut frame = Frame::filled(32, 32, [100, 100, 100]);
        for y in 0..8 {
            for x in 0..8 {
                if (x + y * 8) % 4 == 0 {
                    for (cx, cy) in [(x, y), (x + 24, y + 24)] {
                        let i = frame.pixel_offset(cx, cy);
                        frame.as_bytes_mut()[i..i + 3].copy_from_slice(&[255, 255, 255]);
                    }
                }
            }
        }

        let mask = CornerContrastDetector::default().detect(&frame).unwrap();
        assert!(mask.is_marked(0, 0));
        assert!(mask.is_marked(31, 31));
        assert!(!mask.is_marked(31, 0));
        assert!(!mask.is_marked(0, 31));
    }

    #[test]
    fn test_disabled_detector_never_marks() {
        let frame = frame_with_corner_overlay();
        let mask = DisabledDetector.detect(&frame).unwrap();
        assert!(!mask.any());
    }

    #[test]
    fn test_tiny_frame_is_safe() {
        let frame = Frame::filled(2, 2, [255, 255, 255]);
        let mask = CornerContrastDetector::default().detect(&frame).unwrap();
        assert!(!mask.any());
    }

    #[test]
    fn test_detector_kind_parse() {
        assert_eq!(
            DetectorKind::parse("corner_contrast"),
            Some(DetectorKind::CornerContrast)
        );
        assert_eq!(
            DetectorKind::parse("edge_density"),
            Some(DetectorKind::EdgeDensity)
        );
        assert_eq!(DetectorKind::parse("disabled"), Some(DetectorKind::Disabled));
        assert_eq!(DetectorKind::parse("bogus"), None);
    }

    #[test]
    fn test_build_detector_names() {
        assert_eq!(
            build_detector(DetectorKind::CornerContrast).name(),
            "corner_contrast"
        );
        assert_eq!(
            build_detector(DetectorKind::EdgeDensity).name(),
            "edge_density"
        );
        assert_eq!(build_detector(DetectorKind::Disabled).name(), "disabled");
    }
}
