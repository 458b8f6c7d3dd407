//! Watermark inpainting strategies.
//!
//! The built-in inpainters compute a smoothed candidate value from the
//! original frame and hard-select it at masked pixels only: background
//! pixels are copied through byte-identical, so an inpainted frame can
//! differ from its input at masked positions alone.

use rayon::prelude::*;
use tracing::info;

use crate::error::{MediaError, MediaResult};
use crate::frame::{Frame, Mask, RGB_CHANNELS};

/// Fills masked pixels of a frame with visually plausible content.
pub trait WatermarkInpainter: Send + Sync {
    /// Replace masked pixels of `frame`, returning a frame of the same
    /// dimensions. Callers only invoke this for non-empty masks.
    fn inpaint(&self, frame: &Frame, mask: &Mask) -> MediaResult<Frame>;

    /// Human-readable name for logging.
    fn name(&self) -> &'static str;
}

fn check_mask_dims(frame: &Frame, mask: &Mask) -> MediaResult<()> {
    if mask.width() != frame.width() || mask.height() != frame.height() {
        return Err(MediaError::inpaint_failed(format!(
            "mask is {}x{}, frame is {}x{}",
            mask.width(),
            mask.height(),
            frame.width(),
            frame.height()
        )));
    }
    Ok(())
}

/// How a window of neighborhood samples collapses to a fill value.
#[derive(Debug, Clone, Copy)]
enum FillStat {
    Median,
    Mean,
}

/// Rewrite masked pixels with a windowed statistic of the original
/// frame. Rows are processed in parallel; untouched rows are plain
/// copies of the input.
fn fill_masked(frame: &Frame, mask: &Mask, radius: u32, stat: FillStat) -> Frame {
    let width = frame.width();
    let height = frame.height();
    let row_stride = width as usize * RGB_CHANNELS;

    let mut out = frame.clone();
    out.as_bytes_mut()
        .par_chunks_mut(row_stride)
        .enumerate()
        .for_each(|(y, row)| {
            let y = y as u32;
            for x in 0..width {
                if !mask.is_marked(x, y) {
                    continue;
                }

                let x0 = x.saturating_sub(radius);
                let y0 = y.saturating_sub(radius);
                let x1 = (x + radius + 1).min(width);
                let y1 = (y + radius + 1).min(height);

                let mut fill = [0u8; RGB_CHANNELS];
                for (channel, slot) in fill.iter_mut().enumerate() {
                    let mut samples = Vec::with_capacity(((x1 - x0) * (y1 - y0)) as usize);
                    for wy in y0..y1 {
                        for wx in x0..x1 {
                            samples.push(frame.as_bytes()[frame.pixel_offset(wx, wy) + channel]);
                        }
                    }
                    *slot = match stat {
                        FillStat::Median => {
                            samples.sort_unstable();
                            samples[samples.len() / 2]
                        }
                        FillStat::Mean => {
                            let sum: u32 = samples.iter().map(|&v| v as u32).sum();
                            (sum / samples.len() as u32) as u8
                        }
                    };
                }

                let i = x as usize * RGB_CHANNELS;
                row[i..i + RGB_CHANNELS].copy_from_slice(&fill);
            }
        });

    out
}

/// Median-filter inpainter: each masked pixel takes the per-channel
/// median of its neighborhood in the original frame.
#[derive(Debug, Clone)]
pub struct MedianFilterInpainter {
    /// Neighborhood radius; the window is (2r+1) x (2r+1)
    pub radius: u32,
}

impl Default for MedianFilterInpainter {
    fn default() -> Self {
        Self { radius: 2 }
    }
}

impl WatermarkInpainter for MedianFilterInpainter {
    fn inpaint(&self, frame: &Frame, mask: &Mask) -> MediaResult<Frame> {
        check_mask_dims(frame, mask)?;
        Ok(fill_masked(frame, mask, self.radius, FillStat::Median))
    }

    fn name(&self) -> &'static str {
        "median_filter"
    }
}

/// Box-blur inpainter: each masked pixel takes the per-channel mean of
/// its neighborhood in the original frame. Cheaper than the median,
/// softer on textured fills.
#[derive(Debug, Clone)]
pub struct BoxBlurInpainter {
    /// Neighborhood radius; the window is (2r+1) x (2r+1)
    pub radius: u32,
}

impl Default for BoxBlurInpainter {
    fn default() -> Self {
        Self { radius: 3 }
    }
}

impl WatermarkInpainter for BoxBlurInpainter {
    fn inpaint(&self, frame: &Frame, mask: &Mask) -> MediaResult<Frame> {
        check_mask_dims(frame, mask)?;
        Ok(fill_masked(frame, mask, self.radius, FillStat::Mean))
    }

    fn name(&self) -> &'static str {
        "box_blur"
    }
}

/// Inpainting strategy selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InpainterKind {
    /// Windowed median fill
    #[default]
    Median,
    /// Windowed mean fill
    BoxBlur,
}

impl InpainterKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "median" => Some(Self::Median),
            "box_blur" => Some(Self::BoxBlur),
            _ => None,
        }
    }
}

/// Build the inpainter for the configured strategy.
pub fn build_inpainter(kind: InpainterKind) -> Box<dyn WatermarkInpainter> {
    match kind {
        InpainterKind::Median => {
            info!("Building median-filter inpainter");
            Box::new(MedianFilterInpainter::default())
        }
        InpainterKind::BoxBlur => {
            info!("Building box-blur inpainter");
            Box::new(BoxBlurInpainter::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Rect;

    /// Gray frame with a white blotch in the top-left corner.
    fn blotched_frame() -> Frame {
        let mut frame = Frame::filled(16, 16, [80, 80, 80]);
        for y in 0..4 {
            for x in 0..4 {
                let i = frame.pixel_offset(x, y);
                frame.as_bytes_mut()[i..i + 3].copy_from_slice(&[255, 255, 255]);
            }
        }
        frame
    }

    #[test]
    fn test_inpaint_changes_only_masked_pixels() {
        let frame = blotched_frame();
        let mut mask = Mask::empty(16, 16);
        mask.mark_rect(Rect::new(0, 0, 4, 4));

        for inpainter in [
            Box::new(MedianFilterInpainter::default()) as Box<dyn WatermarkInpainter>,
            Box::new(BoxBlurInpainter::default()),
        ] {
            let out = inpainter.inpaint(&frame, &mask).unwrap();
            assert_eq!(out.width(), frame.width());
            assert_eq!(out.height(), frame.height());

            for y in 0..16 {
                for x in 0..16 {
                    if !mask.is_marked(x, y) {
                        assert_eq!(
                            out.rgb_at(x, y),
                            frame.rgb_at(x, y),
                            "{} touched background pixel ({}, {})",
                            inpainter.name(),
                            x,
                            y
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn test_median_fill_uses_surrounding_content() {
        let frame = blotched_frame();
        let mut mask = Mask::empty(16, 16);
        mask.mark_rect(Rect::new(0, 0, 4, 4));

        let out = MedianFilterInpainter { radius: 3 }
            .inpaint(&frame, &mask)
            .unwrap();

        // The blotch edge borders enough gray background that the median
        // there flips to the background value.
        assert_eq!(out.rgb_at(3, 3), [80, 80, 80]);
    }

    #[test]
    fn test_mean_fill_blends_toward_background() {
        let frame = blotched_frame();
        let mut mask = Mask::empty(16, 16);
        mask.mark_rect(Rect::new(0, 0, 4, 4));

        let out = BoxBlurInpainter { radius: 3 }
            .inpaint(&frame, &mask)
            .unwrap();

        // The blotch edge averages in surrounding background and moves
        // away from pure white.
        let [r, _, _] = out.rgb_at(3, 3);
        assert!(r < 255);
    }

    #[test]
    fn test_inpaint_rejects_mismatched_mask() {
        let frame = Frame::filled(8, 8, [0, 0, 0]);
        let mask = Mask::empty(4, 4);

        let err = MedianFilterInpainter::default()
            .inpaint(&frame, &mask)
            .unwrap_err();
        assert!(matches!(err, MediaError::InpaintFailed(_)));
    }

    #[test]
    fn test_inpainter_kind_parse() {
        assert_eq!(InpainterKind::parse("median"), Some(InpainterKind::Median));
        assert_eq!(
            InpainterKind::parse("box_blur"),
            Some(InpainterKind::BoxBlur)
        );
        assert_eq!(InpainterKind::parse("bogus"), None);
    }
}
