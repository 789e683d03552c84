//! Pixel comparison of a capture against its reference
//!
//! [`ResembleComparator`] walks both images pixel by pixel with a per-channel
//! tolerance, reports the share of mismatching pixels and can render a diff
//! image that marks those pixels in magenta over a faded copy of the capture.

use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use std::fmt;
use std::io::Cursor;
use tracing::{debug, trace};

use crate::compare::IgnoreStrategy;
use crate::error::{Error, Result};

const ERROR_COLOR: Rgba<u8> = Rgba([255, 0, 255, 255]);
const FADE: f32 = 0.3;

/// Image-diff primitive used by the reference comparison
pub trait ImageComparator {
    fn compare(&self, reference: &[u8], captured: &[u8], ignore: IgnoreStrategy) -> Result<DiffReport>;
}

/// What the diff primitive found
pub struct DiffReport {
    /// Share of differing pixels, 0 to 100, as reported by the primitive
    pub mis_match_percentage: String,
    pub is_same_dimensions: bool,
    diff_image: Box<dyn FnOnce() -> RgbaImage + Send>,
}

impl fmt::Debug for DiffReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiffReport")
            .field("mis_match_percentage", &self.mis_match_percentage)
            .field("is_same_dimensions", &self.is_same_dimensions)
            .finish_non_exhaustive()
    }
}

impl DiffReport {
    /// `diff_image` runs only if the diff is actually needed
    pub fn new(
        mis_match_percentage: impl ToString,
        is_same_dimensions: bool,
        diff_image: impl FnOnce() -> RgbaImage + Send + 'static,
    ) -> Self {
        Self {
            mis_match_percentage: mis_match_percentage.to_string(),
            is_same_dimensions,
            diff_image: Box::new(diff_image),
        }
    }

    /// Mismatch as a number; unparsable text reads as NaN, which never
    /// passes a tolerance check
    pub fn mis_match_percentage(&self) -> f64 {
        self.mis_match_percentage.trim().parse().unwrap_or(f64::NAN)
    }

    /// Renders the diff image and encodes it as PNG
    pub fn into_png(self) -> Result<Vec<u8>> {
        let image = (self.diff_image)();
        let mut buffer = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(image).write_to(&mut buffer, ImageFormat::Png)?;
        Ok(buffer.into_inner())
    }
}

#[derive(Debug, Clone, Copy)]
struct Tolerance {
    red: u8,
    green: u8,
    blue: u8,
    alpha: u8,
    min_brightness: u8,
}

const DEFAULT_TOLERANCE: Tolerance = Tolerance {
    red: 16,
    green: 16,
    blue: 16,
    alpha: 16,
    min_brightness: 16,
};

const ANTIALIASING_TOLERANCE: Tolerance = Tolerance {
    red: 32,
    green: 32,
    blue: 32,
    alpha: 32,
    min_brightness: 64,
};

/// Default image-diff primitive
#[derive(Debug, Clone, Copy, Default)]
pub struct ResembleComparator;

impl ImageComparator for ResembleComparator {
    fn compare(&self, reference: &[u8], captured: &[u8], ignore: IgnoreStrategy) -> Result<DiffReport> {
        let reference = decode(reference, "reference")?;
        let captured = decode(captured, "captured")?;
        let is_same_dimensions = reference.dimensions() == captured.dimensions();
        let width = reference.width().max(captured.width());
        let height = reference.height().max(captured.height());
        let tolerance = match ignore {
            IgnoreStrategy::Antialiasing => ANTIALIASING_TOLERANCE,
            _ => DEFAULT_TOLERANCE,
        };
        trace!("Comparing {}x{} canvas, ignoring {}", width, height, ignore);

        let mut mismatches = vec![false; width as usize * height as usize];
        let mut mismatched = 0u64;
        for y in 0..height {
            for x in 0..width {
                let matches = match (pixel(&reference, x, y), pixel(&captured, x, y)) {
                    (Some(a), Some(b)) => match ignore {
                        IgnoreStrategy::Colors => brightness_similar(a, b, &tolerance),
                        IgnoreStrategy::Nothing => rgba_similar(a, b, &tolerance),
                        IgnoreStrategy::Antialiasing => {
                            rgba_similar(a, b, &tolerance)
                                || ((is_antialiased(&reference, x, y, &tolerance)
                                    || is_antialiased(&captured, x, y, &tolerance))
                                    && brightness_similar(a, b, &tolerance))
                        }
                    },
                    _ => false,
                };
                if !matches {
                    mismatches[(y * width + x) as usize] = true;
                    mismatched += 1;
                }
            }
        }

        let total = width as u64 * height as u64;
        let percentage = if total == 0 {
            0.0
        } else {
            mismatched as f64 * 100.0 / total as f64
        };
        debug!("{} of {} pixels differ ({:.2}%)", mismatched, total, percentage);

        Ok(DiffReport::new(
            format!("{:.2}", percentage),
            is_same_dimensions,
            move || render_diff(&reference, &captured, &mismatches, width, height),
        ))
    }
}

fn decode(bytes: &[u8], which: &str) -> Result<RgbaImage> {
    image::load_from_memory(bytes)
        .map(|image| image.to_rgba8())
        .map_err(|e| Error::Comparison(format!("cannot decode {} image: {}", which, e)))
}

fn pixel(image: &RgbaImage, x: u32, y: u32) -> Option<Rgba<u8>> {
    image.get_pixel_checked(x, y).copied()
}

fn channel_similar(a: u8, b: u8, tolerance: u8) -> bool {
    a.abs_diff(b) < tolerance || a == b
}

fn rgba_similar(a: Rgba<u8>, b: Rgba<u8>, t: &Tolerance) -> bool {
    channel_similar(a[0], b[0], t.red)
        && channel_similar(a[1], b[1], t.green)
        && channel_similar(a[2], b[2], t.blue)
        && channel_similar(a[3], b[3], t.alpha)
}

fn brightness(p: Rgba<u8>) -> f32 {
    0.3 * p[0] as f32 + 0.59 * p[1] as f32 + 0.11 * p[2] as f32
}

fn brightness_similar(a: Rgba<u8>, b: Rgba<u8>, t: &Tolerance) -> bool {
    channel_similar(a[3], b[3], t.alpha)
        && (brightness(a) - brightness(b)).abs() < t.min_brightness as f32
}

/// Hue on a 0..1 scale
fn hue(p: Rgba<u8>) -> f32 {
    let (r, g, b) = (p[0] as f32 / 255.0, p[1] as f32 / 255.0, p[2] as f32 / 255.0);
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    if max == min {
        return 0.0;
    }
    let d = max - min;
    let h = if max == r {
        (g - b) / d + if g < b { 6.0 } else { 0.0 }
    } else if max == g {
        (b - r) / d + 2.0
    } else {
        (r - g) / d + 4.0
    };
    h / 6.0
}

/// A pixel sits on an antialiased edge when several neighbours contrast with
/// it, or when fewer than two neighbours share its exact colour
fn is_antialiased(image: &RgbaImage, x: u32, y: u32, t: &Tolerance) -> bool {
    let Some(source) = pixel(image, x, y) else {
        return false;
    };
    let source_hue = hue(source);
    let (mut high_contrast, mut equivalent, mut different_hue) = (0, 0, 0);

    for dy in -1i64..=1 {
        for dx in -1i64..=1 {
            if dx == 0 && dy == 0 {
                continue;
            }
            let (nx, ny) = (x as i64 + dx, y as i64 + dy);
            if nx < 0 || ny < 0 {
                continue;
            }
            let Some(neighbour) = pixel(image, nx as u32, ny as u32) else {
                continue;
            };
            if !brightness_similar(source, neighbour, t) {
                high_contrast += 1;
            }
            if source == neighbour {
                equivalent += 1;
            }
            if (hue(neighbour) - source_hue).abs() > 0.3 {
                different_hue += 1;
            }
            if different_hue > 1 || high_contrast > 1 {
                return true;
            }
        }
    }
    equivalent < 2
}

fn render_diff(
    reference: &RgbaImage,
    captured: &RgbaImage,
    mismatches: &[bool],
    width: u32,
    height: u32,
) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, y| {
        if mismatches[(y * width + x) as usize] {
            return ERROR_COLOR;
        }
        let source = pixel(captured, x, y)
            .or_else(|| pixel(reference, x, y))
            .unwrap_or(Rgba([255, 255, 255, 255]));
        let gray = 255.0 - (255.0 - brightness(source)) * FADE;
        let gray = gray.round().clamp(0.0, 255.0) as u8;
        Rgba([gray, gray, gray, 255])
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png(image: &RgbaImage) -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(image.clone())
            .write_to(&mut out, ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    fn solid(width: u32, height: u32, color: [u8; 4]) -> Vec<u8> {
        png(&RgbaImage::from_pixel(width, height, Rgba(color)))
    }

    #[test]
    fn test_identical_images_match() {
        let image = solid(8, 8, [40, 80, 120, 255]);
        let report = ResembleComparator.compare(&image, &image, IgnoreStrategy::Nothing).unwrap();

        assert_eq!(report.mis_match_percentage, "0.00");
        assert_eq!(report.mis_match_percentage(), 0.0);
        assert!(report.is_same_dimensions);
    }

    #[test]
    fn test_single_pixel_change_counts() {
        let reference = RgbaImage::from_pixel(2, 2, Rgba([255, 255, 255, 255]));
        let mut captured = reference.clone();
        captured.put_pixel(1, 1, Rgba([0, 0, 0, 255]));

        let report = ResembleComparator
            .compare(&png(&reference), &png(&captured), IgnoreStrategy::Nothing)
            .unwrap();
        assert_eq!(report.mis_match_percentage, "25.00");

        let diff = image::load_from_memory(&report.into_png().unwrap()).unwrap().to_rgba8();
        assert_eq!(diff.get_pixel(1, 1), &ERROR_COLOR);
        assert_eq!(diff.get_pixel(0, 0), &Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn test_small_channel_drift_is_tolerated() {
        let reference = solid(4, 4, [100, 100, 100, 255]);
        let captured = solid(4, 4, [110, 95, 105, 255]);

        let report = ResembleComparator.compare(&reference, &captured, IgnoreStrategy::Nothing).unwrap();
        assert_eq!(report.mis_match_percentage(), 0.0);
    }

    #[test]
    fn test_ignore_strategies_use_distinct_modes() {
        // same brightness, different colour
        let red = solid(3, 3, [255, 0, 0, 255]);
        let gray = solid(3, 3, [77, 77, 77, 255]);
        // moderate drift on every channel
        let dark = solid(3, 3, [100, 100, 100, 255]);
        let light = solid(3, 3, [120, 120, 120, 255]);

        let pct = |a: &[u8], b: &[u8], ignore| {
            ResembleComparator.compare(a, b, ignore).unwrap().mis_match_percentage()
        };

        assert_eq!(pct(&red, &gray, IgnoreStrategy::Nothing), 100.0);
        assert_eq!(pct(&red, &gray, IgnoreStrategy::Colors), 0.0);
        assert_eq!(pct(&red, &gray, IgnoreStrategy::Antialiasing), 100.0);

        assert_eq!(pct(&dark, &light, IgnoreStrategy::Nothing), 100.0);
        assert_eq!(pct(&dark, &light, IgnoreStrategy::Colors), 100.0);
        assert_eq!(pct(&dark, &light, IgnoreStrategy::Antialiasing), 0.0);
    }

    #[test]
    fn test_antialiased_edge_is_ignored() {
        // a black/white edge whose boundary pixel shifts shade between runs
        let mut reference = RgbaImage::from_pixel(5, 5, Rgba([255, 255, 255, 255]));
        for y in 0..5 {
            for x in 0..2 {
                reference.put_pixel(x, y, Rgba([0, 0, 0, 255]));
            }
        }
        let mut captured = reference.clone();
        captured.put_pixel(2, 2, Rgba([200, 200, 200, 255]));
        reference.put_pixel(2, 2, Rgba([240, 240, 240, 255]));

        let strict = ResembleComparator
            .compare(&png(&reference), &png(&captured), IgnoreStrategy::Nothing)
            .unwrap();
        assert_eq!(strict.mis_match_percentage, "4.00");

        let lenient = ResembleComparator
            .compare(&png(&reference), &png(&captured), IgnoreStrategy::Antialiasing)
            .unwrap();
        assert_eq!(lenient.mis_match_percentage(), 0.0);
    }

    #[test]
    fn test_dimension_change_is_reported() {
        let reference = solid(4, 4, [0, 0, 0, 255]);
        let captured = solid(4, 2, [0, 0, 0, 255]);

        let report = ResembleComparator.compare(&reference, &captured, IgnoreStrategy::Nothing).unwrap();
        assert!(!report.is_same_dimensions);
        assert_eq!(report.mis_match_percentage, "50.00");

        let diff = image::load_from_memory(&report.into_png().unwrap()).unwrap();
        assert_eq!((diff.width(), diff.height()), (4, 4));
    }

    #[test]
    fn test_textual_percentage_is_numeric() {
        let report = DiffReport::new(" 12.50 ", true, || RgbaImage::new(1, 1));
        assert_eq!(report.mis_match_percentage(), 12.5);

        let report = DiffReport::new("undefined", false, || RgbaImage::new(1, 1));
        assert!(report.mis_match_percentage().is_nan());
    }

    #[test]
    fn test_garbage_input_is_a_comparison_error() {
        let image = solid(2, 2, [0, 0, 0, 255]);
        let err = ResembleComparator
            .compare(&image, b"definitely not an image", IgnoreStrategy::Nothing)
            .unwrap_err();
        assert!(matches!(err, Error::Comparison(_)));
    }
}
