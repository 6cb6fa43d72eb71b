//! Contrast normalisation and sharpening applied before segmentation and to
//! every cropped panel.

use image::{DynamicImage, RgbImage};

/// 3×3 sharpen kernel: strong centre, weak negative ring, sums to 1.
#[rustfmt::skip]
const SHARPEN_KERNEL: [f32; 9] = [
    -2.0 / 16.0, -2.0 / 16.0, -2.0 / 16.0,
    -2.0 / 16.0, 32.0 / 16.0, -2.0 / 16.0,
    -2.0 / 16.0, -2.0 / 16.0, -2.0 / 16.0,
];

/// Stretch each RGB channel so the darkest `cutoff_pct`% of pixels map to 0
/// and the brightest `cutoff_pct`% map to 255.
///
/// A channel whose remaining range collapses to a single value is left
/// untouched.
pub fn autocontrast(img: &DynamicImage, cutoff_pct: f32) -> DynamicImage {
    let mut rgb: RgbImage = img.to_rgb8();
    let total = rgb.width() as u64 * rgb.height() as u64;
    if total == 0 {
        return DynamicImage::ImageRgb8(rgb);
    }
    let cut = (total as f64 * cutoff_pct.clamp(0.0, 49.0) as f64 / 100.0) as u64;

    for c in 0..3 {
        let mut hist = [0u64; 256];
        for p in rgb.pixels() {
            hist[p[c] as usize] += 1;
        }
        let Some((lo, hi)) = cutoff_bounds(&hist, cut) else {
            continue;
        };
        let lut = stretch_lut(lo, hi);
        for p in rgb.pixels_mut() {
            p[c] = lut[p[c] as usize];
        }
    }

    DynamicImage::ImageRgb8(rgb)
}

/// Lowest and highest levels left after discarding `cut` pixels from each
/// end of the histogram, or `None` if nothing is left to stretch.
fn cutoff_bounds(hist: &[u64; 256], cut: u64) -> Option<(u8, u8)> {
    let mut acc = 0u64;
    let mut lo = None;
    for (level, &count) in hist.iter().enumerate() {
        acc += count;
        if acc > cut {
            lo = Some(level);
            break;
        }
    }

    acc = 0;
    let mut hi = None;
    for (level, &count) in hist.iter().enumerate().rev() {
        acc += count;
        if acc > cut {
            hi = Some(level);
            break;
        }
    }

    match (lo, hi) {
        (Some(lo), Some(hi)) if hi > lo => Some((lo as u8, hi as u8)),
        _ => None,
    }
}

fn stretch_lut(lo: u8, hi: u8) -> [u8; 256] {
    let scale = 255.0 / (hi as f32 - lo as f32);
    let offset = -(lo as f32) * scale;
    let mut lut = [0u8; 256];
    for (i, v) in lut.iter_mut().enumerate() {
        *v = (i as f32 * scale + offset).round().clamp(0.0, 255.0) as u8;
    }
    lut
}

pub fn sharpen(img: &DynamicImage) -> DynamicImage {
    img.filter3x3(&SHARPEN_KERNEL)
}

/// Page pre-processing before edge detection.
pub fn enhance_page(img: &DynamicImage) -> DynamicImage {
    sharpen(&autocontrast(img, 2.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn stretches_narrow_range() {
        let mut img = RgbImage::new(10, 10);
        for (x, _, p) in img.enumerate_pixels_mut() {
            let v = if x < 5 { 100 } else { 150 };
            *p = Rgb([v, v, v]);
        }
        let out = autocontrast(&DynamicImage::ImageRgb8(img), 0.0).to_rgb8();
        assert_eq!(out.get_pixel(0, 0)[0], 0);
        assert_eq!(out.get_pixel(9, 0)[0], 255);
    }

    #[test]
    fn uniform_image_is_unchanged() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 8, Rgb([200, 200, 200])));
        let out = autocontrast(&img, 2.0).to_rgb8();
        assert!(out.pixels().all(|p| p[0] == 200));
    }

    #[test]
    fn cutoff_ignores_outliers() {
        let mut hist = [0u64; 256];
        hist[0] = 1;
        hist[100] = 98;
        hist[255] = 1;
        assert_eq!(cutoff_bounds(&hist, 0), Some((0, 255)));
        assert_eq!(cutoff_bounds(&hist, 1), None);
        hist[120] = 10;
        assert_eq!(cutoff_bounds(&hist, 1), Some((100, 120)));
    }

    #[test]
    fn sharpen_keeps_flat_regions() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(6, 6, Rgb([90, 90, 90])));
        let out = sharpen(&img).to_rgb8();
        assert_eq!(out.get_pixel(3, 3)[0], 90);
    }
}
