//! Panel segmentation: find the rectangles that look like comic panels on a
//! page.
//!
//! ```text
//! page ─▶ autocontrast+sharpen ─▶ gray ─▶ blur ─▶ canny ─▶ dilate ─▶ outer contours
//!      ─▶ bounding boxes ─▶ size filter ─▶ rows by y, then x ─▶ cap
//! ```
//!
//! Dilation closes the small gaps in hand-drawn panel borders so each panel
//! traces as one outer contour. Boxes that are too small relative to the page
//! (speech bubbles, sound effects, page numbers) are discarded. An empty
//! result means "use the whole page".

use crate::model::BoundingBox;
use crate::pipeline::enhance::enhance_page;
use image::{DynamicImage, GrayImage};
use imageproc::contours::{find_contours, BorderType};
use imageproc::distance_transform::Norm;
use imageproc::edges::canny;
use imageproc::filter::gaussian_blur_f32;
use imageproc::morphology::dilate;

/// Thresholds for [`find_panel_boxes`].
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentParams {
    pub min_height_frac: f32,
    pub min_width_frac: f32,
    pub min_area_frac: f32,
    pub max_panels_per_page: usize,
    /// Gaussian sigma; 1.1 matches a 5×5 kernel.
    pub blur_sigma: f32,
    pub canny_low: f32,
    pub canny_high: f32,
    /// Chebyshev radius; two passes of a 15×15 square ≙ 14.
    pub dilate_radius: u8,
    /// Boxes whose tops are within this many pixels of a row's first box
    /// share the row and are read left to right.
    pub row_tolerance: u32,
}

impl Default for SegmentParams {
    fn default() -> Self {
        Self {
            min_height_frac: 0.15,
            min_width_frac: 0.20,
            min_area_frac: 0.05,
            max_panels_per_page: 20,
            blur_sigma: 1.1,
            canny_low: 60.0,
            canny_high: 120.0,
            dilate_radius: 14,
            row_tolerance: 14,
        }
    }
}

/// Detect panel rectangles on a page, top-to-bottom then left-to-right.
///
/// Returns an empty vector when no candidate survives the size filter.
pub fn find_panel_boxes(page: &DynamicImage, params: &SegmentParams) -> Vec<BoundingBox> {
    let (width, height) = (page.width(), page.height());
    if width == 0 || height == 0 {
        return Vec::new();
    }

    let gray = enhance_page(page).to_luma8();
    let mask = edge_mask(&gray, params);

    let candidates = find_contours::<u32>(&mask)
        .into_iter()
        .filter(|c| c.parent.is_none() && c.border_type == BorderType::Outer)
        .filter_map(|c| {
            let xs = c.points.iter().map(|p| p.x);
            let ys = c.points.iter().map(|p| p.y);
            let (x0, x1) = (xs.clone().min()?, xs.max()?);
            let (y0, y1) = (ys.clone().min()?, ys.max()?);
            Some(BoundingBox::new(x0, y0, x1 - x0 + 1, y1 - y0 + 1))
        })
        .collect();

    filter_and_order(candidates, width, height, params)
}

fn edge_mask(gray: &GrayImage, params: &SegmentParams) -> GrayImage {
    let blurred = gaussian_blur_f32(gray, params.blur_sigma);
    let edges = canny(&blurred, params.canny_low, params.canny_high);
    dilate(&edges, Norm::LInf, params.dilate_radius)
}

/// Size filter, reading order and per-page cap.
pub fn filter_and_order(
    mut boxes: Vec<BoundingBox>,
    page_width: u32,
    page_height: u32,
    params: &SegmentParams,
) -> Vec<BoundingBox> {
    let (pw, ph) = (page_width as f64, page_height as f64);
    let min_h = params.min_height_frac as f64 * ph;
    let min_w = params.min_width_frac as f64 * pw;
    let min_area = params.min_area_frac as f64 * pw * ph;

    boxes.retain(|b| b.h as f64 >= min_h && b.w as f64 >= min_w && b.area() as f64 >= min_area);
    let mut ordered = reading_order(boxes, params.row_tolerance);
    ordered.truncate(params.max_panels_per_page);
    ordered
}

/// Sort top to bottom, group boxes into rows by top edge, then sort each
/// row left to right.
fn reading_order(mut boxes: Vec<BoundingBox>, tolerance: u32) -> Vec<BoundingBox> {
    boxes.sort_by_key(|b| (b.y, b.x));
    let mut rows: Vec<Vec<BoundingBox>> = Vec::new();
    for b in boxes {
        match rows.last_mut() {
            Some(row) if b.y - row[0].y <= tolerance => row.push(b),
            _ => rows.push(vec![b]),
        }
    }
    rows.into_iter()
        .flat_map(|mut row| {
            row.sort_by_key(|b| (b.x, b.y));
            row
        })
        .collect()
}

/// Crop a box out of the page, clamped to the page bounds.
pub fn crop(page: &DynamicImage, b: &BoundingBox) -> DynamicImage {
    let x = b.x.min(page.width());
    let y = b.y.min(page.height());
    let w = b.w.min(page.width() - x);
    let h = b.h.min(page.height() - y);
    page.crop_imm(x, y, w, h)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use imageproc::drawing::draw_hollow_rect_mut;
    use imageproc::rect::Rect;

    fn page_with_frames(w: u32, h: u32, frames: &[(i32, i32, u32, u32)]) -> DynamicImage {
        let mut img = RgbImage::from_pixel(w, h, Rgb([255, 255, 255]));
        for &(x, y, fw, fh) in frames {
            for t in 0..4 {
                draw_hollow_rect_mut(
                    &mut img,
                    Rect::at(x + t, y + t).of_size(fw - 2 * t as u32, fh - 2 * t as u32),
                    Rgb([0, 0, 0]),
                );
            }
        }
        DynamicImage::ImageRgb8(img)
    }

    #[test]
    fn filter_drops_small_boxes() {
        let p = SegmentParams::default();
        let boxes = vec![
            BoundingBox::new(0, 0, 100, 100),
            BoundingBox::new(10, 10, 10, 10),
            BoundingBox::new(0, 500, 300, 50),
        ];
        let kept = filter_and_order(boxes, 400, 600, &p);
        assert_eq!(kept, vec![BoundingBox::new(0, 0, 100, 100)]);
    }

    #[test]
    fn equal_tops_ordered_left_to_right() {
        let p = SegmentParams::default();
        let boxes = vec![
            BoundingBox::new(210, 50, 180, 200),
            BoundingBox::new(10, 50, 180, 200),
            BoundingBox::new(10, 10, 380, 100),
        ];
        let kept = filter_and_order(boxes, 400, 600, &p);
        let xs_ys: Vec<_> = kept.iter().map(|b| (b.x, b.y)).collect();
        assert_eq!(xs_ys, vec![(10, 10), (10, 50), (210, 50)]);
    }

    #[test]
    fn nearly_equal_tops_share_a_row() {
        let p = SegmentParams::default();
        let boxes = vec![
            BoundingBox::new(10, 52, 180, 200),
            BoundingBox::new(210, 50, 180, 200),
            BoundingBox::new(10, 300, 380, 200),
        ];
        let kept = filter_and_order(boxes, 400, 600, &p);
        let xs_ys: Vec<_> = kept.iter().map(|b| (b.x, b.y)).collect();
        assert_eq!(xs_ys, vec![(10, 52), (210, 50), (10, 300)]);
    }

    #[test]
    fn cap_per_page() {
        let p = SegmentParams {
            max_panels_per_page: 2,
            ..Default::default()
        };
        let boxes = (0..5).map(|i| BoundingBox::new(0, i * 100, 300, 100)).collect();
        assert_eq!(filter_and_order(boxes, 400, 600, &p).len(), 2);
    }

    #[test]
    fn blank_page_has_no_boxes() {
        let page = DynamicImage::ImageRgb8(RgbImage::from_pixel(300, 400, Rgb([255, 255, 255])));
        assert!(find_panel_boxes(&page, &SegmentParams::default()).is_empty());
    }

    #[test]
    fn detects_stacked_frames_in_reading_order() {
        let page = page_with_frames(400, 600, &[(40, 320, 320, 240), (40, 40, 320, 240)]);
        let boxes = find_panel_boxes(&page, &SegmentParams::default());
        assert_eq!(boxes.len(), 2, "boxes: {boxes:?}");
        assert!(boxes[0].y < boxes[1].y);
        // Dilation grows each box by at most the radius on every side.
        assert!(boxes[0].x <= 40 && boxes[0].x + 20 >= 40);
        assert!(boxes[0].w >= 320);
    }

    #[test]
    fn crop_is_clamped() {
        let page = DynamicImage::ImageRgb8(RgbImage::new(100, 100));
        let c = crop(&page, &BoundingBox::new(80, 90, 50, 50));
        assert_eq!((c.width(), c.height()), (20, 10));
    }
}
