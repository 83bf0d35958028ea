use image::{GrayImage, RgbImage};
use imageproc::contours::{find_contours, BorderType};
use imageproc::distance_transform::Norm;
use imageproc::filter::gaussian_blur_f32;
use imageproc::morphology::{dilate, erode};
use imageproc::point::Point;
use imageproc::rect::Rect;
use log::debug;
use logging_timer::time;
use serde::{Deserialize, Serialize};

use crate::geometry::{contour_area, contour_bounds, min_enclosing_circle};
use crate::image_utils::inverse_threshold;

/// Shape filters for bubble candidates. The defaults are tuned for crops
/// upscaled 3× from a typical scan.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BubbleDetectorParams {
    /// Gaussian blur applied before thresholding; 0 disables it.
    pub blur_sigma: f32,
    /// Gray level at or below which a pixel counts as ink.
    pub threshold: u8,
    /// Passes of the 5×5 closing that bridges speckle gaps; 0 disables it.
    pub close_iterations: u8,
    pub min_area: f64,
    pub max_area: f64,
    pub min_aspect_ratio: f64,
    pub max_aspect_ratio: f64,
    /// Minimum contour area over bounding-box area.
    pub min_fill_ratio: f64,
}

impl Default for BubbleDetectorParams {
    fn default() -> Self {
        Self {
            blur_sigma: 1.1,
            threshold: 180,
            close_iterations: 2,
            min_area: 100.0,
            max_area: 3000.0,
            min_aspect_ratio: 0.7,
            max_aspect_ratio: 1.3,
            min_fill_ratio: 0.4,
        }
    }
}

/// A bubble-shaped outline found in a region crop.
#[derive(Debug, Clone, PartialEq)]
pub struct BubbleCandidate {
    /// Center of the minimal enclosing circle, in crop pixels.
    pub center: Point<i32>,
    /// Radius of the minimal enclosing circle.
    pub radius: f32,
    pub bounds: Rect,
    pub contour: Vec<Point<i32>>,
}

impl BubbleCandidate {
    pub fn from_contour(contour: Vec<Point<i32>>) -> Option<Self> {
        let circle = min_enclosing_circle(&contour)?;
        let bounds = contour_bounds(&contour)?;
        Some(Self {
            center: Point::new(
                circle.center.x.round() as i32,
                circle.center.y.round() as i32,
            ),
            radius: circle.radius,
            bounds,
            contour,
        })
    }

    pub fn center_f32(&self) -> Point<f32> {
        Point::new(self.center.x as f32, self.center.y as f32)
    }
}

/// Whether a traced outline is shaped like a bubble: right size, roughly
/// square bounding box, and solid enough to not be a thin stroke.
pub fn is_bubble_shaped(contour: &[Point<i32>], params: &BubbleDetectorParams) -> bool {
    let bounds = match contour_bounds(contour) {
        Some(bounds) => bounds,
        None => return false,
    };
    let area = contour_area(contour);
    let aspect_ratio = bounds.width() as f64 / bounds.height() as f64;
    let fill_ratio = area / (bounds.width() as f64 * bounds.height() as f64 + 1e-6);

    area >= params.min_area
        && area <= params.max_area
        && aspect_ratio >= params.min_aspect_ratio
        && aspect_ratio <= params.max_aspect_ratio
        && fill_ratio > params.min_fill_ratio
}

/// Closes `mask` with a 5×5 kernel missing its corners, repeated `iterations`
/// times: every dilation pass runs before the first erosion.
fn close_rounded(mask: &GrayImage, iterations: u8) -> GrayImage {
    let mut closed = mask.clone();
    for _ in 0..iterations {
        closed = dilate(&dilate(&closed, Norm::LInf, 1), Norm::L1, 1);
    }
    for _ in 0..iterations {
        closed = erode(&erode(&closed, Norm::LInf, 1), Norm::L1, 1);
    }
    closed
}

/// Finds bubble candidates in a region crop, ordered top to bottom (then left
/// to right).
#[time]
pub fn detect_bubbles(img: &RgbImage, params: &BubbleDetectorParams) -> Vec<BubbleCandidate> {
    let gray = image::imageops::grayscale(img);
    let gray = if params.blur_sigma > 0.0 {
        gaussian_blur_f32(&gray, params.blur_sigma)
    } else {
        gray
    };

    let ink = inverse_threshold(&gray, params.threshold);
    let ink = close_rounded(&ink, params.close_iterations);

    let contours = find_contours::<i32>(&ink);
    let outer_count = contours
        .iter()
        .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
        .count();

    let mut candidates = contours
        .into_iter()
        .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
        .filter(|c| is_bubble_shaped(&c.points, params))
        .filter_map(|c| BubbleCandidate::from_contour(c.points))
        .collect::<Vec<BubbleCandidate>>();
    candidates.sort_by_key(|c| (c.center.y, c.center.x));

    debug!(
        "{} of {} external contours kept as bubble candidates",
        candidates.len(),
        outer_count
    );
    candidates
}
