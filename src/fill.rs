use image::{GrayImage, RgbImage};
use imageproc::drawing::draw_polygon_mut;
use imageproc::filter::median_filter;
use imageproc::point::Point;
use serde::{Deserialize, Serialize};

use crate::bubbles::BubbleCandidate;
use crate::geometry::distance;
use crate::image_utils::{darkness_mask, WHITE};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FillParams {
    /// Brightest HSV value still counted as pencil.
    pub max_value: u8,
    /// Radius of the median filter that removes isolated dark pixels.
    pub median_radius: u32,
    /// Fewest dark pixels a bubble needs to count as filled (at least 1).
    pub min_fill_pixels: u32,
    /// Furthest a decision may be from an option slot and still match it.
    pub match_tolerance: f32,
}

impl Default for FillParams {
    fn default() -> Self {
        Self {
            max_value: 90,
            median_radius: 2,
            min_fill_pixels: 1,
            match_tolerance: 20.0,
        }
    }
}

/// The candidate judged filled within a row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FillDecision {
    /// Index into the candidates given to [`select_filled`].
    pub index: usize,
    pub center: Point<i32>,
    pub dark_pixels: u32,
}

/// Dark-ink mask of a region, ready for [`fill_score`].
pub fn fill_mask(img: &RgbImage, params: &FillParams) -> GrayImage {
    let mask = darkness_mask(img, params.max_value);
    if params.median_radius > 0 {
        median_filter(&mask, params.median_radius, params.median_radius)
    } else {
        mask
    }
}

/// Number of dark mask pixels inside the candidate's outline.
pub fn fill_score(mask: &GrayImage, candidate: &BubbleCandidate) -> u32 {
    let bounds = candidate.bounds;
    let mut stencil = GrayImage::new(bounds.width(), bounds.height());
    let local = candidate
        .contour
        .iter()
        .map(|p| Point::new(p.x - bounds.left(), p.y - bounds.top()))
        .collect::<Vec<Point<i32>>>();
    fill_contour_mut(&mut stencil, &local);

    stencil
        .enumerate_pixels()
        .filter(|(_, _, pixel)| **pixel == WHITE)
        .filter(|(x, y, _)| {
            let mx = bounds.left() + *x as i32;
            let my = bounds.top() + *y as i32;
            mx >= 0
                && my >= 0
                && (mx as u32) < mask.width()
                && (my as u32) < mask.height()
                && *mask.get_pixel(mx as u32, my as u32) == WHITE
        })
        .count() as u32
}

fn fill_contour_mut(stencil: &mut GrayImage, points: &[Point<i32>]) {
    let mut polygon = points.to_vec();
    polygon.dedup();
    while polygon.len() > 1 && polygon.first() == polygon.last() {
        polygon.pop();
    }

    if polygon.len() < 3 {
        for p in polygon {
            if p.x >= 0
                && p.y >= 0
                && (p.x as u32) < stencil.width()
                && (p.y as u32) < stencil.height()
            {
                stencil.put_pixel(p.x as u32, p.y as u32, WHITE);
            }
        }
        return;
    }

    draw_polygon_mut(stencil, &polygon, WHITE);
}

/// Picks the candidate holding the most dark pixels. Returns `None` when no
/// candidate reaches `min_fill_pixels` (a row left blank); ties go to the
/// earlier candidate.
pub fn select_filled(
    mask: &GrayImage,
    candidates: &[BubbleCandidate],
    params: &FillParams,
) -> Option<FillDecision> {
    let min_fill = params.min_fill_pixels.max(1);
    let mut best: Option<FillDecision> = None;

    for (index, candidate) in candidates.iter().enumerate() {
        let dark_pixels = fill_score(mask, candidate);
        if dark_pixels < min_fill {
            continue;
        }
        if best.map_or(true, |b| dark_pixels > b.dark_pixels) {
            best = Some(FillDecision {
                index,
                center: candidate.center,
                dark_pixels,
            });
        }
    }

    best
}

/// Slot of the option nearest to `point`, if one lies within `tolerance`.
pub fn match_option(point: &Point<i32>, options: &[BubbleCandidate], tolerance: f32) -> Option<usize> {
    let point = Point::new(point.x as f32, point.y as f32);
    options
        .iter()
        .enumerate()
        .map(|(i, option)| (i, distance(&point, &option.center_f32())))
        .filter(|(_, d)| *d < tolerance)
        .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(i, _)| i)
}
