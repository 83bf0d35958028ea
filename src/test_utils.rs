//! Synthetic answer-sheet fragments for image-based unit tests.

use image::{Rgb, RgbImage};
use imageproc::drawing::draw_filled_circle_mut;
use imageproc::point::Point;

use crate::bubbles::BubbleCandidate;

pub(crate) const PAPER: Rgb<u8> = Rgb([255, 255, 255]);
/// Printed bubble outline: dark enough to be traced, too light to count as a mark.
pub(crate) const OUTLINE: Rgb<u8> = Rgb([150, 150, 150]);
pub(crate) const PENCIL: Rgb<u8> = Rgb([20, 20, 20]);

pub(crate) const BUBBLE_RADIUS: i32 = 18;
pub(crate) const BUBBLE_SPACING: i32 = 70;
pub(crate) const BUBBLE_MARGIN: i32 = 40;

pub(crate) fn blank(width: u32, height: u32) -> RgbImage {
    RgbImage::from_pixel(width, height, PAPER)
}

/// Draws a 4 px printed ring and, when `filled`, a pencil mark inside it.
pub(crate) fn draw_bubble(img: &mut RgbImage, center: (i32, i32), filled: bool) {
    draw_filled_circle_mut(img, center, BUBBLE_RADIUS, OUTLINE);
    draw_filled_circle_mut(img, center, BUBBLE_RADIUS - 4, PAPER);
    if filled {
        draw_filled_circle_mut(img, center, BUBBLE_RADIUS - 4, PENCIL);
    }
}

/// Center of the bubble for `option` in `row` of a synthetic answer block.
pub(crate) fn bubble_center(row: usize, option: usize) -> (i32, i32) {
    (
        BUBBLE_MARGIN + option as i32 * BUBBLE_SPACING,
        BUBBLE_MARGIN + row as i32 * BUBBLE_SPACING,
    )
}

/// An answer block with one row of four bubbles per entry; `Some(i)` fills
/// option `i` of that row.
pub(crate) fn answer_block(marks: &[Option<usize>]) -> RgbImage {
    let width = (2 * BUBBLE_MARGIN + 3 * BUBBLE_SPACING) as u32;
    let height = (2 * BUBBLE_MARGIN + (marks.len().max(1) as i32 - 1) * BUBBLE_SPACING) as u32;
    let mut img = blank(width, height);
    for (row, mark) in marks.iter().enumerate() {
        for option in 0..4 {
            draw_bubble(&mut img, bubble_center(row, option), *mark == Some(option));
        }
    }
    img
}

/// Polygon approximating a circle, as a contour tracer would report it.
pub(crate) fn circle_contour(center: (i32, i32), radius: i32) -> Vec<Point<i32>> {
    let mut points = (0..72)
        .map(|step| {
            let t = (step as f32 * 5.0).to_radians();
            Point::new(
                center.0 + (radius as f32 * t.cos()).round() as i32,
                center.1 + (radius as f32 * t.sin()).round() as i32,
            )
        })
        .collect::<Vec<_>>();
    points.dedup();
    points
}

pub(crate) fn candidate_at(x: i32, y: i32) -> BubbleCandidate {
    BubbleCandidate::from_contour(circle_contour((x, y), 5)).expect("contour is not empty")
}
