use std::cmp::Ordering;

use imageproc::geometry::convex_hull;
use imageproc::point::Point;
use imageproc::rect::Rect;

/// A circle in sub-pixel image coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Circle {
    pub center: Point<f32>,
    pub radius: f32,
}

impl Circle {
    fn contains(&self, point: &Point<f32>) -> bool {
        distance(&self.center, point) <= self.radius + 1e-3
    }
}

pub fn distance(p1: &Point<f32>, p2: &Point<f32>) -> f32 {
    ((p1.x - p2.x).powf(2.0) + (p1.y - p2.y).powf(2.0)).sqrt()
}

/// Rounded radius of the minimal enclosing circle of a contour, 0 when empty.
pub fn bounding_circle_radius(contour: &[Point<i32>]) -> i32 {
    min_enclosing_circle(contour).map_or(0, |circle| circle.radius.round() as i32)
}

/// Maps a point (and radius) from an upscaled crop back into the page it was
/// cut from: `original = offset + local / scale`, truncating like an integer
/// cast.
pub fn to_original_scale(
    x_local: i32,
    y_local: i32,
    radius_local: i32,
    offset_x: i32,
    offset_y: i32,
    scale: f32,
) -> (i32, i32, i32) {
    debug_assert!(scale > 0.0, "scale must be positive");
    (
        offset_x + (x_local as f32 / scale) as i32,
        offset_y + (y_local as f32 / scale) as i32,
        (radius_local as f32 / scale) as i32,
    )
}

/// Smallest circle containing every point, or `None` for an empty slice.
///
/// Runs the incremental Welzl construction over the convex hull, which keeps
/// the point count small for traced contours.
pub fn min_enclosing_circle(points: &[Point<i32>]) -> Option<Circle> {
    let mut unique = points.to_vec();
    unique.sort_by_key(|p| (p.x, p.y));
    unique.dedup();
    if unique.len() >= 3 {
        unique = convex_hull(&unique);
    }
    let hull = unique
        .iter()
        .map(|p| Point::new(p.x as f32, p.y as f32))
        .collect::<Vec<Point<f32>>>();
    let first = *hull.first()?;

    let mut circle = Circle {
        center: first,
        radius: 0.0,
    };
    for i in 1..hull.len() {
        if circle.contains(&hull[i]) {
            continue;
        }
        circle = Circle {
            center: hull[i],
            radius: 0.0,
        };
        for j in 0..i {
            if circle.contains(&hull[j]) {
                continue;
            }
            circle = circle_from_diameter(&hull[i], &hull[j]);
            for k in 0..j {
                if circle.contains(&hull[k]) {
                    continue;
                }
                circle = circumcircle(&hull[i], &hull[j], &hull[k])
                    .unwrap_or_else(|| widest_pair_circle(&hull[i], &hull[j], &hull[k]));
            }
        }
    }

    Some(circle)
}

fn circle_from_diameter(a: &Point<f32>, b: &Point<f32>) -> Circle {
    Circle {
        center: Point::new((a.x + b.x) / 2.0, (a.y + b.y) / 2.0),
        radius: distance(a, b) / 2.0,
    }
}

fn circumcircle(a: &Point<f32>, b: &Point<f32>, c: &Point<f32>) -> Option<Circle> {
    let d = 2.0 * (a.x * (b.y - c.y) + b.x * (c.y - a.y) + c.x * (a.y - b.y));
    if d.abs() < f32::EPSILON {
        return None;
    }
    let a2 = a.x * a.x + a.y * a.y;
    let b2 = b.x * b.x + b.y * b.y;
    let c2 = c.x * c.x + c.y * c.y;
    let center = Point::new(
        (a2 * (b.y - c.y) + b2 * (c.y - a.y) + c2 * (a.y - b.y)) / d,
        (a2 * (c.x - b.x) + b2 * (a.x - c.x) + c2 * (b.x - a.x)) / d,
    );
    Some(Circle {
        center,
        radius: distance(&center, a),
    })
}

// collinear points: the outermost pair spans the others
fn widest_pair_circle(a: &Point<f32>, b: &Point<f32>, c: &Point<f32>) -> Circle {
    [
        circle_from_diameter(a, b),
        circle_from_diameter(a, c),
        circle_from_diameter(b, c),
    ]
    .into_iter()
    .max_by(|x, y| x.radius.partial_cmp(&y.radius).unwrap_or(Ordering::Equal))
    .unwrap_or(Circle {
        center: *a,
        radius: 0.0,
    })
}

/// Area enclosed by a closed contour (shoelace formula).
pub fn contour_area(points: &[Point<i32>]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let twice_area = points
        .iter()
        .zip(points.iter().cycle().skip(1))
        .map(|(a, b)| a.x as f64 * b.y as f64 - b.x as f64 * a.y as f64)
        .sum::<f64>();
    twice_area.abs() / 2.0
}

/// Inclusive bounding box of a contour: a single pixel is 1×1.
pub fn contour_bounds(points: &[Point<i32>]) -> Option<Rect> {
    let min_x = points.iter().map(|p| p.x).min()?;
    let max_x = points.iter().map(|p| p.x).max()?;
    let min_y = points.iter().map(|p| p.y).min()?;
    let max_y = points.iter().map(|p| p.y).max()?;
    Some(Rect::at(min_x, min_y).of_size((max_x - min_x + 1) as u32, (max_y - min_y + 1) as u32))
}
