use image::{GrayImage, Luma, Rgb, RgbImage};
use imageproc::contrast::threshold;
use imageproc::rect::Rect;

pub const WHITE: Luma<u8> = Luma([u8::MAX]);
pub const BLACK: Luma<u8> = Luma([u8::MIN]);

pub const WHITE_RGB: Rgb<u8> = Rgb([255, 255, 255]);
pub const GREEN: Rgb<u8> = Rgb([0, 255, 0]);
pub const RED: Rgb<u8> = Rgb([255, 0, 0]);
pub const BLUE: Rgb<u8> = Rgb([0, 0, 255]);
pub const ORANGE: Rgb<u8> = Rgb([255, 128, 0]);
pub const PINK: Rgb<u8> = Rgb([255, 0, 255]);
pub const DARK_GREEN: Rgb<u8> = Rgb([0, 128, 0]);

pub const RAINBOW: [Rgb<u8>; 6] = [
    Rgb([255, 0, 0]),
    Rgb([255, 127, 0]),
    Rgb([200, 200, 0]),
    Rgb([0, 200, 0]),
    Rgb([0, 0, 255]),
    Rgb([139, 0, 255]),
];

/// Marks every pixel at or below `level` as foreground (white) and everything
/// else as background (black), so ink becomes the foreground.
pub fn inverse_threshold(img: &GrayImage, level: u8) -> GrayImage {
    let mut out = threshold(img, level);
    image::imageops::invert(&mut out);
    out
}

/// Foreground mask of pixels whose HSV value (the brightest channel) is at
/// most `max_value`, whatever their hue or saturation.
pub fn darkness_mask(img: &RgbImage, max_value: u8) -> GrayImage {
    GrayImage::from_fn(img.width(), img.height(), |x, y| {
        let Rgb([r, g, b]) = *img.get_pixel(x, y);
        if r.max(g).max(b) <= max_value {
            WHITE
        } else {
            BLACK
        }
    })
}

/// Counts matching pixels inside `rect`, clipped to the image.
pub fn count_pixels_in_rect(img: &GrayImage, rect: &Rect, luma: &Luma<u8>) -> u32 {
    let left = rect.left().max(0) as u32;
    let top = rect.top().max(0) as u32;
    let right = (rect.right() + 1).clamp(0, img.width() as i32) as u32;
    let bottom = (rect.bottom() + 1).clamp(0, img.height() as i32) as u32;

    let mut count = 0;
    for y in top..bottom {
        for x in left..right {
            if img.get_pixel(x, y) == luma {
                count += 1;
            }
        }
    }
    count
}
