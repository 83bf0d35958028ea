use image::imageops::{self, FilterType};
use image::RgbImage;
use serde::Deserialize;
use thiserror::Error;

use crate::geometry::to_original_scale;

/// The block types located on a page by the region detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
pub enum RegionKind {
    #[serde(rename = "StudentID", alias = "IDStudent")]
    StudentIdGrid,
    #[serde(rename = "ExamID", alias = "IDExam")]
    ExamIdGrid,
    #[serde(rename = "AnswerArea")]
    AnswerBlock,
    /// Alignment markers; detected but not graded.
    Marker,
}

/// An axis-aligned box in page coordinates, `x2`/`y2` exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(from = "[f32; 4]")]
pub struct BoundingBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl BoundingBox {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> u32 {
        (self.x2 - self.x1).max(0) as u32
    }

    pub fn height(&self) -> u32 {
        (self.y2 - self.y1).max(0) as u32
    }

    /// Intersection with a `width`×`height` page.
    pub fn clip(&self, width: u32, height: u32) -> BoundingBox {
        let x1 = self.x1.clamp(0, width as i32);
        let y1 = self.y1.clamp(0, height as i32);
        BoundingBox {
            x1,
            y1,
            x2: self.x2.clamp(x1, width as i32),
            y2: self.y2.clamp(y1, height as i32),
        }
    }
}

impl From<[f32; 4]> for BoundingBox {
    fn from([x1, y1, x2, y2]: [f32; 4]) -> Self {
        Self::new(x1 as i32, y1 as i32, x2 as i32, y2 as i32)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RegionError {
    #[error("{kind:?} region {bbox:?} has zero area")]
    EmptyRegion { kind: RegionKind, bbox: BoundingBox },

    #[error("upscale factor must be positive, got {0}")]
    InvalidScale(f32),

    #[error("an ID grid column holds at most 10 digit bands, got {0}")]
    TooManyBands(u32),

    #[error("a {width}x{height} grid cannot be split into {columns} columns of {bands} bands")]
    GridTooSmall {
        width: u32,
        height: u32,
        columns: usize,
        bands: u32,
    },
}

/// A page region cut out and upscaled for bubble analysis.
///
/// `x_offset` is the horizontal position of `image` within the upscaled crop,
/// non-zero once a gutter has been dropped.
#[derive(Debug, Clone)]
pub struct RegionCrop {
    pub kind: RegionKind,
    pub bbox: BoundingBox,
    pub scale: f32,
    pub x_offset: u32,
    pub image: RgbImage,
}

impl RegionCrop {
    /// Wraps an already upscaled crop.
    pub fn new(
        kind: RegionKind,
        bbox: BoundingBox,
        scale: f32,
        image: RgbImage,
    ) -> Result<Self, RegionError> {
        if !(scale > 0.0) {
            return Err(RegionError::InvalidScale(scale));
        }
        if image.width() == 0 || image.height() == 0 {
            return Err(RegionError::EmptyRegion { kind, bbox });
        }
        Ok(Self {
            kind,
            bbox,
            scale,
            x_offset: 0,
            image,
        })
    }

    /// Cuts `bbox` out of `page` (clipped to the page) and upscales it by
    /// `scale` with a cubic filter.
    pub fn from_page(
        page: &RgbImage,
        kind: RegionKind,
        bbox: BoundingBox,
        scale: f32,
    ) -> Result<Self, RegionError> {
        if !(scale > 0.0) {
            return Err(RegionError::InvalidScale(scale));
        }
        let clipped = bbox.clip(page.width(), page.height());
        if clipped.width() == 0 || clipped.height() == 0 {
            return Err(RegionError::EmptyRegion { kind, bbox });
        }

        let crop = imageops::crop_imm(
            page,
            clipped.x1 as u32,
            clipped.y1 as u32,
            clipped.width(),
            clipped.height(),
        )
        .to_image();
        let width = ((clipped.width() as f32 * scale).round() as u32).max(1);
        let height = ((clipped.height() as f32 * scale).round() as u32).max(1);
        let image = imageops::resize(&crop, width, height, FilterType::CatmullRom);

        Self::new(kind, clipped, scale, image)
    }

    /// Drops the left `fraction` of the crop (the question-number gutter of
    /// an answer block). The remaining image keeps page-convertible
    /// coordinates through `x_offset`.
    pub fn without_gutter(self, fraction: f32) -> Self {
        let gutter = (self.image.width() as f32 * fraction.clamp(0.0, 1.0)) as u32;
        if gutter == 0 || gutter >= self.image.width() {
            return self;
        }
        let image = imageops::crop_imm(
            &self.image,
            gutter,
            0,
            self.image.width() - gutter,
            self.image.height(),
        )
        .to_image();
        Self {
            x_offset: self.x_offset + gutter,
            image,
            ..self
        }
    }

    /// Converts a point and radius in `image` coordinates to page coordinates.
    pub fn to_original(&self, x: i32, y: i32, radius: i32) -> (i32, i32, i32) {
        to_original_scale(
            x + self.x_offset as i32,
            y,
            radius,
            self.bbox.x1,
            self.bbox.y1,
            self.scale,
        )
    }
}
