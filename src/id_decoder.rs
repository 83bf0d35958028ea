use std::fmt::Display;

use image::RgbImage;
use imageproc::rect::Rect;
use log::debug;
use logging_timer::time;
use serde::{Deserialize, Serialize, Serializer};

use crate::image_utils::{count_pixels_in_rect, inverse_threshold, WHITE};
use crate::region::RegionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IdDecoderParams {
    pub student_id_digits: usize,
    pub exam_id_digits: usize,
    /// Horizontal bands per column, one per digit value (at most 10).
    pub bands: u32,
    /// Gray level at or below which a pixel counts as pencil.
    pub dark_level: u8,
    /// A band is filled when it holds more dark pixels than this.
    pub min_dark_pixels: u32,
}

impl Default for IdDecoderParams {
    fn default() -> Self {
        Self {
            student_id_digits: 6,
            exam_id_digits: 3,
            bands: 10,
            dark_level: 60,
            min_dark_pixels: 50,
        }
    }
}

/// An identifier read from a bubble grid: one digit per column, `None` where
/// the column had no mark or more than one.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DecodedId {
    digits: Vec<Option<u8>>,
}

impl DecodedId {
    pub fn new(digits: Vec<Option<u8>>) -> Self {
        Self { digits }
    }

    /// An identifier of `width` undecodable columns.
    pub fn unknown(width: usize) -> Self {
        Self {
            digits: vec![None; width],
        }
    }

    pub fn digits(&self) -> &[Option<u8>] {
        &self.digits
    }

    pub fn is_complete(&self) -> bool {
        self.digits.iter().all(Option::is_some)
    }
}

impl Display for DecodedId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for digit in &self.digits {
            match digit {
                Some(d) => write!(f, "{}", d)?,
                None => write!(f, "?")?,
            }
        }
        Ok(())
    }
}

impl Serialize for DecodedId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

/// Band layout of one grid column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridLayout {
    pub column_width: u32,
    pub band_height: u32,
}

pub fn grid_layout(
    width: u32,
    height: u32,
    columns: usize,
    params: &IdDecoderParams,
) -> Result<GridLayout, RegionError> {
    if params.bands > 10 {
        return Err(RegionError::TooManyBands(params.bands));
    }
    let column_width = if columns == 0 { 0 } else { width / columns as u32 };
    let band_height = if params.bands == 0 { 0 } else { height / params.bands };
    if column_width == 0 || band_height == 0 {
        return Err(RegionError::GridTooSmall {
            width,
            height,
            columns,
            bands: params.bands,
        });
    }
    Ok(GridLayout {
        column_width,
        band_height,
    })
}

/// Decodes a `columns`-digit identifier from an upscaled ID grid crop.
///
/// Each column is cut into `params.bands` equal bands (digit 0 at the top).
/// A column yields a digit only when exactly one band is filled.
#[time]
pub fn decode_identifier(
    img: &RgbImage,
    columns: usize,
    params: &IdDecoderParams,
) -> Result<DecodedId, RegionError> {
    let layout = grid_layout(img.width(), img.height(), columns, params)?;
    let ink = inverse_threshold(&image::imageops::grayscale(img), params.dark_level);

    let digits = (0..columns as u32)
        .map(|column| {
            let filled = (0..params.bands)
                .filter(|band| {
                    let rect = Rect::at(
                        (column * layout.column_width) as i32,
                        (band * layout.band_height) as i32,
                    )
                    .of_size(layout.column_width, layout.band_height);
                    count_pixels_in_rect(&ink, &rect, &WHITE) > params.min_dark_pixels
                })
                .collect::<Vec<u32>>();

            match filled.as_slice() {
                [band] => u8::try_from(*band).ok(),
                _ => {
                    debug!("column {} has {} filled bands", column, filled.len());
                    None
                }
            }
        })
        .collect();

    Ok(DecodedId::new(digits))
}
