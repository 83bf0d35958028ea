use std::io;
use std::path::{Path, PathBuf};

use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use log::info;
use rusttype::{Font, Scale};
use serde::Serialize;
use thiserror::Error;

use crate::image_utils::{ORANGE, RED, WHITE_RGB};
use crate::interpret::GradedSheet;
use crate::types::letter_or_unknown;

const HEADER_SCALE: f32 = 36.0;
const HEADER_LEFT: i32 = 10;
const HEADER_TOPS: [i32; 3] = [30, 80, 130];

/// One row of the grade table.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeRecord {
    pub file: String,
    pub student_id: String,
    pub exam_id: String,
    pub score: Option<f64>,
    pub correct: usize,
    pub total: usize,
    /// Predicted letter per question, `?` where nothing was read.
    pub answers: String,
}

impl From<&GradedSheet> for GradeRecord {
    fn from(sheet: &GradedSheet) -> Self {
        Self {
            file: sheet
                .source
                .file_name()
                .unwrap_or_default()
                .to_string_lossy()
                .into_owned(),
            student_id: sheet.student_id.to_string(),
            exam_id: sheet.exam_id.to_string(),
            score: sheet.summary.score,
            correct: sheet.summary.correct,
            total: sheet.summary.total,
            answers: sheet
                .records
                .iter()
                .map(|record| letter_or_unknown(record.predicted))
                .collect(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to read font {}", .path.display())]
    FontIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{} is not a usable TrueType font", .path.display())]
    InvalidFont { path: PathBuf },

    #[error("failed to save {}", .path.display())]
    SaveImage {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("failed to write {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to serialize grade records")]
    Serialize(#[from] serde_json::Error),
}

pub fn load_font(path: &Path) -> Result<Font<'static>, ReportError> {
    let bytes = std::fs::read(path).map_err(|source| ReportError::FontIo {
        path: path.to_path_buf(),
        source,
    })?;
    Font::try_from_vec(bytes).ok_or_else(|| ReportError::InvalidFont {
        path: path.to_path_buf(),
    })
}

/// `<output_dir>/<stem>_full.png`
pub fn result_image_path(output_dir: &Path, source: &Path) -> PathBuf {
    output_dir.join(format!(
        "{}_full.png",
        source.file_stem().unwrap_or_default().to_string_lossy()
    ))
}

/// Text lines printed at the top of a result image.
pub fn header_lines(sheet: &GradedSheet) -> [(String, Rgb<u8>); 3] {
    let score = match sheet.summary.score {
        Some(score) => format!(
            "SCORE: {} ({}/{})",
            score, sheet.summary.correct, sheet.summary.total
        ),
        None => "SCORE: -".to_string(),
    };
    [
        (format!("STUDENT ID: {}", sheet.student_id), RED),
        (format!("EXAM ID: {}", sheet.exam_id), RED),
        (score, ORANGE),
    ]
}

fn draw_text_with_background_mut(
    canvas: &mut RgbImage,
    text: &str,
    x: i32,
    y: i32,
    scale: Scale,
    font: &Font,
    text_color: Rgb<u8>,
    background_color: Rgb<u8>,
) {
    let (text_width, text_height) = text_size(scale, font, text);
    if text_width > 0 && text_height > 0 {
        draw_filled_rect_mut(
            canvas,
            Rect::at(x, y).of_size(text_width as u32, text_height as u32),
            background_color,
        );
    }
    draw_text_mut(canvas, text_color, x, y, scale, font, text);
}

/// Saves the annotated page, with the header text when a font is given.
pub fn save_result_image(
    sheet: &GradedSheet,
    output_dir: &Path,
    font: Option<&Font>,
) -> Result<PathBuf, ReportError> {
    let path = result_image_path(output_dir, &sheet.source);

    let result = match font {
        Some(font) => {
            let mut canvas = sheet.annotated.clone();
            let scale = Scale::uniform(HEADER_SCALE);
            for ((text, color), top) in header_lines(sheet).iter().zip(HEADER_TOPS) {
                draw_text_with_background_mut(
                    &mut canvas,
                    text,
                    HEADER_LEFT,
                    top,
                    scale,
                    font,
                    *color,
                    WHITE_RGB,
                );
            }
            canvas.save(&path)
        }
        None => sheet.annotated.save(&path),
    };

    result.map_err(|source| ReportError::SaveImage {
        path: path.clone(),
        source,
    })?;
    info!("wrote {}", path.display());
    Ok(path)
}

/// Writes the grade table as a JSON array.
pub fn export_grade_records(records: &[GradeRecord], path: &Path) -> Result<(), ReportError> {
    let json = serde_json::to_string_pretty(records)?;
    std::fs::write(path, json).map_err(|source| ReportError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    info!("wrote {} grade records to {}", records.len(), path.display());
    Ok(())
}
