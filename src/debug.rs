use std::path::{Path, PathBuf};

use image::RgbImage;
use imageproc::{
    drawing::{
        draw_cross_mut, draw_hollow_circle_mut, draw_hollow_rect_mut, draw_line_segment_mut,
    },
    rect::Rect,
};
use log::{debug, warn};

use crate::{
    answers::{annotate_block_mut, BlockAnswers},
    id_decoder::{DecodedId, GridLayout},
    image_utils::{BLUE, DARK_GREEN, PINK, RAINBOW, WHITE_RGB},
};

/// Creates a path for a debug image of `source` inside `output_dir`.
pub fn debug_image_path(output_dir: &Path, source: &Path, label: &str) -> PathBuf {
    output_dir.join(format!(
        "{}_debug_{}.png",
        source.file_stem().unwrap_or_default().to_string_lossy(),
        label
    ))
}

/// Writes debug images for one sheet, or nothing when disabled.
#[derive(Debug, Clone, Default)]
pub struct ImageDebugWriter {
    target: Option<(PathBuf, PathBuf)>,
}

impl ImageDebugWriter {
    pub fn new(output_dir: PathBuf, source: PathBuf) -> Self {
        Self {
            target: Some((output_dir, source)),
        }
    }

    pub fn disabled() -> Self {
        Self { target: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.target.is_some()
    }

    /// Renders and saves an image with `draw`, which only runs when enabled.
    /// Save failures are logged, never returned.
    pub fn write(&self, label: &str, draw: impl FnOnce() -> RgbImage) -> Option<PathBuf> {
        let (output_dir, source) = self.target.as_ref()?;
        let path = debug_image_path(output_dir, source, label);
        match draw().save(&path) {
            Ok(()) => {
                debug!("wrote debug image {}", path.display());
                Some(path)
            }
            Err(e) => {
                warn!("failed to write debug image {}: {}", path.display(), e);
                None
            }
        }
    }
}

/// Draws a debug image of the bubbles found in an answer block, one color per
/// row, with the key markers on top.
pub fn draw_answer_block_debug_image_mut(canvas: &mut RgbImage, answers: &BlockAnswers) {
    for (i, row) in answers.rows.iter().enumerate() {
        let color = RAINBOW[i % RAINBOW.len()];
        for candidate in &row.candidates {
            draw_hollow_circle_mut(
                canvas,
                (candidate.center.x, candidate.center.y),
                candidate.radius.round() as i32,
                color,
            );
            draw_cross_mut(canvas, color, candidate.center.x, candidate.center.y);
        }
    }

    annotate_block_mut(canvas, &answers.records);
}

/// Draws a debug image of the column and band layout of an ID grid, boxing the
/// band each decoded digit was read from.
pub fn draw_id_grid_debug_image_mut(canvas: &mut RgbImage, layout: &GridLayout, id: &DecodedId) {
    let (width, height) = canvas.dimensions();

    for x in (0..width).step_by(layout.column_width as usize) {
        draw_line_segment_mut(canvas, (x as f32, 0.0), (x as f32, height as f32), BLUE);
    }
    for y in (0..height).step_by(layout.band_height as usize) {
        draw_line_segment_mut(canvas, (0.0, y as f32), (width as f32, y as f32), PINK);
    }

    for (column, digit) in id.digits().iter().enumerate() {
        let left = column as u32 * layout.column_width;
        match digit {
            Some(band) => draw_hollow_rect_mut(
                canvas,
                Rect::at(left as i32, (*band as u32 * layout.band_height) as i32)
                    .of_size(layout.column_width, layout.band_height),
                DARK_GREEN,
            ),
            None => draw_cross_mut(
                canvas,
                WHITE_RGB,
                (left + layout.column_width / 2) as i32,
                (height / 2) as i32,
            ),
        }
    }
}
