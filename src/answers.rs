use image::{Rgb, RgbImage};
use imageproc::drawing::draw_hollow_circle_mut;
use imageproc::point::Point;
use log::{debug, warn};
use logging_timer::time;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::answer_key::AnswerKey;
use crate::bubbles::detect_bubbles;
use crate::config::GradingConfig;
use crate::fill::{fill_mask, match_option, select_filled};
use crate::geometry::bounding_circle_radius;
use crate::image_utils::{GREEN, RED};
use crate::region::{BoundingBox, RegionCrop};
use crate::rows::{RowGroup, RowStrategy};
use crate::types::OptionLetter;

const OPTIONS_PER_QUESTION: usize = OptionLetter::ALL.len();

/// What to do with a row that has fewer than four detected bubbles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ShortfallPolicy {
    /// Leave the question without a record; it counts as wrong when a key is
    /// given.
    #[default]
    Skip,
    /// Fail the whole sheet.
    Abort,
}

/// Order in which answer blocks are read, which fixes question numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum BlockOrder {
    /// By top edge, then left edge.
    TopToBottom,
    /// Blocks whose left edges are within `tolerance` pixels form a column;
    /// columns are read left to right, each top to bottom.
    #[serde(rename_all = "camelCase")]
    Columns { tolerance: i32 },
}

impl Default for BlockOrder {
    fn default() -> Self {
        BlockOrder::Columns { tolerance: 50 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnswerScorerParams {
    pub questions_per_block: usize,
    /// Share of the block width, on the left, holding question numbers.
    pub gutter_fraction: f32,
    pub row_strategy: RowStrategy,
    pub block_order: BlockOrder,
    pub shortfall: ShortfallPolicy,
}

impl Default for AnswerScorerParams {
    fn default() -> Self {
        Self {
            questions_per_block: 5,
            gutter_fraction: 0.2,
            row_strategy: RowStrategy::default(),
            block_order: BlockOrder::default(),
            shortfall: ShortfallPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScoreError {
    #[error("question {question}: found {found} of 4 answer bubbles")]
    RowShortfall { question: usize, found: usize },
}

/// A circle around the key answer of a question, green when the respondent
/// chose it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Marker {
    pub correct: bool,
    pub block_center: Point<i32>,
    pub block_radius: i32,
    pub page_center: Point<i32>,
    pub page_radius: i32,
}

impl Marker {
    pub fn color(&self) -> Rgb<u8> {
        if self.correct {
            GREEN
        } else {
            RED
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerRecord {
    pub question: usize,
    pub predicted: Option<OptionLetter>,
    /// Whether `predicted` matches the key; `None` without a key entry.
    pub correct: Option<bool>,
    #[serde(skip)]
    pub marker: Option<Marker>,
}

/// Everything read from one answer block.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockAnswers {
    /// Position of the block in the slice given to [`score_answer_blocks`].
    pub crop_index: usize,
    /// Position of the block in reading order.
    pub block_index: usize,
    pub rows: Vec<RowGroup>,
    pub records: Vec<AnswerRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradingSummary {
    pub correct: usize,
    pub total: usize,
    /// `correct / total` on a 10 point scale, two decimals; `None` without a
    /// key.
    pub score: Option<f64>,
}

impl GradingSummary {
    pub fn new(correct: usize, total: usize) -> Self {
        let score = if total > 0 {
            Some((correct as f64 / total as f64 * 10.0 * 100.0).round() / 100.0)
        } else {
            None
        };
        Self {
            correct,
            total,
            score,
        }
    }

    /// Counts matching records; the total is the key length.
    pub fn from_records<'a>(
        records: impl IntoIterator<Item = &'a AnswerRecord>,
        key: Option<&AnswerKey>,
    ) -> Self {
        let correct = records
            .into_iter()
            .filter(|record| record.correct == Some(true))
            .count();
        Self::new(correct, key.map_or(0, AnswerKey::len))
    }
}

/// Indices of `boxes` in reading order.
pub fn block_reading_order(boxes: &[BoundingBox], order: BlockOrder) -> Vec<usize> {
    let mut indices = (0..boxes.len()).collect::<Vec<usize>>();
    match order {
        BlockOrder::TopToBottom => {
            indices.sort_by_key(|&i| (boxes[i].y1, boxes[i].x1));
            indices
        }
        BlockOrder::Columns { tolerance } => {
            indices.sort_by_key(|&i| (boxes[i].x1, boxes[i].y1));

            let mut columns: Vec<(i32, Vec<usize>)> = vec![];
            for i in indices {
                match columns.last_mut() {
                    Some((left, column)) if boxes[i].x1 - *left <= tolerance => column.push(i),
                    _ => columns.push((boxes[i].x1, vec![i])),
                }
            }

            columns
                .into_iter()
                .flat_map(|(_, mut column)| {
                    column.sort_by_key(|&i| (boxes[i].y1, boxes[i].x1));
                    column
                })
                .collect()
        }
    }
}

/// Reads one answer block: detect bubbles, group them into rows, pick the
/// filled bubble of each row and compare it with the key.
#[time]
pub fn score_block(
    block: &RegionCrop,
    block_index: usize,
    key: Option<&AnswerKey>,
    config: &GradingConfig,
) -> Result<BlockAnswers, ScoreError> {
    let candidates = detect_bubbles(&block.image, &config.bubbles);
    let rows = config
        .answers
        .row_strategy
        .split_rows(&candidates, config.answers.questions_per_block);
    let records = score_rows(block, block_index, &rows, key, config)?;
    Ok(BlockAnswers {
        crop_index: block_index,
        block_index,
        rows,
        records,
    })
}

fn score_rows(
    block: &RegionCrop,
    block_index: usize,
    rows: &[RowGroup],
    key: Option<&AnswerKey>,
    config: &GradingConfig,
) -> Result<Vec<AnswerRecord>, ScoreError> {
    let params = &config.answers;
    let mask = fill_mask(&block.image, &config.fill);
    let mut records = vec![];

    if rows.len() > params.questions_per_block {
        warn!(
            "block {} has {} rows, only the first {} are graded",
            block_index,
            rows.len(),
            params.questions_per_block
        );
    }

    for (row_index, row) in rows.iter().take(params.questions_per_block).enumerate() {
        let question = block_index * params.questions_per_block + row_index + 1;

        if row.len() < OPTIONS_PER_QUESTION {
            match params.shortfall {
                ShortfallPolicy::Skip => {
                    warn!(
                        "question {}: skipped, found {} of {} bubbles",
                        question,
                        row.len(),
                        OPTIONS_PER_QUESTION
                    );
                    continue;
                }
                ShortfallPolicy::Abort => {
                    return Err(ScoreError::RowShortfall {
                        question,
                        found: row.len(),
                    })
                }
            }
        }
        if row.len() > OPTIONS_PER_QUESTION {
            debug!(
                "question {}: {} bubbles, using the leftmost {}",
                question,
                row.len(),
                OPTIONS_PER_QUESTION
            );
        }

        let options = &row.candidates[..OPTIONS_PER_QUESTION];
        let predicted = select_filled(&mask, &row.candidates, &config.fill)
            .and_then(|decision| {
                match_option(&decision.center, options, config.fill.match_tolerance)
            })
            .and_then(OptionLetter::from_index);

        let (correct, marker) = match key.and_then(|key| key.expected(question)) {
            Some(expected) => {
                let correct = predicted == Some(expected);
                let option = &options[expected.index()];
                let block_radius = bounding_circle_radius(&option.contour);
                let (x, y, page_radius) =
                    block.to_original(option.center.x, option.center.y, block_radius);
                let marker = Marker {
                    correct,
                    block_center: option.center,
                    block_radius,
                    page_center: Point::new(x, y),
                    page_radius,
                };
                (Some(correct), Some(marker))
            }
            None => (None, None),
        };

        records.push(AnswerRecord {
            question,
            predicted,
            correct,
            marker,
        });
    }

    Ok(records)
}

/// Scores every answer block of a sheet. Blocks are scored in parallel and
/// returned in reading order.
#[time]
pub fn score_answer_blocks(
    blocks: &[RegionCrop],
    key: Option<&AnswerKey>,
    config: &GradingConfig,
) -> Result<Vec<BlockAnswers>, ScoreError> {
    let boxes = blocks.iter().map(|block| block.bbox).collect::<Vec<_>>();
    let order = block_reading_order(&boxes, config.answers.block_order);

    order
        .par_iter()
        .enumerate()
        .map(|(block_index, &crop_index)| {
            score_block(&blocks[crop_index], block_index, key, config).map(|answers| {
                BlockAnswers {
                    crop_index,
                    ..answers
                }
            })
        })
        .collect()
}

fn draw_marker_mut(canvas: &mut RgbImage, center: Point<i32>, radius: i32, color: Rgb<u8>) {
    let radius = radius.max(1);
    draw_hollow_circle_mut(canvas, (center.x, center.y), radius, color);
    if radius > 1 {
        draw_hollow_circle_mut(canvas, (center.x, center.y), radius - 1, color);
    }
}

/// Circles the key answers on the full page.
pub fn annotate_page_mut<'a>(
    canvas: &mut RgbImage,
    records: impl IntoIterator<Item = &'a AnswerRecord>,
) {
    for marker in records.into_iter().filter_map(|record| record.marker.as_ref()) {
        draw_marker_mut(canvas, marker.page_center, marker.page_radius, marker.color());
    }
}

/// Circles the key answers on an answer block crop.
pub fn annotate_block_mut<'a>(
    canvas: &mut RgbImage,
    records: impl IntoIterator<Item = &'a AnswerRecord>,
) {
    for marker in records.into_iter().filter_map(|record| record.marker.as_ref()) {
        draw_marker_mut(canvas, marker.block_center, marker.block_radius, marker.color());
    }
}
