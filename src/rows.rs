use log::trace;
use serde::{Deserialize, Serialize};

use crate::bubbles::BubbleCandidate;

/// How bubble candidates of a block are grouped into rows.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum RowStrategy {
    /// Starts a new row wherever consecutive candidates are more than
    /// `max_gap` pixels apart vertically. Tolerates missing bubbles.
    #[serde(rename_all = "camelCase")]
    Gap { max_gap: i32 },

    /// Splits the vertical span of the candidates into the expected number of
    /// equal bands. Needs a complete, well-scanned block, but keeps row
    /// indices stable when a whole row goes undetected in the middle.
    FixedGrid,
}

impl Default for RowStrategy {
    fn default() -> Self {
        RowStrategy::Gap { max_gap: 25 }
    }
}

impl RowStrategy {
    pub fn split_rows(&self, candidates: &[BubbleCandidate], expected_rows: usize) -> Vec<RowGroup> {
        match *self {
            RowStrategy::Gap { max_gap } => split_rows_by_gap(candidates, max_gap),
            RowStrategy::FixedGrid => split_rows_by_grid(candidates, expected_rows),
        }
    }
}

/// Candidates judged to lie on the same row, left to right.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowGroup {
    pub candidates: Vec<BubbleCandidate>,
}

impl RowGroup {
    fn from_unsorted(mut candidates: Vec<BubbleCandidate>) -> Self {
        candidates.sort_by_key(|c| (c.center.x, c.center.y));
        Self { candidates }
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }
}

pub fn split_rows_by_gap(candidates: &[BubbleCandidate], max_gap: i32) -> Vec<RowGroup> {
    let mut sorted = candidates.to_vec();
    sorted.sort_by_key(|c| (c.center.y, c.center.x));

    let mut rows: Vec<Vec<BubbleCandidate>> = vec![];
    let mut previous_y: Option<i32> = None;
    for candidate in sorted {
        let y = candidate.center.y;
        match (previous_y, rows.last_mut()) {
            (Some(prev), Some(row)) if (y - prev).abs() <= max_gap => row.push(candidate),
            _ => rows.push(vec![candidate]),
        }
        previous_y = Some(y);
    }

    trace!("gap clustering produced {} rows", rows.len());
    rows.into_iter().map(RowGroup::from_unsorted).collect()
}

pub fn split_rows_by_grid(candidates: &[BubbleCandidate], rows: usize) -> Vec<RowGroup> {
    if candidates.is_empty() || rows == 0 {
        return vec![];
    }

    let min_y = candidates.iter().map(|c| c.center.y).min().unwrap_or(0);
    let max_y = candidates.iter().map(|c| c.center.y).max().unwrap_or(0);
    let row_height = (max_y - min_y + 1) as f32 / rows as f32;

    let mut bands: Vec<Vec<BubbleCandidate>> = vec![vec![]; rows];
    for candidate in candidates {
        let band = (((candidate.center.y - min_y) as f32 / row_height) as usize).min(rows - 1);
        bands[band].push(candidate.clone());
    }

    bands.into_iter().map(RowGroup::from_unsorted).collect()
}
