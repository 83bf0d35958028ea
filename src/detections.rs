use std::io;
use std::path::{Path, PathBuf};

use image::RgbImage;
use log::debug;
use serde::Deserialize;
use thiserror::Error;

use crate::region::{BoundingBox, RegionKind};

/// A region located on a page by the object detector.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Detection {
    pub label: RegionKind,
    #[serde(default = "full_confidence")]
    pub confidence: f32,
    #[serde(rename = "box")]
    pub bbox: BoundingBox,
}

fn full_confidence() -> f32 {
    1.0
}

#[derive(Debug, Error)]
pub enum DetectionError {
    #[error("failed to read detections from {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse detections in {}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Locates the graded blocks (ID grids, answer areas) on a page image.
pub trait RegionDetector: Sync {
    fn detect(&self, image_path: &Path, page: &RgbImage) -> Result<Vec<Detection>, DetectionError>;
}

/// Reads detector output stored next to each image as
/// `<stem>.detections.json`, a JSON array of
/// `{"label": "AnswerArea", "confidence": 0.93, "box": [x1, y1, x2, y2]}`.
#[derive(Debug, Clone, Default)]
pub struct SidecarDetections {
    dir: Option<PathBuf>,
}

impl SidecarDetections {
    /// Looks in `dir` when given, otherwise in each image's own directory.
    pub fn new(dir: Option<PathBuf>) -> Self {
        Self { dir }
    }

    pub fn sidecar_path(&self, image_path: &Path) -> PathBuf {
        let stem = image_path
            .file_stem()
            .unwrap_or_default()
            .to_string_lossy()
            .into_owned();
        let file_name = format!("{}.detections.json", stem);
        match &self.dir {
            Some(dir) => dir.join(file_name),
            None => image_path.with_file_name(file_name),
        }
    }
}

impl RegionDetector for SidecarDetections {
    fn detect(&self, image_path: &Path, _page: &RgbImage) -> Result<Vec<Detection>, DetectionError> {
        let path = self.sidecar_path(image_path);
        let json = std::fs::read_to_string(&path).map_err(|source| DetectionError::Io {
            path: path.clone(),
            source,
        })?;
        let detections: Vec<Detection> =
            serde_json::from_str(&json).map_err(|source| DetectionError::Parse {
                path: path.clone(),
                source,
            })?;
        debug!("{} detections read from {}", detections.len(), path.display());
        Ok(detections)
    }
}
