use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::answers::AnswerScorerParams;
use crate::bubbles::BubbleDetectorParams;
use crate::fill::FillParams;
use crate::id_decoder::IdDecoderParams;

/// Every tunable of the grading pipeline. Missing fields in a config file
/// take their default.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GradingConfig {
    /// Factor region crops are upscaled by before analysis.
    pub upscale_factor: f32,
    /// Detections below this confidence are ignored.
    pub min_confidence: f32,
    /// Regions narrower or shorter than this, in page pixels, are skipped.
    pub min_region_size: u32,
    pub bubbles: BubbleDetectorParams,
    pub fill: FillParams,
    pub ids: IdDecoderParams,
    pub answers: AnswerScorerParams,
}

impl Default for GradingConfig {
    fn default() -> Self {
        Self {
            upscale_factor: 3.0,
            min_confidence: 0.3,
            min_region_size: 10,
            bubbles: BubbleDetectorParams::default(),
            fill: FillParams::default(),
            ids: IdDecoderParams::default(),
            answers: AnswerScorerParams::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config {}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

pub fn load_config(path: &Path) -> Result<GradingConfig, ConfigError> {
    let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&json).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::answers::{BlockOrder, ShortfallPolicy};
    use crate::rows::RowStrategy;

    #[test]
    fn empty_object_is_the_default() {
        let config: GradingConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, GradingConfig::default());
    }

    #[test]
    fn partial_config_overrides_only_given_fields() {
        let config: GradingConfig = serde_json::from_str(
            r#"{
                "upscaleFactor": 2.0,
                "fill": { "maxValue": 70 },
                "answers": {
                    "rowStrategy": { "type": "fixedGrid" },
                    "blockOrder": { "type": "topToBottom" },
                    "shortfall": "abort"
                }
            }"#,
        )
        .unwrap();

        assert_eq!(config.upscale_factor, 2.0);
        assert_eq!(config.min_confidence, 0.3);
        assert_eq!(config.fill.max_value, 70);
        assert_eq!(config.fill.median_radius, 2);
        assert_eq!(config.answers.row_strategy, RowStrategy::FixedGrid);
        assert_eq!(config.answers.block_order, BlockOrder::TopToBottom);
        assert_eq!(config.answers.shortfall, ShortfallPolicy::Abort);
        assert_eq!(config.answers.questions_per_block, 5);
        assert_eq!(config.ids, IdDecoderParams::default());
    }

    #[test]
    fn load_config_reports_path_on_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = load_config(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("config.json"));

        std::fs::write(&path, r#"{"minRegionSize": 20}"#).unwrap();
        assert_eq!(load_config(&path).unwrap().min_region_size, 20);
    }
}
