use std::io;
use std::path::{Path, PathBuf};

use image::RgbImage;
use log::{debug, info, warn};
use logging_timer::time;
use rayon::prelude::*;
use thiserror::Error;

use crate::answer_key::{AnswerKeyError, AnswerKeySource};
use crate::answers::{
    annotate_page_mut, score_answer_blocks, AnswerRecord, GradingSummary, ScoreError,
};
use crate::config::GradingConfig;
use crate::debug::{
    draw_answer_block_debug_image_mut, draw_id_grid_debug_image_mut, ImageDebugWriter,
};
use crate::detections::{Detection, DetectionError, RegionDetector};
use crate::id_decoder::{decode_identifier, grid_layout, DecodedId};
use crate::region::{RegionCrop, RegionError, RegionKind};

const SHEET_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

pub struct InterpretOptions {
    pub config: GradingConfig,
    pub keys: AnswerKeySource,
    pub detector: Box<dyn RegionDetector>,
    /// Where debug images go; `None` disables them.
    pub debug_dir: Option<PathBuf>,
}

#[derive(Debug, Error)]
pub enum InterpretSheetError {
    #[error("failed to open image {}", .path.display())]
    ImageOpen {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error(transparent)]
    Detection(#[from] DetectionError),

    #[error(transparent)]
    Region(#[from] RegionError),

    #[error(transparent)]
    Score(#[from] ScoreError),

    #[error(transparent)]
    AnswerKey(#[from] AnswerKeyError),
}

/// The graded crops of one page.
#[derive(Debug, Clone, Default)]
pub struct SheetRegions {
    pub student_id: Option<RegionCrop>,
    pub exam_id: Option<RegionCrop>,
    pub answer_blocks: Vec<RegionCrop>,
}

/// Everything read off one sheet.
#[derive(Debug, Clone)]
pub struct GradedSheet {
    pub source: PathBuf,
    pub student_id: DecodedId,
    pub exam_id: DecodedId,
    /// Answers of all blocks, in question order.
    pub records: Vec<AnswerRecord>,
    pub summary: GradingSummary,
    /// The page with key markers drawn on it.
    pub annotated: RgbImage,
}

fn keep_most_confident(slot: &mut Option<Detection>, detection: &Detection) {
    if slot.map_or(true, |kept| detection.confidence > kept.confidence) {
        *slot = Some(*detection);
    }
}

/// Cuts the detected regions out of `page`. Low-confidence detections,
/// markers and regions below `min_region_size` are dropped; of several ID
/// grids of one kind the most confident wins.
pub fn crop_regions(
    page: &RgbImage,
    detections: &[Detection],
    config: &GradingConfig,
) -> Result<SheetRegions, RegionError> {
    let mut student_id: Option<Detection> = None;
    let mut exam_id: Option<Detection> = None;
    let mut answer_blocks = vec![];

    for detection in detections {
        if detection.confidence < config.min_confidence {
            debug!("ignoring {:?} at {:.2} confidence", detection.label, detection.confidence);
            continue;
        }

        let clipped = detection.bbox.clip(page.width(), page.height());
        if detection.label != RegionKind::Marker
            && (clipped.width() < config.min_region_size
                || clipped.height() < config.min_region_size)
        {
            warn!("skipping {:?} region {:?}: too small", detection.label, detection.bbox);
            continue;
        }

        match detection.label {
            RegionKind::StudentIdGrid => keep_most_confident(&mut student_id, detection),
            RegionKind::ExamIdGrid => keep_most_confident(&mut exam_id, detection),
            RegionKind::AnswerBlock => answer_blocks.push(*detection),
            RegionKind::Marker => {}
        }
    }

    let crop = |detection: Detection| {
        RegionCrop::from_page(page, detection.label, detection.bbox, config.upscale_factor)
    };

    Ok(SheetRegions {
        student_id: student_id.map(crop).transpose()?,
        exam_id: exam_id.map(crop).transpose()?,
        answer_blocks: answer_blocks
            .into_iter()
            .map(|detection| {
                crop(detection).map(|block| block.without_gutter(config.answers.gutter_fraction))
            })
            .collect::<Result<_, _>>()?,
    })
}

/// Decodes an ID grid; a missing or unreadable grid yields an all-unknown id.
fn decode_grid(
    grid: Option<&RegionCrop>,
    digits: usize,
    config: &GradingConfig,
    debug: &ImageDebugWriter,
    label: &str,
) -> DecodedId {
    let grid = match grid {
        Some(grid) => grid,
        None => {
            warn!("no {} grid detected", label);
            return DecodedId::unknown(digits);
        }
    };

    match decode_identifier(&grid.image, digits, &config.ids) {
        Ok(id) => {
            debug.write(label, || {
                let mut canvas = grid.image.clone();
                if let Ok(layout) =
                    grid_layout(canvas.width(), canvas.height(), digits, &config.ids)
                {
                    draw_id_grid_debug_image_mut(&mut canvas, &layout, &id);
                }
                canvas
            });
            id
        }
        Err(e) => {
            warn!("unreadable {:?} grid: {}", grid.kind, e);
            DecodedId::unknown(digits)
        }
    }
}

/// Grades a single answer sheet image.
#[time]
pub fn grade_sheet(
    path: &Path,
    options: &InterpretOptions,
) -> Result<GradedSheet, InterpretSheetError> {
    let config = &options.config;
    let page = image::open(path)
        .map_err(|source| InterpretSheetError::ImageOpen {
            path: path.to_path_buf(),
            source,
        })?
        .into_rgb8();

    let detections = options.detector.detect(path, &page)?;
    let regions = crop_regions(&page, &detections, config)?;
    debug!(
        "{}: {} answer blocks, student id grid {}, exam id grid {}",
        path.display(),
        regions.answer_blocks.len(),
        if regions.student_id.is_some() { "found" } else { "missing" },
        if regions.exam_id.is_some() { "found" } else { "missing" },
    );

    let debug = match &options.debug_dir {
        Some(dir) => ImageDebugWriter::new(dir.clone(), path.to_path_buf()),
        None => ImageDebugWriter::disabled(),
    };

    let (student_id, exam_id) = rayon::join(
        || {
            decode_grid(
                regions.student_id.as_ref(),
                config.ids.student_id_digits,
                config,
                &debug,
                "studentId",
            )
        },
        || {
            decode_grid(
                regions.exam_id.as_ref(),
                config.ids.exam_id_digits,
                config,
                &debug,
                "examId",
            )
        },
    );

    let key = options.keys.key_for(&exam_id)?;
    let blocks = score_answer_blocks(&regions.answer_blocks, key.as_ref(), config)?;

    if debug.is_enabled() {
        for block in &blocks {
            debug.write(&format!("block{}", block.block_index), || {
                let mut canvas = regions.answer_blocks[block.crop_index].image.clone();
                draw_answer_block_debug_image_mut(&mut canvas, block);
                canvas
            });
        }
    }

    let records = blocks
        .into_iter()
        .flat_map(|block| block.records)
        .collect::<Vec<AnswerRecord>>();
    let summary = GradingSummary::from_records(&records, key.as_ref());

    let mut annotated = page;
    annotate_page_mut(&mut annotated, &records);

    match summary.score {
        Some(score) => info!(
            "{}: student {}, exam {}, score {} ({}/{})",
            path.display(),
            student_id,
            exam_id,
            score,
            summary.correct,
            summary.total
        ),
        None => info!(
            "{}: student {}, exam {}, {} answers read, no key",
            path.display(),
            student_id,
            exam_id,
            records.len()
        ),
    }

    Ok(GradedSheet {
        source: path.to_path_buf(),
        student_id,
        exam_id,
        records,
        summary,
        annotated,
    })
}

/// Grades every sheet in parallel and hands each graded sheet to `finish`.
/// Results come back in the order of `paths`.
pub fn grade_sheets<T, F>(
    paths: &[PathBuf],
    options: &InterpretOptions,
    finish: F,
) -> Vec<(PathBuf, Result<T, InterpretSheetError>)>
where
    T: Send,
    F: Fn(GradedSheet) -> T + Sync,
{
    paths
        .par_iter()
        .map(|path| {
            let result = grade_sheet(path, options).map(&finish);
            if let Err(e) = &result {
                warn!("{}: {}", path.display(), e);
            }
            (path.clone(), result)
        })
        .collect()
}

fn is_sheet_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map_or(false, |ext| {
            SHEET_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
}

/// Expands directories into the sheet images they hold, sorted by name.
/// Files are passed through as given.
pub fn collect_sheet_paths(inputs: &[PathBuf]) -> io::Result<Vec<PathBuf>> {
    let mut paths = vec![];
    for input in inputs {
        if input.is_dir() {
            let mut entries = std::fs::read_dir(input)?
                .map(|entry| entry.map(|entry| entry.path()))
                .collect::<io::Result<Vec<PathBuf>>>()?;
            entries.retain(|path| path.is_file() && is_sheet_image(path));
            entries.sort();
            paths.extend(entries);
        } else {
            paths.push(input.clone());
        }
    }
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::answer_key::AnswerKey;
    use crate::detections::SidecarDetections;
    use crate::image_utils::GREEN;
    use crate::region::BoundingBox;
    use crate::test_utils::{answer_block, blank, PENCIL};
    use imageproc::drawing::draw_filled_rect_mut;
    use imageproc::rect::Rect;

    const DETECTIONS: &str = r#"[
        {"label": "StudentID", "confidence": 0.9, "box": [20, 20, 380, 320]},
        {"label": "ExamID", "confidence": 0.8, "box": [420, 20, 600, 320]},
        {"label": "ExamID", "confidence": 0.2, "box": [0, 0, 50, 50]},
        {"label": "AnswerArea", "confidence": 0.95, "box": [20, 350, 383, 710]},
        {"label": "Marker", "confidence": 0.99, "box": [900, 10, 950, 60]}
    ]"#;

    fn id_grid(digits: &[u32]) -> RgbImage {
        let mut img = blank(digits.len() as u32 * 60, 300);
        for (column, digit) in digits.iter().enumerate() {
            draw_filled_rect_mut(
                &mut img,
                Rect::at(column as i32 * 60 + 20, *digit as i32 * 30 + 5).of_size(20, 20),
                PENCIL,
            );
        }
        img
    }

    /// A page at analysis scale: a 6 digit student grid, a 3 digit exam grid
    /// and one answer block behind a 73 px question-number gutter.
    fn page(marks: &[Option<usize>]) -> RgbImage {
        let mut page = blank(1000, 760);
        image::imageops::replace(&mut page, &id_grid(&[1, 2, 3, 4, 5, 6]), 20, 20);
        image::imageops::replace(&mut page, &id_grid(&[1, 0, 1]), 420, 20);
        image::imageops::replace(&mut page, &answer_block(marks), 93, 350);
        page
    }

    fn unscaled() -> GradingConfig {
        GradingConfig {
            upscale_factor: 1.0,
            ..GradingConfig::default()
        }
    }

    fn write_sheet(dir: &Path, name: &str, img: &RgbImage, detections: &str) -> PathBuf {
        let path = dir.join(format!("{}.png", name));
        img.save(&path).unwrap();
        std::fs::write(dir.join(format!("{}.detections.json", name)), detections).unwrap();
        path
    }

    fn detection(label: RegionKind, confidence: f32, bbox: BoundingBox) -> Detection {
        Detection {
            label,
            confidence,
            bbox,
        }
    }

    #[test]
    fn crop_regions_filters_and_picks_most_confident_grid() {
        let page = blank(400, 400);
        let detections = [
            detection(RegionKind::ExamIdGrid, 0.5, BoundingBox::new(0, 0, 90, 100)),
            detection(RegionKind::ExamIdGrid, 0.9, BoundingBox::new(100, 0, 190, 100)),
            detection(RegionKind::StudentIdGrid, 0.1, BoundingBox::new(0, 200, 180, 300)),
            detection(RegionKind::AnswerBlock, 0.8, BoundingBox::new(200, 200, 205, 300)),
            detection(RegionKind::AnswerBlock, 0.8, BoundingBox::new(200, 100, 300, 200)),
            detection(RegionKind::Marker, 1.0, BoundingBox::new(390, 390, 400, 400)),
        ];

        let regions = crop_regions(&page, &detections, &GradingConfig::default()).unwrap();
        let exam_id = regions.exam_id.unwrap();
        assert_eq!(exam_id.bbox, BoundingBox::new(100, 0, 190, 100));
        assert_eq!(exam_id.image.dimensions(), (270, 300));
        assert!(regions.student_id.is_none());

        assert_eq!(regions.answer_blocks.len(), 1);
        let block = &regions.answer_blocks[0];
        assert_eq!(block.x_offset, 60);
        assert_eq!(block.image.dimensions(), (240, 300));
    }

    #[test]
    fn grades_a_sheet_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let keys = dir.path().join("keys");
        std::fs::create_dir(&keys).unwrap();
        std::fs::write(keys.join("result101.json"), r#"["A", "B", "C", "D", "A"]"#).unwrap();

        let marks = [Some(0), Some(1), Some(2), Some(3), Some(1)];
        let path = write_sheet(dir.path(), "sheet", &page(&marks), DETECTIONS);
        let debug_dir = dir.path().join("debug");
        std::fs::create_dir(&debug_dir).unwrap();

        let options = InterpretOptions {
            config: unscaled(),
            keys: AnswerKeySource::Directory(keys),
            detector: Box::new(SidecarDetections::new(None)),
            debug_dir: Some(debug_dir.clone()),
        };
        let sheet = grade_sheet(&path, &options).unwrap();

        assert_eq!(sheet.student_id.to_string(), "123456");
        assert_eq!(sheet.exam_id.to_string(), "101");
        assert_eq!(sheet.records.len(), 5);
        assert_eq!(sheet.summary, GradingSummary::new(4, 5));
        assert_eq!(sheet.summary.score, Some(8.0));

        let marker = sheet.records[0].marker.unwrap();
        let edge = sheet.annotated.get_pixel(
            (marker.page_center.x + marker.page_radius) as u32,
            marker.page_center.y as u32,
        );
        assert_eq!(*edge, GREEN);

        for label in ["studentId", "examId", "block0"] {
            assert!(debug_dir.join(format!("sheet_debug_{}.png", label)).is_file());
        }
    }

    #[test]
    fn missing_grid_reads_as_unknown() {
        let dir = tempfile::tempdir().unwrap();
        let detections =
            r#"[{"label": "AnswerArea", "confidence": 0.95, "box": [20, 350, 383, 710]}]"#;
        let path = write_sheet(dir.path(), "sheet", &page(&[Some(2); 5]), detections);

        let options = InterpretOptions {
            config: unscaled(),
            keys: AnswerKeySource::Fixed(AnswerKey::from_letters(["C"; 6])),
            detector: Box::new(SidecarDetections::new(None)),
            debug_dir: None,
        };
        let sheet = grade_sheet(&path, &options).unwrap();
        assert_eq!(sheet.student_id.to_string(), "??????");
        assert_eq!(sheet.exam_id.to_string(), "???");
        assert_eq!(sheet.summary, GradingSummary::new(5, 6));
    }

    #[test]
    fn failing_sheets_do_not_stop_the_batch() {
        let dir = tempfile::tempdir().unwrap();
        let good = write_sheet(dir.path(), "good", &page(&[None; 5]), DETECTIONS);
        let no_sidecar = dir.path().join("lonely.png");
        blank(10, 10).save(&no_sidecar).unwrap();
        let not_an_image = dir.path().join("broken.png");
        std::fs::write(&not_an_image, "not a png").unwrap();

        let options = InterpretOptions {
            config: unscaled(),
            keys: AnswerKeySource::None,
            detector: Box::new(SidecarDetections::new(None)),
            debug_dir: None,
        };
        let paths = vec![good.clone(), no_sidecar.clone(), not_an_image.clone()];
        let results = grade_sheets(&paths, &options, |sheet| sheet.records.len());

        assert_eq!(
            results.iter().map(|(path, _)| path.clone()).collect::<Vec<_>>(),
            paths
        );
        assert_eq!(results[0].1.as_ref().unwrap(), &5);
        assert!(matches!(results[1].1, Err(InterpretSheetError::Detection(_))));
        assert!(matches!(results[2].1, Err(InterpretSheetError::ImageOpen { .. })));
    }

    #[test]
    fn collects_images_from_directories() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.png", "a.JPG", "c.jpeg", "notes.txt"] {
            std::fs::write(dir.path().join(name), "").unwrap();
        }
        let extra = PathBuf::from("elsewhere/sheet.png");

        let paths = collect_sheet_paths(&[dir.path().to_path_buf(), extra.clone()]).unwrap();
        assert_eq!(
            paths,
            vec![
                dir.path().join("a.JPG"),
                dir.path().join("b.png"),
                dir.path().join("c.jpeg"),
                extra
            ]
        );
    }
}
