extern crate log;
extern crate pretty_env_logger;

use std::path::PathBuf;
use std::process::exit;

use clap::{arg, command, value_parser, Command};

use crate::answer_key::{load_answer_key, AnswerKeySource};
use crate::config::{load_config, GradingConfig};
use crate::detections::SidecarDetections;
use crate::interpret::{collect_sheet_paths, grade_sheets, InterpretOptions};
use crate::report::{export_grade_records, load_font, save_result_image, GradeRecord};

mod answer_key;
mod answers;
mod bubbles;
mod config;
mod debug;
mod detections;
mod fill;
mod geometry;
mod id_decoder;
mod image_utils;
mod interpret;
mod region;
mod report;
mod rows;
#[cfg(test)]
mod test_utils;
mod types;

fn main() {
    pretty_env_logger::init_custom_env("LOG");

    let matches = cli().get_matches();
    let debug = matches.get_flag("debug");
    let output_dir = matches
        .get_one::<PathBuf>("output")
        .cloned()
        .unwrap_or_else(|| PathBuf::from("output"));
    let inputs = matches
        .get_many::<PathBuf>("inputs")
        .map(|inputs| inputs.cloned().collect::<Vec<_>>())
        .unwrap_or_default();

    let config = match matches.get_one::<PathBuf>("config") {
        Some(path) => load_config(path).unwrap_or_else(|e| {
            eprintln!("Error loading config: {}", e);
            exit(1);
        }),
        None => GradingConfig::default(),
    };

    let keys = match (
        matches.get_one::<PathBuf>("key"),
        matches.get_one::<PathBuf>("key_dir"),
    ) {
        (Some(path), _) => match load_answer_key(path) {
            Ok(key) => AnswerKeySource::Fixed(key),
            Err(e) => {
                eprintln!("Error loading answer key: {}", e);
                exit(1);
            }
        },
        (None, Some(dir)) => AnswerKeySource::Directory(dir.clone()),
        (None, None) => AnswerKeySource::None,
    };

    let font = matches.get_one::<PathBuf>("font").map(|path| {
        load_font(path).unwrap_or_else(|e| {
            eprintln!("Error loading font: {}", e);
            exit(1);
        })
    });

    let paths = match collect_sheet_paths(&inputs) {
        Ok(paths) if !paths.is_empty() => paths,
        Ok(_) => {
            eprintln!("No answer sheet images found");
            exit(1);
        }
        Err(e) => {
            eprintln!("Error reading inputs: {}", e);
            exit(1);
        }
    };

    if let Err(e) = std::fs::create_dir_all(&output_dir) {
        eprintln!("Error creating {}: {}", output_dir.display(), e);
        exit(1);
    }

    let options = InterpretOptions {
        config,
        keys,
        detector: Box::new(SidecarDetections::new(
            matches.get_one::<PathBuf>("detections_dir").cloned(),
        )),
        debug_dir: debug.then(|| output_dir.clone()),
    };

    let results = grade_sheets(&paths, &options, |sheet| {
        save_result_image(&sheet, &output_dir, font.as_ref())
            .map(|_| GradeRecord::from(&sheet))
    });

    let mut records = vec![];
    for (path, result) in results {
        match result {
            Ok(Ok(record)) => {
                println!("{}: {}", path.display(), summary_line(&record));
                records.push(record);
            }
            Ok(Err(e)) => eprintln!("{}: {}", path.display(), e),
            Err(e) => eprintln!("{}: {}", path.display(), e),
        }
    }

    if records.is_empty() {
        eprintln!("No answer sheet could be graded");
        exit(1);
    }

    let grades_path = output_dir.join("grades.json");
    if let Err(e) = export_grade_records(&records, &grades_path) {
        eprintln!("Error: {}", e);
        exit(1);
    }
    println!(
        "Graded {} of {} sheets, grades written to {}",
        records.len(),
        paths.len(),
        grades_path.display()
    );
}

fn summary_line(record: &GradeRecord) -> String {
    match record.score {
        Some(score) => format!(
            "student {}, exam {}, score {} ({}/{})",
            record.student_id, record.exam_id, score, record.correct, record.total
        ),
        None => format!(
            "student {}, exam {}, answers {}",
            record.student_id, record.exam_id, record.answers
        ),
    }
}

#[allow(clippy::cognitive_complexity)]
fn cli() -> Command {
    command!()
        .arg(
            arg!(-c --config <PATH> "Path to a JSON grading config")
                .required(false)
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            arg!(-k --key <PATH> "Answer key used for every sheet")
                .required(false)
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            arg!(key_dir: --"key-dir" <DIR> "Directory of result<examId>.json answer keys")
                .required(false)
                .value_parser(value_parser!(PathBuf))
                .conflicts_with("key"),
        )
        .arg(
            arg!(detections_dir: --"detections-dir" <DIR> "Directory of detection sidecar files")
                .required(false)
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            arg!(-o --output <DIR> "Directory for result images and grades.json")
                .required(false)
                .value_parser(value_parser!(PathBuf))
                .default_value("output"),
        )
        .arg(
            arg!(--font <PATH> "TrueType font for the result image header")
                .required(false)
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(arg!(-d --debug "Write debug images to the output directory"))
        .arg(
            arg!(inputs: <INPUT> "Answer sheet images or directories of them")
                .value_parser(value_parser!(PathBuf))
                .num_args(1..)
                .required(true),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_is_consistent() {
        cli().debug_assert();
    }

    #[test]
    fn cli_parses_options_and_inputs() {
        let matches = cli()
            .try_get_matches_from([
                "answer-sheet-grader",
                "--key-dir",
                "keys",
                "-o",
                "out",
                "-d",
                "a.jpg",
                "scans",
            ])
            .unwrap();
        assert_eq!(
            matches.get_one::<PathBuf>("key_dir"),
            Some(&PathBuf::from("keys"))
        );
        assert_eq!(matches.get_one::<PathBuf>("output"), Some(&PathBuf::from("out")));
        assert!(matches.get_flag("debug"));
        assert_eq!(
            matches
                .get_many::<PathBuf>("inputs")
                .unwrap()
                .cloned()
                .collect::<Vec<_>>(),
            vec![PathBuf::from("a.jpg"), PathBuf::from("scans")]
        );
    }

    #[test]
    fn key_and_key_dir_conflict() {
        let result = cli().try_get_matches_from([
            "answer-sheet-grader",
            "-k",
            "k.json",
            "--key-dir",
            "keys",
            "a.jpg",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn summary_line_without_key_lists_answers() {
        let record = GradeRecord {
            file: "a.jpg".to_string(),
            student_id: "123456".to_string(),
            exam_id: "101".to_string(),
            score: None,
            correct: 0,
            total: 0,
            answers: "AB?".to_string(),
        };
        assert_eq!(summary_line(&record), "student 123456, exam 101, answers AB?");
    }
}
