use std::io;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use serde::de::IgnoredAny;
use serde::{Deserialize, Deserializer};
use thiserror::Error;

use crate::id_decoder::DecodedId;
use crate::types::OptionLetter;

/// Expected letters by question, 1-indexed. Entries that are not a valid
/// letter still count towards the total but never match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnswerKey {
    entries: Vec<Option<OptionLetter>>,
}

impl AnswerKey {
    pub fn new(entries: Vec<Option<OptionLetter>>) -> Self {
        Self { entries }
    }

    pub fn from_letters<'a>(letters: impl IntoIterator<Item = &'a str>) -> Self {
        Self::new(letters.into_iter().map(|s| s.parse().ok()).collect())
    }

    /// Number of questions the key covers.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn expected(&self, question: usize) -> Option<OptionLetter> {
        question
            .checked_sub(1)
            .and_then(|i| self.entries.get(i))
            .copied()
            .flatten()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum KeyEntry {
    Letter(OptionLetter),
    Other(IgnoredAny),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum KeyFile {
    Letters(Vec<KeyEntry>),
    Object { answers: Vec<KeyEntry> },
}

impl<'de> Deserialize<'de> for AnswerKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let entries = match KeyFile::deserialize(deserializer)? {
            KeyFile::Letters(entries) => entries,
            KeyFile::Object { answers } => answers,
        };
        Ok(Self::new(
            entries
                .into_iter()
                .map(|entry| match entry {
                    KeyEntry::Letter(letter) => Some(letter),
                    KeyEntry::Other(_) => None,
                })
                .collect(),
        ))
    }
}

#[derive(Debug, Error)]
pub enum AnswerKeyError {
    #[error("failed to read answer key {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse answer key {}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Reads a key file holding either `["A", "B", ...]` or
/// `{"answers": ["A", "B", ...]}`.
pub fn load_answer_key(path: &Path) -> Result<AnswerKey, AnswerKeyError> {
    let json = std::fs::read_to_string(path).map_err(|source| AnswerKeyError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let key: AnswerKey = serde_json::from_str(&json).map_err(|source| AnswerKeyError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    if key.is_empty() {
        warn!("answer key {} has no entries", path.display());
    }
    Ok(key)
}

/// Where the key for a sheet comes from.
#[derive(Debug, Clone, Default)]
pub enum AnswerKeySource {
    /// Report predictions only.
    #[default]
    None,
    /// The same key for every sheet.
    Fixed(AnswerKey),
    /// `result<examId>.json` files, chosen by the exam id read off the sheet.
    Directory(PathBuf),
}

impl AnswerKeySource {
    pub fn key_for(&self, exam_id: &DecodedId) -> Result<Option<AnswerKey>, AnswerKeyError> {
        match self {
            AnswerKeySource::None => Ok(None),
            AnswerKeySource::Fixed(key) => Ok(Some(key.clone())),
            AnswerKeySource::Directory(dir) => {
                if !exam_id.is_complete() {
                    warn!("exam id {} is unreadable, grading without a key", exam_id);
                    return Ok(None);
                }
                let path = dir.join(format!("result{}.json", exam_id));
                if !path.is_file() {
                    warn!("no answer key for exam {} at {}", exam_id, path.display());
                    return Ok(None);
                }
                debug!("using answer key {}", path.display());
                load_answer_key(&path).map(Some)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expected_is_one_indexed() {
        let key = AnswerKey::from_letters(["A", "x", "D"]);
        assert_eq!(key.len(), 3);
        assert_eq!(key.expected(0), None);
        assert_eq!(key.expected(1), Some(OptionLetter::A));
        assert_eq!(key.expected(2), None);
        assert_eq!(key.expected(3), Some(OptionLetter::D));
        assert_eq!(key.expected(4), None);
    }

    #[test]
    fn parses_both_file_shapes() {
        let list: AnswerKey = serde_json::from_str(r#"["A", "b", null, "Z"]"#).unwrap();
        assert_eq!(
            list,
            AnswerKey::new(vec![Some(OptionLetter::A), Some(OptionLetter::B), None, None])
        );

        let object: AnswerKey = serde_json::from_str(r#"{"answers": ["C", "D"]}"#).unwrap();
        assert_eq!(object, AnswerKey::from_letters(["C", "D"]));
    }

    #[test]
    fn non_letter_entries_keep_their_slot() {
        let key: AnswerKey = serde_json::from_str(r#"{"answers": [1, " c ", {}, "AB"]}"#).unwrap();
        assert_eq!(
            key,
            AnswerKey::new(vec![None, Some(OptionLetter::C), None, None])
        );
        assert_eq!(key.expected(2), Some(OptionLetter::C));
    }

    #[test]
    fn directory_source_picks_key_by_exam_id() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("result101.json"), r#"["B", "C"]"#).unwrap();
        let source = AnswerKeySource::Directory(dir.path().to_path_buf());

        let exam = DecodedId::new(vec![Some(1), Some(0), Some(1)]);
        assert_eq!(
            source.key_for(&exam).unwrap(),
            Some(AnswerKey::from_letters(["B", "C"]))
        );

        let unknown = DecodedId::new(vec![Some(1), None, Some(1)]);
        assert_eq!(source.key_for(&unknown).unwrap(), None);
    }

    #[test]
    fn malformed_key_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("key.json");
        std::fs::write(&path, r#"{"letters": 3}"#).unwrap();
        assert!(matches!(load_answer_key(&path), Err(AnswerKeyError::Parse { .. })));
        assert!(matches!(
            load_answer_key(&dir.path().join("missing.json")),
            Err(AnswerKeyError::Io { .. })
        ));
    }
}
