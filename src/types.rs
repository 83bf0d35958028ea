use std::fmt::Display;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One of the four printed options of a multiple-choice question, left to
/// right.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OptionLetter {
    A,
    B,
    C,
    D,
}

impl OptionLetter {
    pub const ALL: [OptionLetter; 4] = [
        OptionLetter::A,
        OptionLetter::B,
        OptionLetter::C,
        OptionLetter::D,
    ];

    /// Slot of this option within a row sorted left to right.
    pub fn index(self) -> usize {
        match self {
            OptionLetter::A => 0,
            OptionLetter::B => 1,
            OptionLetter::C => 2,
            OptionLetter::D => 3,
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn as_char(self) -> char {
        match self {
            OptionLetter::A => 'A',
            OptionLetter::B => 'B',
            OptionLetter::C => 'C',
            OptionLetter::D => 'D',
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid option letter: {0:?}")]
pub struct ParseOptionLetterError(String);

impl FromStr for OptionLetter {
    type Err = ParseOptionLetterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "A" | "a" => Ok(OptionLetter::A),
            "B" | "b" => Ok(OptionLetter::B),
            "C" | "c" => Ok(OptionLetter::C),
            "D" | "d" => Ok(OptionLetter::D),
            _ => Err(ParseOptionLetterError(s.to_string())),
        }
    }
}

impl Display for OptionLetter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

impl<'de> Deserialize<'de> for OptionLetter {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

impl Serialize for OptionLetter {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

/// The character reported for a predicted answer, `?` when undecided.
pub fn letter_or_unknown(letter: Option<OptionLetter>) -> char {
    letter.map_or('?', OptionLetter::as_char)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_letters_leniently() {
        assert_eq!(" b ".parse::<OptionLetter>(), Ok(OptionLetter::B));
        assert_eq!("D".parse::<OptionLetter>(), Ok(OptionLetter::D));
        assert!("E".parse::<OptionLetter>().is_err());
        assert!("".parse::<OptionLetter>().is_err());
    }

    #[test]
    fn index_round_trips_through_slots() {
        for letter in OptionLetter::ALL {
            assert_eq!(OptionLetter::from_index(letter.index()), Some(letter));
        }
        assert_eq!(OptionLetter::from_index(4), None);
    }

    #[test]
    fn serializes_as_single_letter_string() {
        assert_eq!(serde_json::to_string(&OptionLetter::C).unwrap(), "\"C\"");
        let letters: Vec<OptionLetter> = serde_json::from_str("[\"a\", \"D\"]").unwrap();
        assert_eq!(letters, vec![OptionLetter::A, OptionLetter::D]);
    }

    #[test]
    fn unknown_letter_is_question_mark() {
        assert_eq!(letter_or_unknown(None), '?');
        assert_eq!(letter_or_unknown(Some(OptionLetter::A)), 'A');
    }
}
