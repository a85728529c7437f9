//! Vote records and the values they are built from.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;

/// Opaque voter identifier supplied by the chat transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VoterId(pub i64);

impl fmt::Display for VoterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Two-valued sentiment of a vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Polarity {
    Positive,
    Negative,
}

impl Polarity {
    /// Storage/wire token.
    pub fn as_str(&self) -> &'static str {
        match self {
            Polarity::Positive => "positive",
            Polarity::Negative => "negative",
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            Polarity::Positive => "❤️",
            Polarity::Negative => "🖤",
        }
    }
}

impl fmt::Display for Polarity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raised when a token is neither of the two polarities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownPolarity(pub String);

impl fmt::Display for UnknownPolarity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown polarity '{}'", self.0)
    }
}

impl std::error::Error for UnknownPolarity {}

impl FromStr for Polarity {
    type Err = UnknownPolarity;

    /// Accepts the storage tokens and the legacy emoji buttons.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "positive" | "❤️" | "❤" => Ok(Polarity::Positive),
            "negative" | "🖤" => Ok(Polarity::Negative),
            other => Err(UnknownPolarity(other.to_string())),
        }
    }
}

/// A named entity users vote for. Only obtainable through [`SubjectSet`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Subject(String);

impl Subject {
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The fixed, ordered set of subjects configured at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectSet {
    subjects: Vec<Subject>,
}

impl SubjectSet {
    /// Build the set, rejecting empty, blank or duplicate names.
    pub fn new<I, S>(names: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut subjects: Vec<Subject> = Vec::new();
        for name in names {
            let name = name.into().trim().to_string();
            if name.is_empty() {
                return Err(ConfigError::InvalidValue {
                    key: "subjects".into(),
                    message: "subject names must not be blank".into(),
                });
            }
            if subjects.iter().any(|s| s.0 == name) {
                return Err(ConfigError::InvalidValue {
                    key: "subjects".into(),
                    message: format!("duplicate subject '{name}'"),
                });
            }
            subjects.push(Subject(name));
        }
        if subjects.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "subjects".into(),
                message: "at least one subject is required".into(),
            });
        }
        Ok(Self { subjects })
    }

    /// Look a subject up by its exact name.
    pub fn resolve(&self, name: &str) -> Option<&Subject> {
        self.subjects.iter().find(|s| s.0 == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Subject> {
        self.subjects.iter()
    }

    pub fn len(&self) -> usize {
        self.subjects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subjects.is_empty()
    }
}

/// One accepted vote. Immutable once written to the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    pub voter_id: VoterId,
    pub subject: Subject,
    pub polarity: Polarity,
    /// Calendar date in the reference timezone at acceptance time.
    pub day: NaiveDate,
}

/// Rebuild a subject from a stored row. The ledger only ever holds names that
/// passed [`SubjectSet::resolve`] when they were written.
pub(crate) fn subject_from_storage(name: String) -> Subject {
    Subject(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn polarity_parses_tokens_and_emoji() {
        assert_eq!("positive".parse::<Polarity>().unwrap(), Polarity::Positive);
        assert_eq!("❤️".parse::<Polarity>().unwrap(), Polarity::Positive);
        assert_eq!("🖤".parse::<Polarity>().unwrap(), Polarity::Negative);
        assert!("meh".parse::<Polarity>().is_err());
        assert!("Positive".parse::<Polarity>().is_err());
    }

    #[test]
    fn subject_set_keeps_order_and_resolves() {
        let set = SubjectSet::new(["Alen", "Katya", "Kuzya"]).unwrap();
        let names: Vec<_> = set.iter().map(Subject::name).collect();
        assert_eq!(names, vec!["Alen", "Katya", "Kuzya"]);
        assert!(set.resolve("Katya").is_some());
        assert!(set.resolve("Zzz").is_none());
    }

    #[test]
    fn subject_set_rejects_duplicates_and_empty() {
        assert!(SubjectSet::new(["A", "A"]).is_err());
        assert!(SubjectSet::new(Vec::<String>::new()).is_err());
        assert!(SubjectSet::new(["  "]).is_err());
    }
}
