//! The shared data model: candidacy records, their sources, and match pairs.

use std::fmt;
use std::str::FromStr;

/// A candidate identifier. ElectionsIreland publishes these; IrelandElection does not.
pub type CandidateId = i64;

/// The kind of election event a candidacy belongs to.
#[derive(PartialEq, Eq, Hash, Debug, Serialize, Deserialize, Copy, Clone, PartialOrd, Ord)]
#[allow(clippy::upper_case_acronyms)] // these are how the labels appear in the data
pub enum ElectionType {
    GENERAL,
    LOCAL,
    SEANAD,
    WESTMINSTER,
    EUROPEAN,
    #[serde(rename = "BY-ELECTION")]
    BYELECTION,
}

impl ElectionType {
    pub const ALL: [ElectionType; 6] = [
        Self::GENERAL,
        Self::LOCAL,
        Self::SEANAD,
        Self::WESTMINSTER,
        Self::EUROPEAN,
        Self::BYELECTION,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GENERAL => "GENERAL",
            Self::LOCAL => "LOCAL",
            Self::SEANAD => "SEANAD",
            Self::WESTMINSTER => "WESTMINSTER",
            Self::EUROPEAN => "EUROPEAN",
            Self::BYELECTION => "BY-ELECTION",
        }
    }
}

impl FromStr for ElectionType {
    type Err = &'static str;
    /// Exact (case-insensitive) parse of the canonical label only.
    /// Free-text labels go through [`crate::normalize::classify_election_type`].
    fn from_str(item: &str) -> Result<Self, Self::Err> {
        let upper = item.trim().to_uppercase();
        Self::ALL
            .iter()
            .find(|et| et.as_str() == upper)
            .copied()
            .ok_or("Not a canonical election type")
    }
}

impl fmt::Display for ElectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which dataset a record came from.
#[derive(PartialEq, Eq, Hash, Debug, Serialize, Deserialize, Copy, Clone)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    /// ElectionsIreland: the identified source (source A).
    ElectionsIreland,
    /// IrelandElection: the unidentified source (source B).
    IrelandElection,
    /// One row of each, combined.
    Merged,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ElectionsIreland => "electionsireland",
            Self::IrelandElection => "irelandelection",
            Self::Merged => "merged",
        }
    }
}

impl FromStr for Source {
    type Err = &'static str;
    fn from_str(item: &str) -> Result<Self, Self::Err> {
        match item.trim().to_lowercase().as_str() {
            "electionsireland" => Ok(Self::ElectionsIreland),
            "irelandelection" => Ok(Self::IrelandElection),
            "merged" => Ok(Self::Merged),
            _ => Err("Unknown source tag"),
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One candidate standing in one election event.
///
/// By the time a record exists, `year` and `elected` are known: rows where either
/// could not be determined are dropped while loading.
/// `election_type` of `None` means the source label was not recognised;
/// such rows are kept but never make it into the analysis subset.
#[derive(PartialEq, Debug, Clone)]
pub struct CandidacyRecord {
    pub year: i32,
    pub candidate: String,
    pub candidate_id: Option<CandidateId>,
    /// As printed in the source. Empty if the source had nothing.
    pub constituency_raw: String,
    /// Never empty unless the raw value was also empty.
    pub constituency_canonical: String,
    pub party_raw: Option<String>,
    /// Never empty: falls back to the raw value, or "Unknown".
    pub party_canonical: String,
    pub elected: bool,
    pub election_type: Option<ElectionType>,
    pub first_pref_count: Option<f64>,
    pub first_pref_pct: Option<f64>,
    /// First-preference votes as a fraction of the quota.
    pub quota_ratio: Option<f64>,
    pub source: Source,
}

/// (source A row index, source B row index), asserting both denote the same candidacy.
#[derive(PartialEq, Eq, Hash, Debug, Copy, Clone, PartialOrd, Ord)]
pub struct MatchPair {
    pub a: usize,
    pub b: usize,
}

/// A row of the general-elections analysis subset.
#[derive(PartialEq, Debug, Clone)]
pub struct AnalysisRecord {
    pub record: CandidacyRecord,
    pub decade: i32,
    pub won: bool,
}

impl AnalysisRecord {
    pub fn from_record(record: CandidacyRecord) -> Self {
        let decade = record.year.div_euclid(10) * 10;
        let won = record.elected;
        Self {
            record,
            decade,
            won,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_election_type_labels() {
        assert_eq!("BY-ELECTION", ElectionType::BYELECTION.to_string());
        assert_eq!(Ok(ElectionType::SEANAD), ElectionType::from_str("seanad"));
        assert_eq!(Ok(ElectionType::BYELECTION), "By-Election".parse());
        assert!(ElectionType::from_str("Dail Election").is_err());
    }

    #[test]
    fn test_source_tags() {
        assert_eq!("merged", Source::Merged.to_string());
        assert_eq!(Ok(Source::IrelandElection), "IrelandElection".parse());
        assert!(Source::from_str("wikipedia").is_err());
        assert_eq!(
            "\"electionsireland\"",
            serde_json::to_string(&Source::ElectionsIreland).unwrap()
        );
    }

    #[test]
    fn test_decade() {
        let rec = CandidacyRecord {
            year: 1987,
            candidate: "Joe Bloggs".to_string(),
            candidate_id: Some(4),
            constituency_raw: "Kerry North".to_string(),
            constituency_canonical: "Kerry North".to_string(),
            party_raw: None,
            party_canonical: "Unknown".to_string(),
            elected: true,
            election_type: Some(ElectionType::GENERAL),
            first_pref_count: None,
            first_pref_pct: None,
            quota_ratio: None,
            source: Source::ElectionsIreland,
        };
        let ar = AnalysisRecord::from_record(rec);
        assert_eq!(1980, ar.decade);
        assert!(ar.won);
    }
}
