//! The two source datasets, and our own merged output, as candidacy records.
//!
//! Column names are owned by whoever published the data. Each source gets a small
//! column map that's resolved once against the table headers; a missing column is
//! fatal, a bad cell is just a gap.

use color_eyre::eyre::{Context, Result};
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info, warn};

use crate::model::{AnalysisRecord, CandidacyRecord, ElectionType, Source};
use crate::normalize::{
    canonicalize_constituency, canonicalize_party, classify_elected_status,
    classify_election_type, derive_year,
};
use crate::tables::{read_table, write_table, OutColumn, RawTable};

/// Column names of the unified output.
pub mod cols {
    pub const YEAR: &str = "year";
    pub const CANDIDATE: &str = "candidate";
    pub const CANDIDATE_ID: &str = "candidate_ID";
    pub const CONSTITUENCY_NAME: &str = "constituency_name";
    pub const CONSTITUENCY_CLEAN: &str = "constituency_clean";
    pub const PARTY: &str = "party";
    pub const PARTY_CLEAN: &str = "party_clean";
    pub const ELECTED: &str = "elected";
    pub const ELECTION_TYPE: &str = "election_type";
    pub const FIRST_PREF_COUNT: &str = "first_pref_count";
    pub const FIRST_PREF_PCT: &str = "first_pref_pct";
    pub const QUOTA_RATIO: &str = "pct_of_quota_reached_with_first_pref";
    pub const SOURCE: &str = "source";
    pub const DECADE: &str = "decade";
    pub const WON: &str = "won";
}

/// Where each field lives in a particular source's table.
#[derive(Debug, Clone, Copy)]
pub struct SourceSchema {
    pub source: Source,
    pub candidate_id: Option<&'static str>,
    /// Year, or a date to derive it from.
    pub year: &'static str,
    pub candidate: &'static str,
    pub constituency: &'static str,
    pub party: &'static str,
    pub elected: &'static str,
    pub election_type: &'static str,
    pub first_pref_count: &'static str,
    pub first_pref_pct: &'static str,
    pub quota_ratio: &'static str,
}

/// ElectionsIreland: identified, with free-text dates, statuses and election labels.
pub const ELECTIONS_IRELAND: SourceSchema = SourceSchema {
    source: Source::ElectionsIreland,
    candidate_id: Some("ID"),
    year: "date",
    candidate: "candidate",
    constituency: "constituency_name",
    party: "party",
    elected: "status",
    election_type: "election_type",
    first_pref_count: "first_pref_count",
    first_pref_pct: "first_pref_pct",
    quota_ratio: "pct_of_quota_reached_with_first_pref",
};

/// IrelandElection: no identifiers, numeric years, boolean elected flag.
pub const IRELAND_ELECTION: SourceSchema = SourceSchema {
    source: Source::IrelandElection,
    candidate_id: None,
    year: "year",
    candidate: "candidate",
    constituency: "constituency",
    party: "party",
    elected: "elected",
    election_type: "election_type",
    first_pref_count: "first_pref_count",
    first_pref_pct: "first_pref_pct",
    quota_ratio: "first_pref_quota_ratio",
};

/// Column indices, resolved against a table's headers.
struct Resolved {
    candidate_id: Option<usize>,
    year: usize,
    candidate: usize,
    constituency: usize,
    party: usize,
    elected: usize,
    election_type: usize,
    first_pref_count: usize,
    first_pref_pct: usize,
    quota_ratio: usize,
}

impl SourceSchema {
    fn resolve(&self, table: &RawTable) -> Result<Resolved> {
        Ok(Resolved {
            candidate_id: self.candidate_id.map(|c| table.require(c)).transpose()?,
            year: table.require(self.year)?,
            candidate: table.require(self.candidate)?,
            constituency: table.require(self.constituency)?,
            party: table.require(self.party)?,
            elected: table.require(self.elected)?,
            election_type: table.require(self.election_type)?,
            first_pref_count: table.require(self.first_pref_count)?,
            first_pref_pct: table.require(self.first_pref_pct)?,
            quota_ratio: table.require(self.quota_ratio)?,
        })
    }
}

/// Why a row didn't make it into the working set.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DropCounts {
    pub no_year: usize,
    pub no_elected: usize,
}

fn parse_number(cell: Option<&str>) -> Option<f64> {
    cell.and_then(|x| x.trim().parse::<f64>().ok())
        .filter(|x| x.is_finite())
}

fn parse_id(cell: Option<&str>) -> Option<i64> {
    let cell = cell?.trim();
    cell.parse::<i64>().ok().or_else(|| {
        // float-typed ID columns come through as "123.0"
        cell.parse::<f64>()
            .ok()
            .filter(|x| x.is_finite() && x.fract() == 0.0)
            .map(|x| x as i64)
    })
}

/// The election type as the source gives it: an exact label, or free text to classify.
fn parse_election_type(cell: Option<&str>) -> Option<ElectionType> {
    let cell = cell?;
    ElectionType::from_str(cell)
        .ok()
        .or_else(|| classify_election_type(cell))
}

/// Normalize every row of `table` according to `schema`.
/// Rows without a year or a definite elected status are dropped and counted.
pub fn normalize_table(
    table: &RawTable,
    schema: &SourceSchema,
) -> Result<(Vec<CandidacyRecord>, DropCounts)> {
    let c = schema.resolve(table)?;
    let mut out = Vec::with_capacity(table.len());
    let mut dropped = DropCounts::default();

    for (rownum, row) in table.rows().enumerate() {
        let cell = move |i: usize| row[i].as_deref();

        let year = match cell(c.year).and_then(derive_year) {
            Some(y) => y,
            None => {
                debug!("{}: row {} has no usable year", schema.source, rownum);
                dropped.no_year += 1;
                continue;
            }
        };
        let elected = match cell(c.elected).and_then(classify_elected_status) {
            Some(e) => e,
            None => {
                debug!(
                    "{}: row {} has ambiguous elected status {:?}",
                    schema.source,
                    rownum,
                    cell(c.elected)
                );
                dropped.no_elected += 1;
                continue;
            }
        };

        let constituency_raw = cell(c.constituency).unwrap_or_default().to_string();
        let party_raw = cell(c.party).map(String::from);

        out.push(CandidacyRecord {
            year,
            candidate: cell(c.candidate).unwrap_or_default().to_string(),
            candidate_id: c.candidate_id.and_then(|i| parse_id(cell(i))),
            constituency_canonical: canonicalize_constituency(&constituency_raw),
            constituency_raw,
            party_canonical: canonicalize_party(party_raw.as_deref()),
            party_raw,
            elected,
            election_type: parse_election_type(cell(c.election_type)),
            first_pref_count: parse_number(cell(c.first_pref_count)),
            first_pref_pct: parse_number(cell(c.first_pref_pct)),
            quota_ratio: parse_number(cell(c.quota_ratio)),
            source: schema.source,
        });
    }
    Ok((out, dropped))
}

/// Load and normalize one of the two input sources.
pub fn load_source(path: &Path, schema: &SourceSchema) -> Result<Vec<CandidacyRecord>> {
    info!("Loading {} data from {}", schema.source, path.display());
    let table = read_table(path)?;
    let (records, dropped) = normalize_table(&table, schema)
        .with_context(|| format!("{} doesn't look like {} data", path.display(), schema.source))?;
    info!(
        "\tLoaded {} records ({} without a year, {} appointments/resignations etc. dropped)",
        records.len(),
        dropped.no_year,
        dropped.no_elected
    );
    if table.is_empty() {
        warn!("{} has no rows", path.display());
    } else if records.is_empty() {
        warn!("No usable records in {}", path.display());
    }
    Ok(records)
}

/// Read back a table previously written by [`write_merged`].
pub fn load_merged(path: &Path) -> Result<Vec<CandidacyRecord>> {
    info!("Loading merged data from {}", path.display());
    let table = read_table(path)?;
    let col = |name: &str| table.require(name);
    let (year_c, candidate_c, id_c) = (
        col(cols::YEAR)?,
        col(cols::CANDIDATE)?,
        col(cols::CANDIDATE_ID)?,
    );
    let (const_c, const_clean_c, party_c, party_clean_c) = (
        col(cols::CONSTITUENCY_NAME)?,
        col(cols::CONSTITUENCY_CLEAN)?,
        col(cols::PARTY)?,
        col(cols::PARTY_CLEAN)?,
    );
    let (elected_c, etype_c, source_c) = (
        col(cols::ELECTED)?,
        col(cols::ELECTION_TYPE)?,
        col(cols::SOURCE)?,
    );
    let (fpc_c, fpp_c, quota_c) = (
        col(cols::FIRST_PREF_COUNT)?,
        col(cols::FIRST_PREF_PCT)?,
        col(cols::QUOTA_RATIO)?,
    );

    let mut out = Vec::with_capacity(table.len());
    for (rownum, row) in table.rows().enumerate() {
        let cell = move |i: usize| row[i].as_deref();
        let (year, elected) = match (
            cell(year_c).and_then(derive_year),
            cell(elected_c).and_then(classify_elected_status),
        ) {
            (Some(y), Some(e)) => (y, e),
            _ => {
                warn!("merged row {} is missing its year or elected flag", rownum);
                continue;
            }
        };
        let constituency_raw = cell(const_c).unwrap_or_default().to_string();
        let party_raw = cell(party_c).map(String::from);
        out.push(CandidacyRecord {
            year,
            candidate: cell(candidate_c).unwrap_or_default().to_string(),
            candidate_id: parse_id(cell(id_c)),
            constituency_canonical: cell(const_clean_c)
                .map(String::from)
                .unwrap_or_else(|| canonicalize_constituency(&constituency_raw)),
            constituency_raw,
            party_canonical: cell(party_clean_c)
                .map(String::from)
                .unwrap_or_else(|| canonicalize_party(party_raw.as_deref())),
            party_raw,
            elected,
            election_type: cell(etype_c).and_then(|x| ElectionType::from_str(x).ok()),
            first_pref_count: parse_number(cell(fpc_c)),
            first_pref_pct: parse_number(cell(fpp_c)),
            quota_ratio: parse_number(cell(quota_c)),
            source: cell(source_c)
                .and_then(|s| Source::from_str(s).ok())
                .unwrap_or(Source::Merged),
        });
    }
    info!("\tLoaded {} records", out.len());
    Ok(out)
}

fn record_columns<'a, I>(records: I) -> Vec<(&'static str, OutColumn)>
where
    I: Iterator<Item = &'a CandidacyRecord> + Clone,
{
    let int = |f: fn(&CandidacyRecord) -> Option<i64>| OutColumn::Int(records.clone().map(f).collect());
    let float =
        |f: fn(&CandidacyRecord) -> Option<f64>| OutColumn::Float(records.clone().map(f).collect());
    let text = |f: fn(&CandidacyRecord) -> Option<String>| {
        OutColumn::Text(records.clone().map(f).collect())
    };

    vec![
        (cols::YEAR, int(|r| Some(r.year as i64))),
        (cols::CANDIDATE, text(|r| Some(r.candidate.clone()))),
        (cols::CANDIDATE_ID, int(|r| r.candidate_id)),
        (cols::CONSTITUENCY_NAME, text(|r| Some(r.constituency_raw.clone()))),
        (cols::CONSTITUENCY_CLEAN, text(|r| Some(r.constituency_canonical.clone()))),
        (cols::PARTY, text(|r| r.party_raw.clone())),
        (cols::PARTY_CLEAN, text(|r| Some(r.party_canonical.clone()))),
        (
            cols::ELECTED,
            OutColumn::Bool(records.clone().map(|r| Some(r.elected)).collect()),
        ),
        (
            cols::ELECTION_TYPE,
            text(|r| r.election_type.map(|et| et.to_string())),
        ),
        (cols::FIRST_PREF_COUNT, float(|r| r.first_pref_count)),
        (cols::FIRST_PREF_PCT, float(|r| r.first_pref_pct)),
        (cols::QUOTA_RATIO, float(|r| r.quota_ratio)),
        (cols::SOURCE, text(|r| Some(r.source.to_string()))),
    ]
}

/// Write the unified table.
pub fn write_merged(path: &Path, records: &[CandidacyRecord]) -> Result<()> {
    write_table(path, &record_columns(records.iter()))
}

/// Write the analysis subset: the unified columns plus `decade` and `won`.
pub fn write_analysis(path: &Path, records: &[AnalysisRecord]) -> Result<()> {
    let mut columns = record_columns(records.iter().map(|ar| &ar.record));
    columns.push((
        cols::DECADE,
        OutColumn::Int(records.iter().map(|ar| Some(ar.decade as i64)).collect()),
    ));
    columns.push((
        cols::WON,
        OutColumn::Bool(records.iter().map(|ar| Some(ar.won)).collect()),
    ));
    write_table(path, &columns)
}
