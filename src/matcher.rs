//! Finding the rows of the two sources that describe the same candidacy.
//!
//! Greedy, not optimal: source A is walked in row order and each A row takes the
//! first unclaimed B row of the same year that's close enough. Names must be close,
//! election types must agree, and then either the constituencies are close or the
//! parties are close and the constituencies are at least plausible.

use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use strsim::jaro_winkler;
use tracing::{debug, info};

use crate::model::{CandidacyRecord, MatchPair};

/// Similarity cut-offs for accepting a pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchThresholds {
    /// Names scoring below this are rejected outright (inclusive lower bound).
    pub name: f64,
    /// Constituencies scoring above this are accepted on their own.
    pub constituency: f64,
    /// Parties scoring above this can vouch for a weaker constituency score...
    pub party: f64,
    /// ... as long as it's above this.
    pub constituency_fallback: f64,
}

impl Default for MatchThresholds {
    fn default() -> Self {
        Self {
            name: 0.85,
            constituency: 0.8,
            party: 0.85,
            constituency_fallback: 0.6,
        }
    }
}

/// The three similarity scores for a candidate pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PairScores {
    pub name: f64,
    pub constituency: f64,
    pub party: f64,
}

impl MatchThresholds {
    pub fn name_passes(&self, name_sim: f64) -> bool {
        name_sim >= self.name
    }

    /// The constituency/party half of the decision; the name gate is applied first.
    pub fn place_passes(&self, constituency_sim: f64, party_sim: f64) -> bool {
        constituency_sim > self.constituency
            || (party_sim > self.party && constituency_sim > self.constituency_fallback)
    }

    pub fn accepts(&self, scores: &PairScores) -> bool {
        self.name_passes(scores.name) && self.place_passes(scores.constituency, scores.party)
    }
}

/// Everything the matcher found.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct MatchOutcome {
    /// In discovery order, i.e. ascending A index.
    pub pairs: Vec<MatchPair>,
    /// Every B index that appears in `pairs`.
    pub matched_b: BTreeSet<usize>,
}

impl MatchOutcome {
    pub fn matched_a(&self) -> BTreeSet<usize> {
        self.pairs.iter().map(|p| p.a).collect()
    }
}

fn similarity(a: &str, b: &str) -> f64 {
    jaro_winkler(&a.to_lowercase(), &b.to_lowercase())
}

/// Canonical constituency, or the raw one if we never found a canonical form.
fn constituency_key(rec: &CandidacyRecord) -> &str {
    if rec.constituency_canonical.is_empty() {
        &rec.constituency_raw
    } else {
        &rec.constituency_canonical
    }
}

/// Score a pair, or `None` if it's ruled out before the place comparison.
pub fn score_pair(
    a: &CandidacyRecord,
    b: &CandidacyRecord,
    thresholds: &MatchThresholds,
) -> Option<PairScores> {
    let name = similarity(&a.candidate, &b.candidate);
    if !thresholds.name_passes(name) {
        return None;
    }
    if a.election_type != b.election_type {
        return None;
    }
    Some(PairScores {
        name,
        constituency: similarity(constituency_key(a), constituency_key(b)),
        party: similarity(&a.party_canonical, &b.party_canonical),
    })
}

/// Row indices grouped by year, each group in row order.
fn partition_by_year(table: &[CandidacyRecord]) -> BTreeMap<i32, Vec<usize>> {
    let mut by_year: BTreeMap<i32, Vec<usize>> = BTreeMap::new();
    for (i, rec) in table.iter().enumerate() {
        by_year.entry(rec.year).or_default().push(i);
    }
    by_year
}

/// Greedy matching of A rows `a_rows` against B rows `b_rows`, all from one year.
fn match_partition(
    table_a: &[CandidacyRecord],
    table_b: &[CandidacyRecord],
    a_rows: &[usize],
    b_rows: &[usize],
    thresholds: &MatchThresholds,
) -> Vec<MatchPair> {
    let mut claimed: BTreeSet<usize> = BTreeSet::new();
    let mut pairs = Vec::new();
    for &ia in a_rows {
        let rec_a = &table_a[ia];
        for &ib in b_rows {
            if claimed.contains(&ib) {
                continue;
            }
            let accepted = score_pair(rec_a, &table_b[ib], thresholds)
                .map_or(false, |s| thresholds.accepts(&s));
            if accepted {
                debug!(
                    "matched A{} {:?} with B{} {:?}",
                    ia, rec_a.candidate, ib, table_b[ib].candidate
                );
                pairs.push(MatchPair { a: ia, b: ib });
                claimed.insert(ib);
                break;
            }
        }
    }
    pairs
}

/// The (A rows, B rows) of every year present in both tables.
fn year_partitions(
    table_a: &[CandidacyRecord],
    table_b: &[CandidacyRecord],
) -> Vec<(Vec<usize>, Vec<usize>)> {
    let mut b_by_year = partition_by_year(table_b);
    partition_by_year(table_a)
        .into_iter()
        .filter_map(|(year, a_rows)| b_by_year.remove(&year).map(|b_rows| (a_rows, b_rows)))
        .collect()
}

/// Put pairs back in A order and record which B rows they claim.
fn finish(mut pairs: Vec<MatchPair>, a_len: usize, b_len: usize) -> MatchOutcome {
    pairs.sort_unstable_by_key(|p| p.a);
    let matched_b = pairs.iter().map(|p| p.b).collect();
    let outcome = MatchOutcome { pairs, matched_b };
    info!(
        "\tFound {} matching pairs ({} of {} A rows, {} of {} B rows unmatched)",
        outcome.pairs.len(),
        a_len - outcome.pairs.len(),
        a_len,
        b_len - outcome.matched_b.len(),
        b_len
    );
    outcome
}

/// Match `table_a` against `table_b`, one year at a time.
///
/// Within a year each A row, in row order, takes the first unclaimed B row that
/// passes the thresholds. Years never share B rows, so the result equals a single
/// walk over all of A.
pub fn match_records(
    table_a: &[CandidacyRecord],
    table_b: &[CandidacyRecord],
    thresholds: &MatchThresholds,
) -> MatchOutcome {
    info!("Matching records between datasets");
    let pairs = year_partitions(table_a, table_b)
        .iter()
        .flat_map(|(a_rows, b_rows)| {
            match_partition(table_a, table_b, a_rows, b_rows, thresholds)
        })
        .collect();
    finish(pairs, table_a.len(), table_b.len())
}

/// Same result as [`match_records`], with each year matched on the rayon pool.
pub fn match_records_par(
    table_a: &[CandidacyRecord],
    table_b: &[CandidacyRecord],
    thresholds: &MatchThresholds,
) -> MatchOutcome {
    info!("Matching records between datasets (parallel by year)");
    let pairs = year_partitions(table_a, table_b)
        .par_iter()
        .flat_map_iter(|(a_rows, b_rows)| {
            match_partition(table_a, table_b, a_rows, b_rows, thresholds)
        })
        .collect();
    finish(pairs, table_a.len(), table_b.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ElectionType, Source};
    use crate::normalize::{canonicalize_constituency, canonicalize_party};

    fn rec(
        year: i32,
        candidate: &str,
        constituency: &str,
        party: &str,
        et: ElectionType,
        source: Source,
    ) -> CandidacyRecord {
        CandidacyRecord {
            year,
            candidate: candidate.to_string(),
            candidate_id: None,
            constituency_raw: constituency.to_string(),
            constituency_canonical: canonicalize_constituency(constituency),
            party_raw: Some(party.to_string()),
            party_canonical: canonicalize_party(Some(party)),
            elected: true,
            election_type: Some(et),
            first_pref_count: None,
            first_pref_pct: None,
            quota_ratio: None,
            source,
        }
    }

    fn a(year: i32, cand: &str, cons: &str, party: &str) -> CandidacyRecord {
        rec(year, cand, cons, party, ElectionType::GENERAL, Source::ElectionsIreland)
    }

    fn b(year: i32, cand: &str, cons: &str, party: &str) -> CandidacyRecord {
        rec(year, cand, cons, party, ElectionType::GENERAL, Source::IrelandElection)
    }

    #[test]
    fn test_obrien_is_matched() {
        let ta = vec![a(2011, "Mary O'Brien", "Dublin South-Central", "Labour Party")];
        let tb = vec![b(2011, "Mary OBrien", "Dublin South Central", "Labour")];
        let scores = score_pair(&ta[0], &tb[0], &MatchThresholds::default()).unwrap();
        assert!(scores.name > 0.95);
        assert!(scores.constituency > 0.8);
        let out = match_records(&ta, &tb, &MatchThresholds::default());
        assert_eq!(vec![MatchPair { a: 0, b: 0 }], out.pairs);
        assert!(out.matched_b.contains(&0));
    }

    #[test]
    fn test_election_type_must_agree() {
        let ta = vec![a(2011, "Mary O'Brien", "Kerry North", "Fine Gael")];
        let mut local = b(2011, "Mary O'Brien", "Kerry North", "Fine Gael");
        local.election_type = Some(ElectionType::LOCAL);
        let out = match_records(&ta, &[local], &MatchThresholds::default());
        assert!(out.pairs.is_empty());
        assert!(out.matched_b.is_empty());
    }

    #[test]
    fn test_year_must_agree() {
        let ta = vec![a(2011, "Mary O'Brien", "Kerry North", "Fine Gael")];
        let tb = vec![b(2016, "Mary O'Brien", "Kerry North", "Fine Gael")];
        assert!(match_records(&ta, &tb, &MatchThresholds::default())
            .pairs
            .is_empty());
    }

    #[test]
    fn test_name_threshold_is_inclusive() {
        let t = MatchThresholds::default();
        assert!(t.name_passes(0.85));
        assert!(!t.name_passes(0.8499999));
        let at_edge = PairScores {
            name: 0.85,
            constituency: 0.9,
            party: 0.0,
        };
        assert!(t.accepts(&at_edge));
    }

    #[test]
    fn test_name_threshold_on_records() {
        let ta = vec![a(2007, "Michael Kennedy", "Dublin North", "Fianna Fáil")];
        let tb = vec![b(2007, "Micheal Kenedy", "Dublin North", "Fianna Fail")];
        let exact = similarity(&ta[0].candidate, &tb[0].candidate);
        assert!(exact > 0.0 && exact < 1.0);

        // a name scoring exactly the threshold is accepted
        let at = MatchThresholds {
            name: exact,
            ..MatchThresholds::default()
        };
        let out = match_records(&ta, &tb, &at);
        assert_eq!(vec![MatchPair { a: 0, b: 0 }], out.pairs);
        assert_eq!(out, match_records_par(&ta, &tb, &at));

        // one ulp higher and it isn't
        let above = MatchThresholds {
            name: f64::from_bits(exact.to_bits() + 1),
            ..MatchThresholds::default()
        };
        assert!(score_pair(&ta[0], &tb[0], &above).is_none());
        assert!(match_records(&ta, &tb, &above).pairs.is_empty());
    }

    #[test]
    fn test_place_thresholds_are_strict() {
        let t = MatchThresholds::default();
        assert!(!t.place_passes(0.8, 0.0));
        assert!(t.place_passes(0.81, 0.0));
        // party can vouch for a middling constituency, but not a poor one
        assert!(t.place_passes(0.7, 0.9));
        assert!(!t.place_passes(0.6, 0.9));
        assert!(!t.place_passes(0.7, 0.85));
    }

    #[test]
    fn test_constituency_spelling_variants() {
        let ta = vec![a(1997, "John Smith", "Cork South-West", "Fine Gael")];
        let tb = vec![b(1997, "John Smith", "Cork West", "Fine Gael")];
        let s = score_pair(&ta[0], &tb[0], &MatchThresholds::default()).unwrap();
        assert_eq!(1.0, s.name);
        assert_eq!(1.0, s.party);
        assert_eq!(1, match_records(&ta, &tb, &MatchThresholds::default()).pairs.len());
    }

    #[test]
    fn test_first_acceptable_b_wins_and_is_claimed() {
        // two identical A rows compete for two identical B rows
        let ta = vec![
            a(2002, "Pat Kelly", "Galway West", "Independent"),
            a(2002, "Pat Kelly", "Galway West", "Independent"),
            a(2002, "Pat Kelly", "Galway West", "Independent"),
        ];
        let tb = vec![
            b(2002, "Pat Kelly", "Galway West", "Independent"),
            b(2002, "Pat Kelly", "Galway West", "Independent"),
        ];
        let out = match_records(&ta, &tb, &MatchThresholds::default());
        assert_eq!(
            vec![MatchPair { a: 0, b: 0 }, MatchPair { a: 1, b: 1 }],
            out.pairs
        );
        let bs: Vec<usize> = out.pairs.iter().map(|p| p.b).collect();
        let unique: BTreeSet<usize> = bs.iter().copied().collect();
        assert_eq!(bs.len(), unique.len());
    }

    fn mixed_tables() -> (Vec<CandidacyRecord>, Vec<CandidacyRecord>) {
        let ta = vec![
            a(2011, "Mary O'Brien", "Dublin South-Central", "Labour Party"),
            a(1997, "John Smith", "Cork South-West", "Fine Gael"),
            a(2011, "Sean Murphy", "Kerry South", "Fianna Fail"),
            a(1923, "Eoin MacNeill", "Clare", "Cumann na nGaedheal"),
            a(2011, "Mary O'Brien", "Dublin South-Central", "Labour Party"),
            a(1997, "Tom Walsh", "Wexford", "Labour"),
        ];
        let tb = vec![
            b(1997, "Tom Walsh", "Wexford", "Labour Party"),
            b(2011, "Seán Murphy", "Kerry South", "Fianna Fáil"),
            b(2011, "Mary OBrien", "Dublin South Central", "Labour"),
            b(1997, "Jon Smith", "Cork South West", "Fine Gael"),
            b(2016, "Ann Nolan", "Dublin Bay North", "Social Democrats"),
        ];
        (ta, tb)
    }

    #[test]
    fn test_deterministic_and_covering() {
        let (ta, tb) = mixed_tables();
        let t = MatchThresholds::default();
        let first = match_records(&ta, &tb, &t);
        let second = match_records(&ta, &tb, &t);
        assert_eq!(first, second);

        let unmatched_a = (0..ta.len()).filter(|i| !first.matched_a().contains(i)).count();
        let unmatched_b = (0..tb.len()).filter(|i| !first.matched_b.contains(i)).count();
        assert_eq!(ta.len(), first.pairs.len() + unmatched_a);
        assert_eq!(tb.len(), first.pairs.len() + unmatched_b);
        // ascending A order
        assert!(first.pairs.windows(2).all(|w| w[0].a < w[1].a));
    }

    #[test]
    fn test_parallel_agrees_with_sequential() {
        let (ta, tb) = mixed_tables();
        let t = MatchThresholds::default();
        assert_eq!(match_records(&ta, &tb, &t), match_records_par(&ta, &tb, &t));
    }

    #[test]
    fn test_no_b_rows_in_year() {
        let ta = vec![a(1918, "Constance Markievicz", "Dublin St Patrick's", "Sinn Fein")];
        let out = match_records(&ta, &[], &MatchThresholds::default());
        assert_eq!(MatchOutcome::default(), out);
    }
}
