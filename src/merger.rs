//! Combining matched pairs into single records, and carrying everything else across.

use tracing::info;

use crate::model::{CandidacyRecord, CandidateId, MatchPair, Source};
use crate::matcher::MatchOutcome;

/// What went into the unified table.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MergeSummary {
    pub merged: usize,
    pub unmatched_a: usize,
    pub unmatched_b: usize,
    /// The first identifier handed out to an unmatched B row.
    pub first_new_id: CandidateId,
}

impl MergeSummary {
    pub fn total(&self) -> usize {
        self.merged + self.unmatched_a + self.unmatched_b
    }

    /// The last identifier handed out, if any were.
    pub fn last_new_id(&self) -> Option<CandidateId> {
        (self.unmatched_b > 0).then(|| self.first_new_id + self.unmatched_b as CandidateId - 1)
    }
}

/// The longer of two raw constituency strings, by characters. Ties go to `a`.
fn longer<'s>(a: &'s str, b: &'s str) -> &'s str {
    if b.chars().count() > a.chars().count() {
        b
    } else {
        a
    }
}

fn non_empty_or(a: &str, b: &str) -> String {
    if a.is_empty() { b } else { a }.to_string()
}

/// Combine one matched pair.
///
/// A is authoritative for identity and classification, and for the first-preference
/// count. B's percentages and quota ratios are preferred where it has them.
pub fn merge_pair(a: &CandidacyRecord, b: &CandidacyRecord) -> CandidacyRecord {
    CandidacyRecord {
        year: a.year,
        candidate: a.candidate.clone(),
        candidate_id: a.candidate_id,
        constituency_raw: longer(&a.constituency_raw, &b.constituency_raw).to_string(),
        constituency_canonical: non_empty_or(
            &a.constituency_canonical,
            &b.constituency_canonical,
        ),
        party_raw: a.party_raw.clone(),
        party_canonical: non_empty_or(&a.party_canonical, &b.party_canonical),
        // both are always known once loaded
        elected: a.elected,
        election_type: a.election_type,
        first_pref_count: a.first_pref_count.or(b.first_pref_count),
        first_pref_pct: b.first_pref_pct.or(a.first_pref_pct),
        quota_ratio: b.quota_ratio.or(a.quota_ratio),
        source: Source::Merged,
    }
}

/// The first identifier free for assignment: one past the largest A identifier.
pub fn next_free_id(table_a: &[CandidacyRecord]) -> CandidateId {
    table_a
        .iter()
        .filter_map(|r| r.candidate_id)
        .max()
        .map_or(1, |m| m + 1)
}

/// Build the unified table: merged pairs (in pair order), then unmatched A rows,
/// then unmatched B rows with freshly assigned identifiers. Both inputs keep their
/// row order within their block.
pub fn merge(
    table_a: &[CandidacyRecord],
    table_b: &[CandidacyRecord],
    outcome: &MatchOutcome,
) -> (Vec<CandidacyRecord>, MergeSummary) {
    info!("Merging datasets");

    let matched_a = outcome.matched_a();
    let first_new_id = next_free_id(table_a);

    let mut out = Vec::with_capacity(table_a.len() + table_b.len() - outcome.matched_b.len());

    for &MatchPair { a, b } in &outcome.pairs {
        out.push(merge_pair(&table_a[a], &table_b[b]));
    }
    let merged = out.len();

    out.extend(
        table_a
            .iter()
            .enumerate()
            .filter(|(i, _)| !matched_a.contains(i))
            .map(|(_, r)| r.clone()),
    );
    let unmatched_a = out.len() - merged;

    let mut next_id = first_new_id;
    for (_, rec) in table_b
        .iter()
        .enumerate()
        .filter(|(i, _)| !outcome.matched_b.contains(i))
    {
        let mut rec = rec.clone();
        rec.candidate_id = Some(next_id);
        next_id += 1;
        out.push(rec);
    }
    let unmatched_b = out.len() - merged - unmatched_a;

    let summary = MergeSummary {
        merged,
        unmatched_a,
        unmatched_b,
        first_new_id,
    };
    info!(
        "\t{} merged, {} only in A, {} only in B ({} total)",
        merged,
        unmatched_a,
        unmatched_b,
        summary.total()
    );
    (out, summary)
}
