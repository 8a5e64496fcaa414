//! The general-elections subset and the statistics summary computed over it.

use indexmap::IndexMap;
use itertools::Itertools;
use std::collections::BTreeMap;
use tracing::info;

use crate::model::{AnalysisRecord, CandidacyRecord, ElectionType};

/// Keep only GENERAL (Dáil) rows, and tag them with `decade` and `won`.
pub fn create_analysis_dataset(records: &[CandidacyRecord]) -> Vec<AnalysisRecord> {
    info!("Creating analysis dataset");
    let subset: Vec<AnalysisRecord> = records
        .iter()
        .filter(|r| r.election_type == Some(ElectionType::GENERAL))
        .cloned()
        .map(AnalysisRecord::from_record)
        .collect();

    info!("\tDáil elections dataset: {} records", subset.len());
    if let (Some(lo), Some(hi)) = (
        subset.iter().map(|r| r.record.year).min(),
        subset.iter().map(|r| r.record.year).max(),
    ) {
        info!("\tYear range: {} - {}", lo, hi);
    }
    subset
}

/// Rounds to `places` decimal places, half away from zero.
fn round_to(x: f64, places: i32) -> f64 {
    let m = 10f64.powi(places);
    (x * m).round() / m
}

fn mean(xs: &[f64]) -> Option<f64> {
    if xs.is_empty() {
        None
    } else {
        Some(xs.iter().sum::<f64>() / xs.len() as f64)
    }
}

fn median(xs: &[f64]) -> Option<f64> {
    if xs.is_empty() {
        return None;
    }
    let mut sorted = xs.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Sample standard deviation (n - 1); needs at least two values.
fn sample_std(xs: &[f64]) -> Option<f64> {
    if xs.len() < 2 {
        return None;
    }
    let m = mean(xs)?;
    let ss: f64 = xs.iter().map(|x| (x - m).powi(2)).sum();
    Some((ss / (xs.len() - 1) as f64).sqrt())
}

/// A loser whose first preferences alone exceeded the quota.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Anomaly {
    pub year: i32,
    pub candidate: String,
    pub constituency_clean: String,
    pub quota_ratio: f64,
}

/// Per-party aggregates, stored column-wise and keyed by party.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct PartyPerformance {
    pub wins: IndexMap<String, usize>,
    pub total_candidates: IndexMap<String, usize>,
    pub avg_quota_ratio: IndexMap<String, Option<f64>>,
    /// Percent.
    pub win_rate: IndexMap<String, f64>,
}

/// Per-decade aggregates, stored column-wise and keyed by decade.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct DecadeStats {
    pub unique_candidates: IndexMap<i32, usize>,
    pub constituencies: IndexMap<i32, usize>,
    pub seats_filled: IndexMap<i32, usize>,
}

/// Per-year aggregates, stored column-wise and keyed by year.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct YearStats {
    pub total_candidates: IndexMap<i32, usize>,
    pub seats_filled: IndexMap<i32, usize>,
    pub constituencies: IndexMap<i32, usize>,
    pub candidates_per_seat: IndexMap<i32, Option<f64>>,
}

/// Everything written to the statistics JSON.
/// Statistics over an empty group come out as `null`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ElectionStatistics {
    pub winners_mean_quota: Option<f64>,
    pub winners_median_quota: Option<f64>,
    pub winners_std_quota: Option<f64>,
    pub losers_mean_quota: Option<f64>,
    pub losers_median_quota: Option<f64>,
    pub losers_std_quota: Option<f64>,
    pub quota_gap: Option<f64>,
    pub exceeded_quota_but_lost: usize,
    pub anomaly_records: Vec<Anomaly>,
    pub party_performance: PartyPerformance,
    pub by_decade: DecadeStats,
    pub by_year: YearStats,
}

#[derive(Default)]
struct PartyAcc {
    wins: usize,
    total: usize,
    quotas: Vec<f64>,
}

fn party_performance(subset: &[AnalysisRecord], top_parties: usize) -> PartyPerformance {
    let mut acc: BTreeMap<&str, PartyAcc> = BTreeMap::new();
    for r in subset {
        let e = acc.entry(r.record.party_canonical.as_str()).or_default();
        e.total += 1;
        if r.won {
            e.wins += 1;
        }
        if let Some(q) = r.record.quota_ratio {
            e.quotas.push(q);
        }
    }

    // most wins first, alphabetical among equals (the map is already alphabetical)
    let mut ranked: Vec<(&str, PartyAcc)> = acc.into_iter().collect();
    ranked.sort_by(|x, y| y.1.wins.cmp(&x.1.wins));
    ranked.truncate(top_parties);

    let mut pp = PartyPerformance::default();
    for (party, a) in ranked {
        let party = party.to_string();
        pp.wins.insert(party.clone(), a.wins);
        pp.total_candidates.insert(party.clone(), a.total);
        pp.avg_quota_ratio
            .insert(party.clone(), mean(&a.quotas).map(|m| round_to(m, 3)));
        pp.win_rate.insert(
            party,
            round_to(a.wins as f64 / a.total as f64 * 100.0, 1),
        );
    }
    pp
}

fn by_decade(subset: &[AnalysisRecord]) -> DecadeStats {
    let mut groups: BTreeMap<i32, Vec<&AnalysisRecord>> = BTreeMap::new();
    for r in subset {
        groups.entry(r.decade).or_default().push(r);
    }

    let mut ds = DecadeStats::default();
    for (decade, rows) in groups {
        let ids = rows
            .iter()
            .filter_map(|r| r.record.candidate_id)
            .unique()
            .count();
        let constituencies = rows
            .iter()
            .map(|r| r.record.constituency_canonical.as_str())
            .unique()
            .count();
        ds.unique_candidates.insert(decade, ids);
        ds.constituencies.insert(decade, constituencies);
        ds.seats_filled
            .insert(decade, rows.iter().filter(|r| r.won).count());
    }
    ds
}

fn by_year(subset: &[AnalysisRecord]) -> YearStats {
    let mut groups: BTreeMap<i32, Vec<&AnalysisRecord>> = BTreeMap::new();
    for r in subset {
        groups.entry(r.record.year).or_default().push(r);
    }

    let mut ys = YearStats::default();
    for (year, rows) in groups {
        let seats = rows.iter().filter(|r| r.won).count();
        let constituencies = rows
            .iter()
            .map(|r| r.record.constituency_canonical.as_str())
            .unique()
            .count();
        ys.total_candidates.insert(year, rows.len());
        ys.seats_filled.insert(year, seats);
        ys.constituencies.insert(year, constituencies);
        let per_seat = if seats == 0 {
            None
        } else {
            Some(round_to(rows.len() as f64 / seats as f64, 2))
        };
        ys.candidates_per_seat.insert(year, per_seat);
    }
    ys
}

/// Summarise the analysis subset.
pub fn compute_statistics(subset: &[AnalysisRecord], top_parties: usize) -> ElectionStatistics {
    info!("Computing statistics");

    let winners: Vec<f64> = subset
        .iter()
        .filter(|r| r.won)
        .filter_map(|r| r.record.quota_ratio)
        .collect();
    let losers: Vec<f64> = subset
        .iter()
        .filter(|r| !r.won)
        .filter_map(|r| r.record.quota_ratio)
        .collect();

    let anomaly_records: Vec<Anomaly> = subset
        .iter()
        .filter(|r| !r.won)
        .filter_map(|r| {
            r.record
                .quota_ratio
                .filter(|q| *q > 1.0)
                .map(|q| Anomaly {
                    year: r.record.year,
                    candidate: r.record.candidate.clone(),
                    constituency_clean: r.record.constituency_canonical.clone(),
                    quota_ratio: q,
                })
        })
        .collect();

    let winners_mean_quota = mean(&winners);
    let losers_mean_quota = mean(&losers);
    let quota_gap = match (winners_mean_quota, losers_mean_quota) {
        (Some(w), Some(l)) => Some(w - l),
        _ => None,
    };

    let stats = ElectionStatistics {
        winners_mean_quota,
        winners_median_quota: median(&winners),
        winners_std_quota: sample_std(&winners),
        losers_mean_quota,
        losers_median_quota: median(&losers),
        losers_std_quota: sample_std(&losers),
        quota_gap,
        exceeded_quota_but_lost: anomaly_records.len(),
        anomaly_records,
        party_performance: party_performance(subset, top_parties),
        by_decade: by_decade(subset),
        by_year: by_year(subset),
    };

    if let (Some(w), Some(l)) = (stats.winners_mean_quota, stats.losers_mean_quota) {
        info!("\tWinners avg quota ratio: {:.2}", w);
        info!("\tLosers avg quota ratio: {:.2}", l);
    }
    info!(
        "\tCandidates who exceeded quota but lost: {}",
        stats.exceeded_quota_but_lost
    );
    stats
}
