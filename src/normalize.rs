//! Canonicalization of the raw fields of both sources.
//!
//! None of these functions fail: a value that can't be mapped either falls back to
//! its raw text (names) or becomes `None` (year, election type, elected status),
//! and the loaders decide what to do with the row.

use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use std::collections::HashMap;
use strsim::jaro_winkler;

use crate::model::ElectionType;

/// Variant constituency names and what they should be called.
/// Canonical names also map to themselves.
const CONSTITUENCY_ALIASES: &[(&str, &str)] = &[
    ("Carlow Kilkenny", "Carlow–Kilkenny"),
    ("Carlow-Kilkenny", "Carlow–Kilkenny"),
    ("Carlow–Kilkenny", "Carlow–Kilkenny"),
    ("Cavan Monaghan", "Cavan–Monaghan"),
    ("Cavan-Monaghan", "Cavan–Monaghan"),
    ("Cavan–Monaghan", "Cavan–Monaghan"),
    ("Cork South Central", "Cork South-Central"),
    ("Cork South–Central", "Cork South-Central"),
    ("Cork South-Central", "Cork South-Central"),
    ("Cork North Central", "Cork North-Central"),
    ("Cork North–Central", "Cork North-Central"),
    ("Cork North-Central", "Cork North-Central"),
    ("Cork South West", "Cork South-West"),
    ("Cork South–West", "Cork South-West"),
    ("Cork South-West", "Cork South-West"),
    ("Cork North West", "Cork North-West"),
    ("Cork North–West", "Cork North-West"),
    ("Cork North-West", "Cork North-West"),
    ("Dublin Mid West", "Dublin Mid-West"),
    ("Dublin Mid–West", "Dublin Mid-West"),
    ("Dublin Mid-West", "Dublin Mid-West"),
    ("Dublin North West", "Dublin North-West"),
    ("Dublin North–West", "Dublin North-West"),
    ("Dublin North-West", "Dublin North-West"),
    ("Dublin South West", "Dublin South-West"),
    ("Dublin South–West", "Dublin South-West"),
    ("Dublin South-West", "Dublin South-West"),
    ("Dublin South Central", "Dublin South-Central"),
    ("Dublin South–Central", "Dublin South-Central"),
    ("Dublin South-Central", "Dublin South-Central"),
    ("Dun Laoghaire", "Dún Laoghaire"),
    ("Dun Laoghaire Rathdown", "Dún Laoghaire"),
    ("Dún Laoghaire", "Dún Laoghaire"),
    // "Leix" and "Laoighis" are older spellings of Laois
    ("Leix Offaly", "Laois–Offaly"),
    ("Laoighis Offaly", "Laois–Offaly"),
    ("Laois Offaly", "Laois–Offaly"),
    ("Laois-Offaly", "Laois–Offaly"),
    ("Laois–Offaly", "Laois–Offaly"),
    ("Longford Westmeath", "Longford–Westmeath"),
    ("Longford-Westmeath", "Longford–Westmeath"),
    ("Longford–Westmeath", "Longford–Westmeath"),
    ("Sligo Leitrim", "Sligo–Leitrim"),
    ("Sligo-Leitrim", "Sligo–Leitrim"),
    ("Sligo–Leitrim", "Sligo–Leitrim"),
    ("Roscommon Galway", "Roscommon–Galway"),
    ("Roscommon-Galway", "Roscommon–Galway"),
    ("Roscommon–Galway", "Roscommon–Galway"),
];

/// Variant party names and what they should be called.
/// Order matters: the fuzzy fallback takes the first key that's close enough.
const PARTY_ALIASES: &[(&str, &str)] = &[
    ("Labour", "Labour Party"),
    ("Labour Party", "Labour Party"),
    ("Fianna Fail", "Fianna Fáil"),
    ("Fianna Fáil", "Fianna Fáil"),
    ("Fine Gael", "Fine Gael"),
    ("Sinn Fein", "Sinn Féin"),
    ("Sinn Féin", "Sinn Féin"),
    ("Green/Comhaontas Glas", "Green Party"),
    ("Green Party", "Green Party"),
    ("Non party/Independent", "Independent"),
    ("Independent", "Independent"),
    ("Republican", "Sinn Féin"), // pre-split
    ("Progressive Democrats", "Progressive Democrats"),
    ("Workers Party", "Workers' Party"),
    ("Workers' Party", "Workers' Party"),
    ("Democratic Left", "Democratic Left"),
    ("People Before Profit", "People Before Profit"),
    ("Solidarity - People Before Profit", "Solidarity–PBP"),
    ("Solidarity–PBP", "Solidarity–PBP"),
    ("Social Democrats", "Social Democrats"),
    ("Aontú", "Aontú"),
    ("Renua", "Renua Ireland"),
    ("Renua Ireland", "Renua Ireland"),
];

/// Canonical party name for a missing party.
pub const UNKNOWN_PARTY: &str = "Unknown";

/// Jaro-Winkler score a party name must strictly exceed to borrow an alias.
pub const PARTY_FUZZY_THRESHOLD: f64 = 0.9;

static CONSTITUENCY_MAP: Lazy<HashMap<&'static str, &'static str>> =
    Lazy::new(|| CONSTITUENCY_ALIASES.iter().copied().collect());

static PARTY_MAP: Lazy<HashMap<&'static str, &'static str>> =
    Lazy::new(|| PARTY_ALIASES.iter().copied().collect());

/// Keyword patterns per election type, in priority order.
static ELECTION_TYPE_PATTERNS: Lazy<Vec<(ElectionType, Regex)>> = Lazy::new(|| {
    [
        (ElectionType::LOCAL, r"local|town"),
        (ElectionType::GENERAL, r"d[aá]il|general"),
        (ElectionType::SEANAD, r"seanad"),
        (ElectionType::WESTMINSTER, r"westminster"),
        (ElectionType::EUROPEAN, r"european"),
        (ElectionType::BYELECTION, r"by[ -]election"),
    ]
    .into_iter()
    .map(|(et, pat)| {
        let re = RegexBuilder::new(pat)
            .case_insensitive(true)
            .build()
            .expect("election type patterns are static and valid");
        (et, re)
    })
    .collect()
});

/// Replaces en- and em-dashes with a plain hyphen.
fn plain_dashes(input: &str) -> String {
    input.replace(['–', '—'], "-")
}

/// Resolve a constituency name through the alias table.
/// Unmapped names come back unchanged.
pub fn canonicalize_constituency(raw: &str) -> String {
    if let Some(canon) = CONSTITUENCY_MAP.get(raw) {
        return canon.to_string();
    }
    let dashed = plain_dashes(raw);
    if let Some(canon) = CONSTITUENCY_MAP.get(dashed.as_str()) {
        return canon.to_string();
    }
    raw.to_string()
}

/// Resolve a party name through the alias table, then by fuzzy match against the
/// alias keys, then fall back to the raw name. Missing parties are "Unknown".
pub fn canonicalize_party(raw: Option<&str>) -> String {
    let raw = match raw {
        Some(r) => r,
        None => return UNKNOWN_PARTY.to_string(),
    };
    if let Some(canon) = PARTY_MAP.get(raw) {
        return canon.to_string();
    }
    PARTY_ALIASES
        .iter()
        .find(|(key, _)| jaro_winkler(raw, key) > PARTY_FUZZY_THRESHOLD)
        .map_or_else(|| raw.to_string(), |(_, canon)| canon.to_string())
}

/// Pull an election year out of a date-ish field.
///
/// Four digits (`2011`, or a float-typed `2011.0`) are taken as-is; anything else is
/// assumed to end in the year, e.g. `"25 February 2011"`.
pub fn derive_year(raw: &str) -> Option<i32> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let (whole, frac) = raw.split_once('.').unwrap_or((raw, ""));
    if whole.len() == 4
        && whole.bytes().all(|b| b.is_ascii_digit())
        && frac.bytes().all(|b| b == b'0')
    {
        return whole.parse::<i32>().ok();
    }
    let char_count = raw.chars().count();
    if char_count < 4 {
        return None;
    }
    let tail: String = raw.chars().skip(char_count - 4).collect();
    tail.trim().parse::<i32>().ok()
}

/// Classify a free-text election label, e.g. "Dail Election" or "Town Commissioners".
pub fn classify_election_type(raw: &str) -> Option<ElectionType> {
    ELECTION_TYPE_PATTERNS
        .iter()
        .find(|(_, re)| re.is_match(raw))
        .map(|(et, _)| *et)
}

/// Decide whether a status string means elected.
///
/// Only unambiguous values count; "appointed", "resigned" and friends are `None`.
pub fn classify_elected_status(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "elected" | "true" => Some(true),
        "not elected" | "false" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn canonical_constituencies() -> Vec<&'static str> {
        let mut names: Vec<&str> = CONSTITUENCY_ALIASES.iter().map(|(_, c)| *c).collect();
        names.sort_unstable();
        names.dedup();
        names
    }

    #[test]
    fn test_constituency_aliases() {
        assert_eq!("Carlow–Kilkenny", canonicalize_constituency("Carlow Kilkenny"));
        assert_eq!("Laois–Offaly", canonicalize_constituency("Leix Offaly"));
        assert_eq!("Dún Laoghaire", canonicalize_constituency("Dun Laoghaire Rathdown"));
        assert_eq!(
            "Dublin South-Central",
            canonicalize_constituency("Dublin South Central")
        );
    }

    #[test]
    fn test_constituency_dash_fallback() {
        // only reachable after swapping the em-dash for a hyphen
        assert_eq!("Dublin Mid-West", canonicalize_constituency("Dublin Mid—West"));
        assert_eq!("Sligo–Leitrim", canonicalize_constituency("Sligo—Leitrim"));
    }

    #[test]
    fn test_constituency_unmapped_is_unchanged() {
        assert_eq!("Kerry North", canonicalize_constituency("Kerry North"));
        assert_eq!("", canonicalize_constituency(""));
        assert_eq!("Wicklow—East", canonicalize_constituency("Wicklow—East"));
    }

    #[test]
    fn test_constituency_idempotent() {
        let samples = [
            "Carlow Kilkenny",
            "Cork South–West",
            "Dun Laoghaire",
            "Laoighis Offaly",
            "Dublin Mid—West",
            "Galway West",
            "Wicklow—East",
            "",
        ];
        for s in samples.iter().chain(canonical_constituencies().iter()) {
            let once = canonicalize_constituency(s);
            assert_eq!(once, canonicalize_constituency(&once), "not idempotent: {}", s);
        }
    }

    #[test]
    fn test_party_aliases() {
        assert_eq!("Labour Party", canonicalize_party(Some("Labour")));
        assert_eq!("Sinn Féin", canonicalize_party(Some("Republican")));
        assert_eq!("Independent", canonicalize_party(Some("Non party/Independent")));
        assert_eq!(UNKNOWN_PARTY, canonicalize_party(None));
    }

    #[test]
    fn test_party_fuzzy_fallback() {
        assert_eq!("Fianna Fáil", canonicalize_party(Some("Fianna Fal")));
        assert_eq!("Progressive Democrats", canonicalize_party(Some("Progresive Democrats")));
        // nothing close enough
        assert_eq!("Clann na Poblachta", canonicalize_party(Some("Clann na Poblachta")));
    }

    #[test]
    fn test_derive_year() {
        assert_eq!(Some(2011), derive_year("2011"));
        assert_eq!(Some(1923), derive_year("1923.0"));
        assert_eq!(Some(2011), derive_year("25 February 2011"));
        assert_eq!(Some(1997), derive_year("06/06/1997"));
        assert_eq!(None, derive_year("sometime"));
        assert_eq!(None, derive_year("n/a"));
        assert_eq!(Some(2011), derive_year("2011.00"));
        // only the last four characters count
        assert_eq!(Some(2345), derive_year("12345"));
        assert_eq!(None, derive_year("1e3"));
        assert_eq!(None, derive_year("2011.5"));
        assert_eq!(None, derive_year(""));
    }

    #[test]
    fn test_classify_election_type() {
        use ElectionType::*;
        assert_eq!(Some(GENERAL), classify_election_type("Dail Election"));
        assert_eq!(Some(GENERAL), classify_election_type("Dáil Election"));
        assert_eq!(Some(GENERAL), classify_election_type("GENERAL"));
        assert_eq!(Some(LOCAL), classify_election_type("Town Commissioners"));
        assert_eq!(Some(LOCAL), classify_election_type("local"));
        assert_eq!(Some(SEANAD), classify_election_type("Seanad Election"));
        assert_eq!(Some(WESTMINSTER), classify_election_type("Westminster Election"));
        assert_eq!(Some(EUROPEAN), classify_election_type("European Parliament"));
        assert_eq!(Some(BYELECTION), classify_election_type("By Election"));
        assert_eq!(Some(BYELECTION), classify_election_type("BY-ELECTION"));
        assert_eq!(None, classify_election_type("Presidential"));
    }

    #[test]
    fn test_classify_election_type_priority() {
        // local beats by-election, general beats by-election
        assert_eq!(
            Some(ElectionType::LOCAL),
            classify_election_type("Local By-Election")
        );
        assert_eq!(
            Some(ElectionType::GENERAL),
            classify_election_type("Dail By Election")
        );
    }

    #[test]
    fn test_classify_elected_status() {
        assert_eq!(Some(true), classify_elected_status("Elected"));
        assert_eq!(Some(true), classify_elected_status("true"));
        assert_eq!(Some(false), classify_elected_status("Not Elected"));
        assert_eq!(Some(false), classify_elected_status("FALSE"));
        assert_eq!(None, classify_elected_status("Appointed"));
        assert_eq!(None, classify_elected_status("Resigned"));
        assert_eq!(None, classify_elected_status(""));
    }
}
