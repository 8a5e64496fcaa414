//! Loading of configuration files.
//!
//! We support a TOML setup that's otherwise consistent with Python's ConfigParser:
//! there's a special [DEFAULT] section, and then other, arbitrarily-named sections
//! after that, each of which is a scenario. Any key missing from a scenario is taken
//! from [DEFAULT] if it's there.
//! No interpolation, though.

use color_eyre::eyre::{bail, Context, ContextCompat, Result};
use std::collections::{BTreeMap, HashMap};
use std::fs::read_to_string;
use std::path::{Path, PathBuf};
use toml_edit::{Document, Item, Table};

use crate::matcher::MatchThresholds;
use crate::report::print_table;

const DEFAULT_SECTION: &str = "DEFAULT";

pub const DEFAULT_MERGED_FN: &str = "merged_elections_full.parquet";
pub const DEFAULT_ANALYSIS_FN: &str = "dail_elections_analysis.parquet";
pub const DEFAULT_STATS_FN: &str = "election_statistics.json";
pub const DEFAULT_TOP_PARTIES: usize = 10;

/// Reads and parses a configuration file.
pub fn get_cfg_doc_from_path(cfgpath: &Path) -> Result<Document> {
    read_to_string(cfgpath)
        .with_context(|| format!("Error reading config file {}", cfgpath.display()))?
        .parse::<Document>()
        .with_context(|| format!("Error parsing config file {}", cfgpath.display()))
}

#[derive(Debug, Clone, PartialEq)]
pub struct Scenario {
    pub name: String,
    /// ElectionsIreland data
    pub source_a: PathBuf,
    /// IrelandElection data
    pub source_b: PathBuf,
    /// OUTPUT_DIR/<name>
    pub output_dir: PathBuf,
    pub merged_path: PathBuf,
    pub analysis_path: PathBuf,
    pub stats_path: PathBuf,
    pub thresholds: MatchThresholds,
    pub top_parties: usize,
    pub parallel: bool,
}

/// A scenario's own keys, with [DEFAULT] behind them.
struct Lookup<'a> {
    scenario_name: &'a str,
    scenario: &'a Table,
    defaults: &'a HashMap<&'a str, &'a Item>,
}

impl<'a> Lookup<'a> {
    fn get(&self, key: &str) -> Option<&'a Item> {
        self.scenario
            .get(key)
            .or_else(|| self.defaults.get(key).copied())
    }

    fn str_opt(&self, key: &str) -> Result<Option<&'a str>> {
        match self.get(key) {
            None => Ok(None),
            Some(item) => item.as_str().map(Some).with_context(|| {
                format!("{} in scenario [{}] should be a string", key, self.scenario_name)
            }),
        }
    }

    fn str_req(&self, key: &str) -> Result<&'a str> {
        self.str_opt(key)?
            .with_context(|| format!("Missing {} for scenario [{}]", key, self.scenario_name))
    }

    /// Floats, or integers standing in for them.
    fn float_or(&self, key: &str, default: f64) -> Result<f64> {
        match self.get(key) {
            None => Ok(default),
            Some(item) => item
                .as_float()
                .or_else(|| item.as_integer().map(|i| i as f64))
                .with_context(|| {
                    format!("{} in scenario [{}] should be a number", key, self.scenario_name)
                }),
        }
    }

    fn int_or(&self, key: &str, default: usize) -> Result<usize> {
        match self.get(key) {
            None => Ok(default),
            Some(item) => {
                let i = item.as_integer().with_context(|| {
                    format!("{} in scenario [{}] should be an integer", key, self.scenario_name)
                })?;
                usize::try_from(i).with_context(|| {
                    format!("{} in scenario [{}] can't be negative", key, self.scenario_name)
                })
            }
        }
    }

    fn bool_or(&self, key: &str, default: bool) -> Result<bool> {
        match self.get(key) {
            None => Ok(default),
            Some(item) => item.as_bool().with_context(|| {
                format!("{} in scenario [{}] should be true or false", key, self.scenario_name)
            }),
        }
    }
}

/// Get all the Scenarios, with defaults suitably propagated and paths ready to use!
pub fn get_scenarios(cfg: &Document) -> Result<BTreeMap<String, Scenario>> {
    let mut out: BTreeMap<String, Scenario> = BTreeMap::new();
    let cfg = cfg.as_table();

    // We pop the contents of [DEFAULT] into a HashMap to avoid existence failure
    let mut defaults: HashMap<&str, &Item> = HashMap::new();
    if let Some(item) = cfg.get(DEFAULT_SECTION) {
        let table = item
            .as_table()
            .context("[DEFAULT] should be a table")?;
        for (key, item) in table.iter() {
            defaults.insert(key, item);
        }
    }

    for (scenario_key, scenario) in cfg.iter() {
        if scenario_key == DEFAULT_SECTION {
            continue;
        }
        let scenario = match scenario.as_table() {
            Some(t) => t,
            None => bail!(
                "Top-level key {} isn't a scenario; keys belong under [DEFAULT] or a [scenario]",
                scenario_key
            ),
        };
        let name = String::from(scenario_key);
        let look = Lookup {
            scenario_name: scenario_key,
            scenario,
            defaults: &defaults,
        };

        let source_a = PathBuf::from(look.str_req("SOURCE_A_PATH")?);
        let source_b = PathBuf::from(look.str_req("SOURCE_B_PATH")?);

        let mut output_dir = PathBuf::from(look.str_req("OUTPUT_DIR")?);
        output_dir.push(&name);

        let merged_path =
            output_dir.join(look.str_opt("MERGED_FN")?.unwrap_or(DEFAULT_MERGED_FN));
        let analysis_path =
            output_dir.join(look.str_opt("ANALYSIS_FN")?.unwrap_or(DEFAULT_ANALYSIS_FN));
        let stats_path = output_dir.join(look.str_opt("STATS_FN")?.unwrap_or(DEFAULT_STATS_FN));

        let dt = MatchThresholds::default();
        let thresholds = MatchThresholds {
            name: look.float_or("NAME_THRESHOLD", dt.name)?,
            constituency: look.float_or("CONSTITUENCY_THRESHOLD", dt.constituency)?,
            party: look.float_or("PARTY_THRESHOLD", dt.party)?,
            constituency_fallback: look
                .float_or("CONSTITUENCY_FALLBACK_THRESHOLD", dt.constituency_fallback)?,
        };

        let top_parties = look.int_or("TOP_PARTIES", DEFAULT_TOP_PARTIES)?;
        let parallel = look.bool_or("PARALLEL", false)?;

        out.insert(
            name.clone(),
            Scenario {
                name,
                source_a,
                source_b,
                output_dir,
                merged_path,
                analysis_path,
                stats_path,
                thresholds,
                top_parties,
                parallel,
            },
        );
    }

    Ok(out)
}

/// this function handles `dailmerge list`
pub fn list_scenarios(cfgpath: &Path) -> Result<()> {
    let headers = ["Scenario", "Source A", "Source B", "Output", "Matching"];
    let doc = get_cfg_doc_from_path(cfgpath)?;
    let scenarios = get_scenarios(&doc)?;
    let rows: Vec<Vec<String>> = scenarios
        .values()
        .map(|s| {
            vec![
                s.name.clone(),
                s.source_a.display().to_string(),
                s.source_b.display().to_string(),
                s.output_dir.display().to_string(),
                if s.parallel { "parallel" } else { "sequential" }.to_string(),
            ]
        })
        .collect();
    print_table(&headers, &rows)
}
