//! The main app logic: argument structs and most top-level functions

use color_eyre::eyre::{Context, ContextCompat, Result};
use std::fs::{create_dir_all, File};
use std::io::BufWriter;
use std::path::PathBuf;
use tracing::{info, warn};

use crate::analysis::{compute_statistics, create_analysis_dataset};
use crate::config::{self, Scenario};
use crate::matcher::{match_records, match_records_par};
use crate::merger::{merge, MergeSummary};
use crate::model::CandidacyRecord;
use crate::normalize::{
    canonicalize_constituency, canonicalize_party, classify_elected_status,
    classify_election_type, derive_year,
};
use crate::report::print_table;
use crate::sources::{
    load_merged, load_source, write_analysis, write_merged, ELECTIONS_IRELAND, IRELAND_ELECTION,
};
use clap::{Parser, Subcommand, ValueEnum, ValueHint};
use clap_verbosity_flag::{InfoLevel, Verbosity};

#[derive(Parser, Debug)]
#[clap(version, about, propagate_version = true)]
pub struct Cli {
    #[clap(flatten)]
    pub verbose: Verbosity<InfoLevel>,

    // We have an enum inside the struct to allow for global options here...
    #[clap(subcommand)]
    pub command: CliCommands,
}

#[derive(Subcommand, Debug)]
pub enum CliCommands {
    Canon(CliCanon),
    /// Print an example configuration (TOML format)
    Example,
    List(CliList),
    Run(CliRun),
}

/// List scenarios from the configuration file.
#[derive(Parser, Debug, PartialEq)]
#[clap(
    after_help = "Scenario tables are printed to standard output. If that's a terminal, they'll be pretty-printed with elastic tabstops. If that's a pipe or file, they'll be tab-separated to make further processing as straightforward as possible."
)]
pub struct CliList {
    /// The configuration file to list scenarios from
    #[clap(value_parser, value_hint = ValueHint::FilePath)]
    pub configfile: PathBuf,
}

/// Run scenarios from the configuration file.
#[derive(Parser, Debug, PartialEq)]
pub struct CliRun {
    /// Run a specific phase
    #[clap(long, value_enum, default_value_t = CliRunPhase::All)]
    pub phase: CliRunPhase,

    /// Run a SPECIFIC scenario from the configuration file (can be given multiple times to run several scenarios)
    #[clap(long, short, value_parser)]
    pub scenario: Option<Vec<String>>,

    /// The configuration file to run
    #[clap(value_parser, value_hint = ValueHint::FilePath)]
    pub configfile: PathBuf,
}

#[derive(ValueEnum, Debug, PartialEq, Eq, Clone, Copy)]
pub enum CliRunPhase {
    /// Run all phases (default)
    All,
    /// Load, normalise, match and merge the two sources; write the merged table
    Merge,
    /// Read an existing merged table; write the Dáil subset and statistics
    Analyse,
}

impl CliRunPhase {
    fn merges(self) -> bool {
        self != Self::Analyse
    }

    fn analyses(self) -> bool {
        self != Self::Merge
    }
}

/// Show how a single value is canonicalised.
#[derive(Parser, Debug, PartialEq)]
pub struct CliCanon {
    /// What kind of value this is
    #[clap(value_enum)]
    pub kind: CliCanonKind,

    /// The value itself, as it appears in a source
    #[clap(value_parser)]
    pub value: String,
}

#[derive(ValueEnum, Debug, PartialEq, Eq, Clone, Copy)]
pub enum CliCanonKind {
    Constituency,
    Party,
    ElectionType,
    Year,
    Elected,
}

/// Load both sources, match, merge and write the merged table.
fn merge_phase(scenario: &Scenario) -> Result<(Vec<CandidacyRecord>, MergeSummary)> {
    let table_a = load_source(&scenario.source_a, &ELECTIONS_IRELAND)
        .context("Could not load the ElectionsIreland source; stopping.")?;
    let table_b = load_source(&scenario.source_b, &IRELAND_ELECTION)
        .context("Could not load the IrelandElection source; stopping.")?;
    if table_a.is_empty() || table_b.is_empty() {
        warn!(
            "Scenario {} has an empty source; nothing will be matched",
            scenario.name
        );
    }

    let outcome = if scenario.parallel {
        match_records_par(&table_a, &table_b, &scenario.thresholds)
    } else {
        match_records(&table_a, &table_b, &scenario.thresholds)
    };
    let (merged, summary) = merge(&table_a, &table_b, &outcome);

    write_merged(&scenario.merged_path, &merged)
        .context("Could not write merged table; stopping.")?;
    info!("\tSaved: {}", scenario.merged_path.display());
    Ok((merged, summary))
}

/// Derive the Dáil subset from merged records; write it and the statistics.
fn analyse_phase(scenario: &Scenario, merged: &[CandidacyRecord]) -> Result<()> {
    let subset = create_analysis_dataset(merged);
    write_analysis(&scenario.analysis_path, &subset)
        .context("Could not write analysis table; stopping.")?;
    info!("\tSaved: {}", scenario.analysis_path.display());

    let stats = compute_statistics(&subset, scenario.top_parties);
    if let Some(parent) = scenario.stats_path.parent() {
        create_dir_all(parent)
            .with_context(|| format!("Couldn't create directory {}", parent.display()))?;
    }
    let outfile = File::create(&scenario.stats_path).with_context(|| {
        format!("Couldn't create {}", scenario.stats_path.display())
    })?;
    serde_json::to_writer_pretty(BufWriter::new(outfile), &stats)
        .context("Could not write statistics; stopping.")?;
    info!("\tSaved: {}", scenario.stats_path.display());
    Ok(())
}

/// Performs the `run` subcommand.
pub fn run(args: CliRun) -> Result<()> {
    let cfgpath = args.configfile;

    // Get data out of config
    let cfg = config::get_scenarios(&config::get_cfg_doc_from_path(&cfgpath)?)?;

    let scenario_names: Vec<String> = args
        .scenario
        .unwrap_or_else(|| cfg.keys().cloned().collect());

    let mut summaries: Vec<(String, MergeSummary)> = Vec::new();

    for scen_name in scenario_names {
        let scenario = cfg.get(&scen_name).with_context(|| {
            format!(
                "Requested scenario {} not found in configuration file.",
                scen_name
            )
        })?;
        info!("Running Scenario {}", scen_name);

        let merged = if args.phase.merges() {
            let (merged, summary) = merge_phase(scenario)?;
            summaries.push((scen_name.clone(), summary));
            Some(merged)
        } else {
            None
        };

        if args.phase.analyses() {
            let merged = match merged {
                Some(m) => m,
                None => load_merged(&scenario.merged_path).with_context(|| {
                    format!(
                        "Could not read merged table for {}; has the merge phase been run?",
                        scen_name
                    )
                })?,
            };
            analyse_phase(scenario, &merged)?;
        }
    }

    if !summaries.is_empty() {
        let headers = ["Scenario", "Merged", "Only A", "Only B", "Total", "New IDs"];
        let rows: Vec<Vec<String>> = summaries
            .iter()
            .map(|(name, s)| {
                let new_ids = s
                    .last_new_id()
                    .map_or_else(|| "-".to_string(), |last| format!("{}-{}", s.first_new_id, last));
                vec![
                    name.clone(),
                    s.merged.to_string(),
                    s.unmatched_a.to_string(),
                    s.unmatched_b.to_string(),
                    s.total().to_string(),
                    new_ids,
                ]
            })
            .collect();
        print_table(&headers, &rows)?;
    }
    info!("Done!");
    Ok(())
}

/// What the normaliser makes of one value; `null` when it can't tell.
pub fn canon(kind: CliCanonKind, value: &str) -> String {
    fn or_null<T: ToString>(x: Option<T>) -> String {
        x.map_or_else(|| "null".to_string(), |v| v.to_string())
    }
    match kind {
        CliCanonKind::Constituency => canonicalize_constituency(value),
        CliCanonKind::Party => canonicalize_party(Some(value)),
        CliCanonKind::ElectionType => or_null(classify_election_type(value)),
        CliCanonKind::Year => or_null(derive_year(value)),
        CliCanonKind::Elected => or_null(classify_elected_status(value)),
    }
}

/// Prints an example configuration TOML to standard output.
pub fn print_example_config() {
    println!("{}", include_str!("../example_config.toml"));
}

/// Does the top-level command.
pub fn actual(m: Cli) -> Result<()> {
    use CliCommands::*;
    match m.command {
        Canon(sm) => println!("{}", canon(sm.kind, &sm.value)),
        Example => print_example_config(),
        List(sm) => config::list_scenarios(&sm.configfile)?,
        Run(sm) => run(sm)?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tables::{read_table, write_table, OutColumn};
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run() {
        let cli = Cli::parse_from([
            "dailmerge", "-v", "run", "--phase", "analyse", "-s", "full", "-s", "csv", "cfg.toml",
        ]);
        match cli.command {
            CliCommands::Run(r) => {
                assert_eq!(CliRunPhase::Analyse, r.phase);
                assert_eq!(Some(vec!["full".to_string(), "csv".to_string()]), r.scenario);
                assert_eq!(PathBuf::from("cfg.toml"), r.configfile);
            }
            other => panic!("parsed as {:?}", other),
        }
        let cli = Cli::parse_from(["dailmerge", "run", "cfg.toml"]);
        match cli.command {
            CliCommands::Run(r) => assert_eq!(CliRunPhase::All, r.phase),
            other => panic!("parsed as {:?}", other),
        }
    }

    #[test]
    fn test_phases() {
        assert!(CliRunPhase::All.merges() && CliRunPhase::All.analyses());
        assert!(CliRunPhase::Merge.merges() && !CliRunPhase::Merge.analyses());
        assert!(!CliRunPhase::Analyse.merges() && CliRunPhase::Analyse.analyses());
    }

    #[test]
    fn test_canon() {
        assert_eq!("Labour Party", canon(CliCanonKind::Party, "Labour"));
        assert_eq!("GENERAL", canon(CliCanonKind::ElectionType, "Dáil Election"));
        assert_eq!("null", canon(CliCanonKind::ElectionType, "Referendum"));
        assert_eq!("2011", canon(CliCanonKind::Year, "25 February 2011"));
        assert_eq!("true", canon(CliCanonKind::Elected, " Elected "));
        assert_eq!("null", canon(CliCanonKind::Elected, "Withdrew"));
        let cli = Cli::parse_from(["dailmerge", "canon", "election-type", "seanad"]);
        match cli.command {
            CliCommands::Canon(c) => assert_eq!(CliCanonKind::ElectionType, c.kind),
            other => panic!("parsed as {:?}", other),
        }
    }

    fn text(cells: &[&str]) -> OutColumn {
        OutColumn::Text(cells.iter().map(|c| Some(c.to_string())).collect())
    }

    #[test]
    fn test_run_end_to_end() {
        let dir = std::env::temp_dir().join(format!("dailmerge-app-{}", std::process::id()));
        create_dir_all(&dir).unwrap();
        let a_path = dir.join("ei.csv");
        let b_path = dir.join("ie.csv");
        write_table(
            &a_path,
            &[
                ("ID", text(&["10", "11"])),
                ("date", text(&["25 February 2011", "25 February 2011"])),
                ("election_type", text(&["Dáil Election", "Dáil Election"])),
                ("status", text(&["Elected", "Not Elected"])),
                ("constituency_name", text(&["Dublin South-Central", "Kerry South"])),
                ("party", text(&["Labour Party", "Fianna Fáil"])),
                ("candidate", text(&["Mary O'Brien", "Sean Murphy"])),
                ("first_pref_count", text(&["8000", "3000"])),
                ("first_pref_pct", text(&["", "7.5"])),
                ("pct_of_quota_reached_with_first_pref", text(&["1.1", "0.4"])),
            ],
        )
        .unwrap();
        write_table(
            &b_path,
            &[
                ("year", text(&["2011.0", "2016.0"])),
                ("candidate", text(&["Mary OBrien", "Ann Nolan"])),
                ("constituency", text(&["Dublin South Central", "Dublin Bay North"])),
                ("party", text(&["Labour", "Social Democrats"])),
                ("elected", text(&["true", "false"])),
                ("election_type", text(&["GENERAL", "GENERAL"])),
                ("first_pref_count", text(&["7999", "1200"])),
                ("first_pref_pct", text(&["12.5", "3.0"])),
                ("first_pref_quota_ratio", text(&["1.05", "0.2"])),
            ],
        )
        .unwrap();
        let cfg_path = dir.join("cfg.toml");
        std::fs::write(
            &cfg_path,
            format!(
                "[DEFAULT]\nSOURCE_A_PATH = {:?}\nSOURCE_B_PATH = {:?}\nOUTPUT_DIR = {:?}\n\
                 MERGED_FN = \"merged.csv\"\nANALYSIS_FN = \"dail.csv\"\n[t]\n",
                a_path.display().to_string(),
                b_path.display().to_string(),
                dir.join("out").display().to_string()
            ),
        )
        .unwrap();

        run(CliRun {
            phase: CliRunPhase::All,
            scenario: None,
            configfile: cfg_path.clone(),
        })
        .unwrap();

        let merged = load_merged(&dir.join("out/t/merged.csv")).unwrap();
        assert_eq!(3, merged.len());
        assert_eq!("Mary O'Brien", merged[0].candidate);
        assert_eq!(Some(8000.0), merged[0].first_pref_count);
        assert_eq!(Some(12.5), merged[0].first_pref_pct);
        assert_eq!(Some(1.05), merged[0].quota_ratio);
        assert_eq!(Some(12), merged[2].candidate_id);

        let dail = read_table(&dir.join("out/t/dail.csv")).unwrap();
        assert_eq!(3, dail.len());
        assert!(dail.headers().iter().any(|h| h == "decade"));

        let stats: serde_json::Value = serde_json::from_reader(
            File::open(dir.join("out/t/election_statistics.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(0, stats["exceeded_quota_but_lost"]);
        assert_eq!(1, stats["party_performance"]["wins"]["Labour Party"]);

        // the analysis phase alone reads back what the merge phase wrote
        std::fs::remove_file(dir.join("out/t/election_statistics.json")).unwrap();
        run(CliRun {
            phase: CliRunPhase::Analyse,
            scenario: Some(vec!["t".to_string()]),
            configfile: cfg_path.clone(),
        })
        .unwrap();
        assert!(dir.join("out/t/election_statistics.json").exists());

        assert!(run(CliRun {
            phase: CliRunPhase::All,
            scenario: Some(vec!["missing".to_string()]),
            configfile: cfg_path,
        })
        .is_err());
        std::fs::remove_dir_all(&dir).ok();
    }
}
