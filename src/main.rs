/// dailmerge: reconciling and merging two historical Irish election datasets, and
/// summarising the result.
/// Released under the MIT or Apache-2.0 licenses, at your option.
#[macro_use]
extern crate serde_derive;

use clap::Parser;
use color_eyre::eyre::Result;
use tracing::level_filters::LevelFilter;

mod analysis;
mod app;
mod config;
mod matcher;
mod merger;
mod model;
mod normalize;
mod report;
mod sources;
mod tables;

/// clap-verbosity-flag speaks `log`; our subscriber speaks `tracing`.
fn tracing_level(level: log::LevelFilter) -> LevelFilter {
    match level {
        log::LevelFilter::Off => LevelFilter::OFF,
        log::LevelFilter::Error => LevelFilter::ERROR,
        log::LevelFilter::Warn => LevelFilter::WARN,
        log::LevelFilter::Info => LevelFilter::INFO,
        log::LevelFilter::Debug => LevelFilter::DEBUG,
        log::LevelFilter::Trace => LevelFilter::TRACE,
    }
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = app::Cli::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(tracing_level(cli.verbose.log_level_filter()))
        .without_time()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    app::actual(cli)
}
