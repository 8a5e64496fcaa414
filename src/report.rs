//! Tables for the terminal.
//!
//! If standard output is a terminal, tables are laid out with elastic tabstops and a
//! bold header. Otherwise they're plain tab-separated values.

use color_eyre::eyre::{eyre, Result};
use std::io::Write;
use tabwriter::TabWriter;

/// Cease all formatting
pub const END: &str = "\u{1b}[0m";

/// Bold text
pub const BOLD: &str = "\u{1b}[1m";

/// Lay out `rows` under `headers` with elastic tabstops, header in bold.
pub fn pretty_table(headers: &[&str], rows: &[Vec<String>]) -> Result<String> {
    let mut tw = TabWriter::new(vec![]);
    writeln!(&mut tw, "{}", headers.join("\t"))?;
    for row in rows {
        writeln!(&mut tw, "{}", row.join("\t"))?;
    }
    tw.flush()?;
    let output = String::from_utf8(
        tw.into_inner()
            .map_err(|_| eyre!("Couldn't lay out table"))?,
    )?;
    // the header line always exists, since we wrote it
    let firstnewline = output.find('\n').unwrap_or(output.len());
    let hline = &output[0..firstnewline];
    let rline = &output[firstnewline..];
    Ok(format!("{}{}{}{}", BOLD, hline, END, rline))
}

/// Rows as tab-separated values, header first.
pub fn plain_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut out = headers.join("\t");
    out.push('\n');
    for row in rows {
        out.push_str(&row.join("\t"));
        out.push('\n');
    }
    out
}

/// Print a table to standard output, prettily if it's a terminal.
pub fn print_table(headers: &[&str], rows: &[Vec<String>]) -> Result<()> {
    if atty::is(atty::Stream::Stdout) {
        print!("{}", pretty_table(headers, rows)?);
    } else {
        print!("{}", plain_table(headers, rows));
    }
    Ok(())
}
