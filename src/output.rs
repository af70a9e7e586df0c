use clap::ValueEnum;
use serde::Serialize;

use crate::collector::PassSummary;
use crate::error::Result;
use crate::state::DataFile;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    Json,
    Pretty,
}

#[derive(Debug, Serialize)]
pub struct StatusRow {
    pub file: String,
    pub state: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locked_at: Option<String>,
    pub claim_held: bool,
}

impl StatusRow {
    pub fn from_file(file: &DataFile, claim_held: bool) -> Self {
        Self {
            file: file.name().to_string(),
            state: file.state_label(),
            locked_at: file
                .name()
                .fields()
                .locked_at()
                .map(|at| at.to_rfc3339()),
            claim_held,
        }
    }
}

pub fn print_rows(rows: &[StatusRow], format: Format) -> Result<()> {
    match format {
        Format::Json => println!("{}", serde_json::to_string(rows)?),
        Format::Pretty => {
            println!("{:10} {:25} {:5} FILE", "STATE", "LOCKED AT", "CLAIM");
            for row in rows {
                println!(
                    "{:10} {:25} {:5} {}",
                    row.state,
                    row.locked_at.as_deref().unwrap_or("-"),
                    if row.claim_held { "held" } else { "-" },
                    row.file
                );
            }
        }
    }
    Ok(())
}

pub fn print_summary(summary: &PassSummary, format: Format) -> Result<()> {
    match format {
        Format::Json => println!("{}", serde_json::to_string(summary)?),
        Format::Pretty => println!(
            "locked {} | gathered {} | released {} | unlocked {} | deferred {}",
            summary.locked, summary.gathered, summary.released, summary.unlocked, summary.deferred
        ),
    }
    Ok(())
}
