use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::commands::fingerprint::FingerprintOptions;
use crate::commands::import::ImportOptions;
use crate::commands::sweep::SweepOptions;
use crate::commands::sync::SyncOptions;
use crate::commands::verify::VerifyOptions;
use crate::commands::{self, CommandReport};

#[derive(Debug, Parser)]
#[command(name = "bibshelf", version, about = "Keep a PDF library and its link tree in sync")]
pub struct Cli {
    /// Print the command report as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Place a batch of records into the library and link them
    Import {
        /// JSON array or JSON-lines file of records
        batch: PathBuf,
    },
    /// Re-place and re-link every catalog record
    Sync {
        #[arg(long)]
        dry_run: bool,
    },
    /// Remove broken links and empty directories from the link tree
    Sweep {
        #[arg(long)]
        dry_run: bool,
    },
    /// Show each record's fingerprint and whether it changed
    Fingerprint { batch: PathBuf },
    /// Check catalog records against the store and link tree
    Verify {
        /// Fail when any record has findings
        #[arg(long)]
        strict: bool,
    },
    /// Show resolved paths, configuration and environment
    Status,
}

fn print_report(report: &CommandReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }
    println!("{}: {}", report.command, if report.ok { "ok" } else { "failed" });
    for line in &report.details {
        println!("  {line}");
    }
    for line in &report.issues {
        println!("  issue: {line}");
    }
    Ok(())
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let report = match &cli.command {
        Command::Import { batch } => commands::import::run(&ImportOptions {
            batch: batch.clone(),
        })?,
        Command::Sync { dry_run } => commands::sync::run(&SyncOptions { dry_run: *dry_run })?,
        Command::Sweep { dry_run } => commands::sweep::run(&SweepOptions { dry_run: *dry_run })?,
        Command::Fingerprint { batch } => commands::fingerprint::run(&FingerprintOptions {
            batch: batch.clone(),
        })?,
        Command::Verify { strict } => commands::verify::run(&VerifyOptions { strict: *strict })?,
        Command::Status => commands::status::run()?,
    };

    print_report(&report, cli.json)?;
    if !report.ok {
        anyhow::bail!(
            "{} finished with {} issue(s)",
            report.command,
            report.issues.len()
        );
    }
    Ok(())
}
