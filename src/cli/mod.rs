pub mod commands;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "lacuna",
    version,
    about = "Taxon-centric gap analysis for DNA barcode reference libraries",
    long_about = "Lacuna matches a species-name authority (valid names plus synonyms) against \
                  large barcode record exports, detects BIN/OTU sharing conflicts, and assigns \
                  BAGS grades with traffic-light statuses per taxon."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Verbosity level (can be repeated)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Number of threads to use (0 = all available)
    #[arg(short = 'j', long, default_value = "0", global = true)]
    pub threads: usize,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run gap analysis of a records file against a species list
    Analyze(commands::analyze::AnalyzeArgs),

    /// Extract records matching target marker genes
    Extract(commands::extract::ExtractArgs),
}
