use std::collections::HashSet;
use std::path::PathBuf;

use clap::Args;
use tracing::info;

use crate::analysis::{self, DEFAULT_BATCH_SIZE};
use crate::bio::authority::SpeciesAuthority;
use crate::index::{IndexOptions, RecordIndex};
use crate::report::{self, Summary};

#[derive(Args)]
pub struct AnalyzeArgs {
    /// Species list TSV (taxon_name/species column, optional synonyms)
    #[arg(short, long, value_name = "FILE")]
    pub species_list: PathBuf,

    /// Records TSV (species/organism column plus bin_uri/otu_id)
    #[arg(short, long, value_name = "FILE")]
    pub records: PathBuf,

    /// Output TSV for per-taxon results
    #[arg(short, long, value_name = "FILE")]
    pub output: PathBuf,

    /// Also write the record rows relevant to this analysis
    #[arg(long, value_name = "FILE")]
    pub filtered_records: Option<PathBuf>,

    /// Keep only records with this marker/gene code (e.g. COI-5P)
    #[arg(long, value_name = "MARKER")]
    pub marker: Option<String>,

    /// Keep only records from these kingdoms (repeatable)
    #[arg(long = "kingdom", value_name = "KINGDOM")]
    pub kingdoms: Vec<String>,

    /// Strip stray quotes and line breaks from known-messy exports
    #[arg(long)]
    pub tolerant: bool,

    /// Taxa per batch for parallel analysis
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
    pub batch_size: usize,

    /// Write run summary statistics as JSON
    #[arg(long, value_name = "FILE")]
    pub summary_json: Option<PathBuf>,
}

pub fn run(args: AnalyzeArgs) -> anyhow::Result<()> {
    let authority = SpeciesAuthority::load(&args.species_list)?;

    let options = IndexOptions {
        marker: args.marker.clone(),
        kingdoms: if args.kingdoms.is_empty() {
            None
        } else {
            Some(args.kingdoms.iter().cloned().collect())
        },
        tolerant: args.tolerant,
    };

    let index = RecordIndex::build(&args.records, &options)?;
    info!("Using cluster column: {}", index.cluster_column);

    let results = analysis::analyze_all(&authority.taxa, &index, args.batch_size);

    if let Some(parent) = args.output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    report::write_results(&authority, &results, &args.output)?;

    if let Some(path) = &args.filtered_records {
        // Audit trail: every name any taxon can match under, plus every
        // external name the conflict check surfaced
        let mut relevant: HashSet<String> = HashSet::new();
        for taxon in &authority.taxa {
            relevant.extend(taxon.all_names());
        }
        for result in &results {
            relevant.extend(result.other_names.iter().cloned());
        }
        let kept = report::write_filtered_records(&args.records, path, &relevant, &options)?;
        info!("Filtered records: kept {} rows in {}", kept, path.display());
    }

    let summary = Summary::from_results(&results);
    summary.log();
    if let Some(path) = &args.summary_json {
        std::fs::write(path, summary.to_json()?)?;
        info!("Summary written to {}", path.display());
    }

    Ok(())
}
