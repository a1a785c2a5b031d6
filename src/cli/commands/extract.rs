use std::collections::HashSet;
use std::path::{Path, PathBuf};

use clap::Args;
use tracing::info;

use crate::index::columns;
use crate::utils::encoding::{self, Codec};
use crate::{LacunaError, Result};

#[derive(Args)]
pub struct ExtractArgs {
    /// Input records TSV
    #[arg(short, long, value_name = "FILE")]
    pub input: PathBuf,

    /// Output TSV with matching rows only
    #[arg(short, long, value_name = "FILE")]
    pub output: PathBuf,

    /// Target gene name(s); repeatable or comma-separated, case-insensitive
    #[arg(short = 'g', long = "gene", required = true, value_name = "GENE")]
    pub genes: Vec<String>,
}

pub fn run(args: ExtractArgs) -> anyhow::Result<()> {
    let targets = parse_gene_list(&args.genes);
    if targets.is_empty() {
        return Err(LacunaError::Config("no valid gene names provided".to_string()).into());
    }
    info!(
        "Extracting markers: {}",
        targets.iter().cloned().collect::<Vec<_>>().join(", ")
    );

    let (processed, matched, skipped) =
        encoding::with_codec_fallback(|codec| extract_pass(&args.input, &args.output, &targets, codec))?;

    info!(
        "Extraction complete: processed {}, matched {}, skipped {}",
        processed, matched, skipped
    );
    Ok(())
}

/// Expand repeatable/comma-separated gene arguments into a normalized set.
fn parse_gene_list(genes: &[String]) -> HashSet<String> {
    genes
        .iter()
        .flat_map(|item| item.split(','))
        .map(|gene| gene.trim().to_lowercase())
        .filter(|gene| !gene.is_empty())
        .collect()
}

fn extract_pass(
    input: &Path,
    output: &Path,
    targets: &HashSet<String>,
    codec: Codec,
) -> Result<(u64, u64, u64)> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .quoting(false)
        .flexible(true)
        .from_reader(encoding::open_decoded(input, codec)?);

    let headers: Vec<String> = reader
        .headers()
        .map_err(encoding::classify_csv_error)?
        .iter()
        .map(String::from)
        .collect();
    let marker_idx = columns::resolve_required(&headers, &[columns::MARKER_COLUMN])?;

    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .quote_style(csv::QuoteStyle::Never)
        .flexible(true)
        .from_path(output)?;
    writer.write_record(&headers)?;

    let mut processed = 0u64;
    let mut matched = 0u64;
    let mut skipped = 0u64;
    for record in reader.records() {
        let record = record.map_err(encoding::classify_csv_error)?;
        processed += 1;

        let marker = record.get(marker_idx).unwrap_or("").trim().to_lowercase();
        if targets.contains(&marker) {
            writer.write_record(&record)?;
            matched += 1;
        } else {
            skipped += 1;
        }
    }
    writer.flush()?;

    Ok((processed, matched, skipped))
}
