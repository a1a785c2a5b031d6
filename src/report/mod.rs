//! Result Writer: the annotated per-taxon table, the optional filtered copy
//! of the records file, and run summary statistics.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tracing::info;

use crate::analysis::{BagsGrade, SpeciesStatus, TaxonResult};
use crate::bio::authority::SpeciesAuthority;
use crate::bio::name;
use crate::index::{IndexOptions, RowFilter, RowVerdict};
use crate::utils::encoding::{self, Codec};
use crate::Result;

/// Joins list-valued output fields (cluster ids, other names).
const LIST_SEPARATOR: &str = ";";

/// Analysis columns appended after the input-list columns, in order.
const ANALYSIS_COLUMNS: &[&str] = &[
    "number_records",
    "bags_grade",
    "species_status",
    "cluster_ids",
    "other_names",
];

/// Write one output row per input taxon: every original column, then the
/// analysis columns. Output order equals input order.
pub fn write_results(
    authority: &SpeciesAuthority,
    results: &[TaxonResult],
    path: &Path,
) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .quote_style(csv::QuoteStyle::Never)
        .from_path(path)?;

    let mut header: Vec<&str> = authority.columns.iter().map(String::as_str).collect();
    for &col in ANALYSIS_COLUMNS {
        if !header.contains(&col) {
            header.push(col);
        }
    }
    writer.write_record(&header)?;

    for (taxon, result) in authority.taxa.iter().zip(results) {
        // Analysis values win over any input column of the same name
        let mut values = taxon.source_attributes.clone();
        values.insert("number_records".to_string(), result.number_records.to_string());
        values.insert("bags_grade".to_string(), result.bags_grade.to_string());
        values.insert("species_status".to_string(), result.species_status.to_string());
        values.insert(
            "cluster_ids".to_string(),
            result
                .clusters_found
                .iter()
                .cloned()
                .collect::<Vec<_>>()
                .join(LIST_SEPARATOR),
        );
        values.insert(
            "other_names".to_string(),
            result
                .other_names
                .iter()
                .map(|n| name::format_species_name(n))
                .collect::<Vec<_>>()
                .join(LIST_SEPARATOR),
        );

        let row: Vec<&str> = header
            .iter()
            .map(|&col| values.get(col).map(String::as_str).unwrap_or_default())
            .collect();
        writer.write_record(&row)?;
    }
    writer.flush()?;

    info!("Wrote {} results to {}", results.len(), path.display());
    Ok(())
}

/// Second streaming pass over the records file, emitting only rows whose
/// normalized (sub)species name is relevant to the analysis. Applies the
/// same row filters as index building so the audit trail matches what was
/// actually analyzed.
pub fn write_filtered_records(
    records_path: &Path,
    output_path: &Path,
    relevant_names: &HashSet<String>,
    options: &IndexOptions,
) -> Result<u64> {
    encoding::with_codec_fallback(|codec| {
        filtered_pass(records_path, output_path, relevant_names, options, codec)
    })
}

fn filtered_pass(
    records_path: &Path,
    output_path: &Path,
    relevant_names: &HashSet<String>,
    options: &IndexOptions,
    codec: Codec,
) -> Result<u64> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .quoting(false)
        .flexible(true)
        .from_reader(encoding::open_decoded(records_path, codec)?);

    let headers: Vec<String> = reader
        .headers()
        .map_err(encoding::classify_csv_error)?
        .iter()
        .map(String::from)
        .collect();
    let filter = RowFilter::from_header(&headers, options)?;

    // Recreated on every codec attempt, so an aborted UTF-8 pass leaves no
    // partial output behind
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .quote_style(csv::QuoteStyle::Never)
        .flexible(true)
        .from_path(output_path)?;
    writer.write_record(&headers)?;

    let progress = ProgressBar::new_spinner();
    progress.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap(),
    );

    let mut total = 0u64;
    let mut kept = 0u64;
    for record in reader.records() {
        let record = record.map_err(encoding::classify_csv_error)?;
        total += 1;
        if total % 500_000 == 0 {
            progress.set_message(format!("Filtered {} records, kept {}", total, kept));
            progress.tick();
        }

        if let RowVerdict::Keep {
            species,
            subspecies,
            ..
        } = filter.evaluate(&record)
        {
            let mut relevant = relevant_names.contains(&name::normalize(&species));
            if !relevant {
                if let Some(sub) = &subspecies {
                    relevant = relevant_names.contains(&name::normalize(sub));
                }
            }
            if relevant {
                writer.write_record(&record)?;
                kept += 1;
            }
        }
    }
    writer.flush()?;
    progress.finish_with_message(format!("Kept {} of {} records", kept, total));

    Ok(kept)
}

/// Aggregate grade/status distributions for one run.
#[derive(Debug, Serialize)]
pub struct Summary {
    pub taxa_total: usize,
    pub taxa_with_records: usize,
    pub records_matched: u64,
    pub grade_counts: BTreeMap<String, usize>,
    pub status_counts: BTreeMap<String, usize>,
}

impl Summary {
    pub fn from_results(results: &[TaxonResult]) -> Self {
        let mut grade_counts = BTreeMap::new();
        let mut status_counts = BTreeMap::new();
        for result in results {
            *grade_counts
                .entry(result.bags_grade.to_string())
                .or_insert(0) += 1;
            *status_counts
                .entry(result.species_status.to_string())
                .or_insert(0) += 1;
        }
        Self {
            taxa_total: results.len(),
            taxa_with_records: results.iter().filter(|r| r.number_records > 0).count(),
            records_matched: results.iter().map(|r| r.number_records).sum(),
            grade_counts,
            status_counts,
        }
    }

    /// Log the distribution block, every grade and status in canonical
    /// order, zero counts included.
    pub fn log(&self) {
        let pct = |count: usize| {
            if self.taxa_total == 0 {
                0.0
            } else {
                100.0 * count as f64 / self.taxa_total as f64
            }
        };

        info!("BAGS grade distribution:");
        for grade in BagsGrade::ALL {
            let count = self.grade_counts.get(grade.as_str()).copied().unwrap_or(0);
            info!("  Grade {}: {} ({:.1}%)", grade, count, pct(count));
        }
        info!("Status distribution:");
        for status in SpeciesStatus::ALL {
            let count = self
                .status_counts
                .get(status.as_str())
                .copied()
                .unwrap_or(0);
            info!("  {}: {} ({:.1}%)", status, count, pct(count));
        }
        info!(
            "Taxa with records: {}/{} ({:.1}%), {} records matched",
            self.taxa_with_records,
            self.taxa_total,
            pct(self.taxa_with_records),
            self.records_matched
        );
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
