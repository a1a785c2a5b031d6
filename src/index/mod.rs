//! Record Index Builder.
//!
//! One streaming pass over a (possibly multi-million-row) records TSV,
//! producing name -> record count, name -> cluster ids, and the inverse
//! cluster id -> names relation. Memory stays proportional to the number of
//! unique names and cluster ids, never the number of rows.

pub mod columns;

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;

use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use crate::bio::name;
use crate::utils::encoding::{self, Codec};
use crate::Result;

/// Separator between multiple cluster ids in one record field.
const CLUSTER_ID_SEPARATOR: char = '|';

/// Row-level filters applied, in order, while scanning a records file.
#[derive(Debug, Clone, Default)]
pub struct IndexOptions {
    /// Keep only rows whose marker_code matches (case-insensitive).
    pub marker: Option<String>,
    /// Keep only rows whose kingdom is in this set (case-insensitive).
    pub kingdoms: Option<HashSet<String>>,
    /// Strip embedded line breaks and quote characters from fields before
    /// use; needed for known-messy upstream exports.
    pub tolerant: bool,
}

/// Row accounting for one indexing pass. Recoverable per-row issues are
/// reported here in aggregate, never per occurrence.
#[derive(Debug, Clone, Default)]
pub struct IndexStats {
    pub total_rows: u64,
    pub rows_with_cluster: u64,
    pub skipped_marker: u64,
    pub skipped_kingdom: u64,
    pub skipped_invalid_name: u64,
    pub malformed_rows: u64,
}

/// Aggregated view of a records file, keyed by normalized name.
///
/// Invariant: every (name, cluster) membership is mirrored in both
/// `name_to_clusters` and `cluster_to_names`.
#[derive(Debug, Default)]
pub struct RecordIndex {
    pub name_to_count: HashMap<String, u64>,
    pub name_to_clusters: HashMap<String, BTreeSet<String>>,
    pub cluster_to_names: HashMap<String, BTreeSet<String>>,
    /// Header name of the cluster column actually used.
    pub cluster_column: String,
    pub stats: IndexStats,
}

impl RecordIndex {
    /// Build the index in a single streaming pass over `path`, retrying the
    /// whole pass with the next codec on a decode failure.
    pub fn build(path: &Path, options: &IndexOptions) -> Result<Self> {
        info!("Building record index from {}", path.display());
        let index = encoding::with_codec_fallback(|codec| build_pass(path, options, codec))?;

        let s = &index.stats;
        info!("  Total rows: {}", s.total_rows);
        info!("  Rows with cluster id: {}", s.rows_with_cluster);
        info!("  Unique names: {}", index.name_to_count.len());
        info!("  Unique cluster ids: {}", index.cluster_to_names.len());
        if s.skipped_marker + s.skipped_kingdom + s.skipped_invalid_name + s.malformed_rows > 0 {
            info!(
                "  Skipped: {} marker, {} kingdom, {} invalid name, {} malformed",
                s.skipped_marker, s.skipped_kingdom, s.skipped_invalid_name, s.malformed_rows
            );
        }
        Ok(index)
    }

    fn add(&mut self, normalized: &str, cluster_ids: &[String]) {
        *self.name_to_count.entry(normalized.to_string()).or_default() += 1;
        for cid in cluster_ids {
            self.name_to_clusters
                .entry(normalized.to_string())
                .or_default()
                .insert(cid.clone());
            self.cluster_to_names
                .entry(cid.clone())
                .or_default()
                .insert(normalized.to_string());
        }
    }
}

fn build_pass(path: &Path, options: &IndexOptions, codec: Codec) -> Result<RecordIndex> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .quoting(false)
        .flexible(true)
        .from_reader(encoding::open_decoded(path, codec)?);

    let headers: Vec<String> = reader
        .headers()
        .map_err(encoding::classify_csv_error)?
        .iter()
        .map(String::from)
        .collect();

    let filter = RowFilter::from_header(&headers, options)?;

    let mut index = RecordIndex {
        cluster_column: filter.cluster_column.clone(),
        ..Default::default()
    };

    let progress = ProgressBar::new_spinner();
    progress.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap(),
    );

    for record in reader.records() {
        let record = record.map_err(encoding::classify_csv_error)?;
        index.stats.total_rows += 1;
        if index.stats.total_rows % 500_000 == 0 {
            progress.set_message(format!("Indexed {} records", index.stats.total_rows));
            progress.tick();
        }

        match filter.evaluate(&record) {
            RowVerdict::Malformed => index.stats.malformed_rows += 1,
            RowVerdict::SkippedMarker => index.stats.skipped_marker += 1,
            RowVerdict::SkippedKingdom => index.stats.skipped_kingdom += 1,
            RowVerdict::SkippedInvalidName => index.stats.skipped_invalid_name += 1,
            RowVerdict::Keep {
                species,
                subspecies,
                cluster_ids,
            } => {
                if !cluster_ids.is_empty() {
                    index.stats.rows_with_cluster += 1;
                }
                index.add(&name::normalize(&species), &cluster_ids);
                // A subspecies gets its own entry, never merged into the
                // parent binomial.
                if let Some(sub) = subspecies {
                    index.add(&name::normalize(&sub), &cluster_ids);
                }
            }
        }
    }

    progress.finish_with_message(format!(
        "Indexed {} records ({})",
        index.stats.total_rows,
        codec.name()
    ));
    Ok(index)
}

/// Outcome of the ordered row filters for a single record.
pub(crate) enum RowVerdict {
    Keep {
        species: String,
        subspecies: Option<String>,
        cluster_ids: Vec<String>,
    },
    Malformed,
    SkippedMarker,
    SkippedKingdom,
    SkippedInvalidName,
}

/// Compiled per-file row filter: column indices resolved once from the
/// header, filter values pre-lowercased. Shared between index building and
/// the filtered-records pass so the two stay consistent.
pub(crate) struct RowFilter {
    species_idx: usize,
    cluster_idx: usize,
    subspecies_idx: Option<usize>,
    marker: Option<(usize, String)>,
    kingdoms: Option<(usize, HashSet<String>)>,
    tolerant: bool,
    pub(crate) cluster_column: String,
}

impl RowFilter {
    pub(crate) fn from_header(headers: &[String], options: &IndexOptions) -> Result<Self> {
        let species_idx = columns::resolve_required(headers, columns::SPECIES_ALIASES)?;
        let cluster_idx = columns::resolve_required(headers, columns::CLUSTER_ALIASES)?;
        let cluster_column = headers[cluster_idx].clone();
        let subspecies_idx = columns::resolve(headers, &[columns::SUBSPECIES_COLUMN]);

        let marker = options
            .marker
            .as_ref()
            .map(|m| -> Result<(usize, String)> {
                let idx = columns::resolve_required(headers, &[columns::MARKER_COLUMN])?;
                Ok((idx, m.trim().to_lowercase()))
            })
            .transpose()?;

        let kingdoms = options
            .kingdoms
            .as_ref()
            .map(|ks| -> Result<(usize, HashSet<String>)> {
                let idx = columns::resolve_required(headers, &[columns::KINGDOM_COLUMN])?;
                Ok((idx, ks.iter().map(|k| k.trim().to_lowercase()).collect()))
            })
            .transpose()?;

        Ok(Self {
            species_idx,
            cluster_idx,
            subspecies_idx,
            marker,
            kingdoms,
            tolerant: options.tolerant,
            cluster_column,
        })
    }

    /// Apply sanitization and the row filters in their fixed order. The
    /// first rejecting filter short-circuits the rest.
    pub(crate) fn evaluate(&self, record: &csv::StringRecord) -> RowVerdict {
        if record.len() <= self.species_idx {
            return RowVerdict::Malformed;
        }

        if let Some((idx, wanted)) = &self.marker {
            if self.field(record, *idx).to_lowercase() != *wanted {
                return RowVerdict::SkippedMarker;
            }
        }

        if let Some((idx, allowed)) = &self.kingdoms {
            if !allowed.contains(&self.field(record, *idx).to_lowercase()) {
                return RowVerdict::SkippedKingdom;
            }
        }

        let species = self.field(record, self.species_idx);
        if name::is_placeholder(&species) {
            return RowVerdict::SkippedInvalidName;
        }

        let cluster_ids = parse_cluster_ids(&self.field(record, self.cluster_idx));

        let subspecies = self
            .subspecies_idx
            .map(|idx| self.field(record, idx))
            .filter(|value| !name::is_placeholder(value));

        RowVerdict::Keep {
            species,
            subspecies,
            cluster_ids,
        }
    }

    fn field(&self, record: &csv::StringRecord, idx: usize) -> String {
        sanitize(record.get(idx).unwrap_or(""), self.tolerant)
    }
}

/// Split a cluster-id field on `|`, dropping blank and placeholder tokens.
fn parse_cluster_ids(field: &str) -> Vec<String> {
    field
        .split(CLUSTER_ID_SEPARATOR)
        .map(str::trim)
        .filter(|token| !name::is_placeholder(token))
        .map(String::from)
        .collect()
}

fn sanitize(raw: &str, tolerant: bool) -> String {
    if tolerant {
        raw.chars()
            .filter(|c| !matches!(c, '"' | '\r' | '\n'))
            .collect::<String>()
            .trim()
            .to_string()
    } else {
        raw.trim().to_string()
    }
}
