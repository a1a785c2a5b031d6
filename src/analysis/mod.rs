//! Gap Analyzer: per-taxon record aggregation, cluster-sharing conflict
//! detection, and BAGS grade / status assignment.

use std::collections::BTreeSet;
use std::fmt;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::bio::authority::Taxon;
use crate::bio::name;
use crate::index::RecordIndex;

/// Taxa per batch for the parallel path. Inputs smaller than one batch are
/// analyzed serially, where dispatch overhead would dominate.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// BAGS grade: single-letter summary of how well a taxon's barcode records
/// support unambiguous species-level identification.
///
/// A = one cluster, >=11 records; B = one cluster, 3-10 records;
/// C = records split across clusters; D = one cluster, <3 records;
/// E = cluster shared with another name; F = no records or no cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BagsGrade {
    A,
    B,
    C,
    D,
    E,
    F,
}

impl BagsGrade {
    pub const ALL: [BagsGrade; 6] = [
        BagsGrade::A,
        BagsGrade::B,
        BagsGrade::C,
        BagsGrade::D,
        BagsGrade::E,
        BagsGrade::F,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BagsGrade::A => "A",
            BagsGrade::B => "B",
            BagsGrade::C => "C",
            BagsGrade::D => "D",
            BagsGrade::E => "E",
            BagsGrade::F => "F",
        }
    }
}

impl fmt::Display for BagsGrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Traffic-light status of a taxon's nomenclature in the records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SpeciesStatus {
    /// Records only under the valid name.
    Green,
    /// Records under both the valid name and synonyms.
    Amber,
    /// Records only under synonyms.
    Blue,
    /// A cluster is shared with names outside the taxon.
    Red,
    /// No records at all.
    Black,
}

impl SpeciesStatus {
    pub const ALL: [SpeciesStatus; 5] = [
        SpeciesStatus::Green,
        SpeciesStatus::Amber,
        SpeciesStatus::Blue,
        SpeciesStatus::Red,
        SpeciesStatus::Black,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SpeciesStatus::Green => "GREEN",
            SpeciesStatus::Amber => "AMBER",
            SpeciesStatus::Blue => "BLUE",
            SpeciesStatus::Red => "RED",
            SpeciesStatus::Black => "BLACK",
        }
    }
}

impl fmt::Display for SpeciesStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Analysis result for one taxon. Fully populated by `analyze`, read-only
/// afterwards.
#[derive(Debug, Clone)]
pub struct TaxonResult {
    pub row_index: usize,
    pub number_records: u64,
    pub bags_grade: BagsGrade,
    pub species_status: SpeciesStatus,
    pub clusters_found: BTreeSet<String>,
    /// Which of the taxon's names actually appear in the records.
    pub names_recorded: BTreeSet<String>,
    /// Names outside the taxon sharing one of its clusters, sorted.
    pub other_names: Vec<String>,
}

/// Classify one taxon against the index. Pure: reads the shared maps, never
/// mutates them, and is deterministic for a given (taxon, index) pair.
pub fn analyze(taxon: &Taxon, index: &RecordIndex) -> TaxonResult {
    let all_names = taxon.all_names();
    let valid_name = name::normalize(&taxon.valid_name);

    let mut result = TaxonResult {
        row_index: taxon.row_index,
        number_records: 0,
        bags_grade: BagsGrade::F,
        species_status: SpeciesStatus::Black,
        clusters_found: BTreeSet::new(),
        names_recorded: BTreeSet::new(),
        other_names: Vec::new(),
    };

    for n in &all_names {
        if let Some(&count) = index.name_to_count.get(n) {
            if count > 0 {
                result.number_records += count;
                result.names_recorded.insert(n.clone());
            }
        }
    }

    // Never observed anywhere: terminal, no cluster logic applies
    if result.number_records == 0 {
        return result;
    }

    for n in &all_names {
        if let Some(clusters) = index.name_to_clusters.get(n) {
            result.clusters_found.extend(clusters.iter().cloned());
        }
    }

    let mut names_in_clusters: BTreeSet<String> = BTreeSet::new();
    for cid in &result.clusters_found {
        if let Some(names) = index.cluster_to_names.get(cid) {
            names_in_clusters.extend(names.iter().cloned());
        }
    }
    result.other_names = names_in_clusters.difference(&all_names).cloned().collect();

    // Conflict dominates everything else: a shared cluster is unresolved
    // taxonomic ambiguity regardless of record volume
    if !result.other_names.is_empty() {
        result.species_status = SpeciesStatus::Red;
        result.bags_grade = BagsGrade::E;
        return result;
    }

    let valid_recorded = result.names_recorded.contains(&valid_name);
    let synonym_recorded = result.names_recorded.iter().any(|n| n != &valid_name);
    result.species_status = match (valid_recorded, synonym_recorded) {
        (true, true) => SpeciesStatus::Amber,
        (true, false) => SpeciesStatus::Green,
        (false, _) => SpeciesStatus::Blue,
    };

    result.bags_grade = match result.clusters_found.len() {
        0 => BagsGrade::F,
        1 => match result.number_records {
            n if n >= 11 => BagsGrade::A,
            3..=10 => BagsGrade::B,
            _ => BagsGrade::D,
        },
        _ => BagsGrade::C,
    };

    result
}

/// Analyze every taxon, preserving input order in the output.
///
/// Large inputs are partitioned into fixed-size batches analyzed on the
/// rayon pool; `analyze` only reads the shared index, so batches need no
/// coordination and results reassemble in input order.
pub fn analyze_all(taxa: &[Taxon], index: &RecordIndex, batch_size: usize) -> Vec<TaxonResult> {
    let batch_size = batch_size.max(1);

    if taxa.len() < batch_size {
        info!("Analyzing {} taxa (single-threaded)", taxa.len());
        return taxa.iter().map(|t| analyze(t, index)).collect();
    }

    info!(
        "Analyzing {} taxa in batches of {} across {} threads",
        taxa.len(),
        batch_size,
        rayon::current_num_threads()
    );
    taxa.par_chunks(batch_size)
        .flat_map_iter(|batch| batch.iter().map(|t| analyze(t, index)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;
    use pretty_assertions::assert_eq;

    fn taxon(row_index: usize, valid_name: &str, synonyms: &[&str]) -> Taxon {
        Taxon {
            row_index,
            valid_name: valid_name.to_string(),
            synonyms: synonyms.iter().map(|s| s.to_string()).collect(),
            source_attributes: IndexMap::new(),
        }
    }

    /// Build an index directly from (name, count, clusters) rows.
    fn index(entries: &[(&str, u64, &[&str])]) -> RecordIndex {
        let mut ix = RecordIndex::default();
        for (name, count, clusters) in entries {
            *ix.name_to_count.entry(name.to_string()).or_default() += count;
            for cid in *clusters {
                ix.name_to_clusters
                    .entry(name.to_string())
                    .or_default()
                    .insert(cid.to_string());
                ix.cluster_to_names
                    .entry(cid.to_string())
                    .or_default()
                    .insert(name.to_string());
            }
        }
        ix
    }

    #[test]
    fn test_no_records_is_black_f() {
        let ix = index(&[("someone else", 5, &["BIN9"])]);
        let result = analyze(&taxon(0, "Apis mellifera", &["Apis mellifica"]), &ix);
        assert_eq!(result.number_records, 0);
        assert_eq!(result.bags_grade, BagsGrade::F);
        assert_eq!(result.species_status, SpeciesStatus::Black);
        assert!(result.clusters_found.is_empty());
    }

    #[test]
    fn test_valid_plus_synonym_single_cluster_is_amber_a() {
        // 12 + 2 records, one shared cluster, no external names
        let ix = index(&[
            ("apis mellifera", 12, &["BIN001"]),
            ("apis mellifica", 2, &["BIN001"]),
        ]);
        let result = analyze(&taxon(0, "Apis mellifera", &["Apis mellifica"]), &ix);

        assert_eq!(result.number_records, 14);
        assert_eq!(
            result.clusters_found.iter().collect::<Vec<_>>(),
            vec!["BIN001"]
        );
        assert_eq!(result.names_recorded.len(), 2);
        assert!(result.other_names.is_empty());
        assert_eq!(result.species_status, SpeciesStatus::Amber);
        assert_eq!(result.bags_grade, BagsGrade::A);
    }

    #[test]
    fn test_synonym_only_is_blue_with_cluster_grade() {
        let ix = index(&[("apis mellifica", 5, &["BIN001"])]);
        let result = analyze(&taxon(0, "Apis mellifera", &["Apis mellifica"]), &ix);

        assert_eq!(result.number_records, 5);
        assert_eq!(
            result.names_recorded.iter().collect::<Vec<_>>(),
            vec!["apis mellifica"]
        );
        assert_eq!(result.species_status, SpeciesStatus::Blue);
        assert_eq!(result.bags_grade, BagsGrade::B);
    }

    #[test]
    fn test_valid_only_is_green() {
        let ix = index(&[("apis mellifera", 2, &["BIN001"])]);
        let result = analyze(&taxon(0, "Apis mellifera", &["Apis mellifica"]), &ix);
        assert_eq!(result.species_status, SpeciesStatus::Green);
        assert_eq!(result.bags_grade, BagsGrade::D);
    }

    #[test]
    fn test_split_clusters_is_c_regardless_of_volume() {
        let ix = index(&[
            ("apis mellifera", 30, &["BIN001"]),
            ("apis mellifera", 20, &["BIN002"]),
        ]);
        let result = analyze(&taxon(0, "Apis mellifera", &[]), &ix);
        assert_eq!(result.number_records, 50);
        assert_eq!(result.clusters_found.len(), 2);
        assert_eq!(result.bags_grade, BagsGrade::C);
        assert_eq!(result.species_status, SpeciesStatus::Green);
    }

    #[test]
    fn test_records_without_clusters_is_f() {
        let ix = index(&[("apis mellifera", 7, &[])]);
        let result = analyze(&taxon(0, "Apis mellifera", &[]), &ix);
        assert_eq!(result.number_records, 7);
        assert_eq!(result.bags_grade, BagsGrade::F);
        assert_eq!(result.species_status, SpeciesStatus::Green);
    }

    #[test]
    fn test_conflict_is_red_e_even_with_high_counts() {
        let ix = index(&[
            ("apis mellifera", 40, &["BIN001"]),
            ("apis cerana", 1, &["BIN001"]),
        ]);
        let result = analyze(&taxon(0, "Apis mellifera", &[]), &ix);
        assert_eq!(result.species_status, SpeciesStatus::Red);
        assert_eq!(result.bags_grade, BagsGrade::E);
        assert_eq!(result.other_names, vec!["apis cerana"]);
    }

    #[test]
    fn test_conflict_is_symmetric() {
        let ix = index(&[
            ("apis mellifera", 3, &["BIN001"]),
            ("apis cerana", 4, &["BIN001"]),
        ]);
        let a = analyze(&taxon(0, "Apis mellifera", &[]), &ix);
        let b = analyze(&taxon(1, "Apis cerana", &[]), &ix);
        assert_eq!(a.other_names, vec!["apis cerana"]);
        assert_eq!(b.other_names, vec!["apis mellifera"]);
        assert_eq!(a.species_status, SpeciesStatus::Red);
        assert_eq!(b.species_status, SpeciesStatus::Red);
    }

    #[test]
    fn test_synonym_sharing_own_cluster_is_not_conflict() {
        // Every synonym maps to the same cluster as the valid name; records
        // only under synonyms; no external sharers
        let ix = index(&[("apis mellifica", 12, &["BIN001"])]);
        let result = analyze(&taxon(0, "Apis mellifera", &["Apis mellifica"]), &ix);
        assert!(result.other_names.is_empty());
        assert_eq!(result.species_status, SpeciesStatus::Blue);
        assert_eq!(result.bags_grade, BagsGrade::A);
    }

    #[test]
    fn test_analyze_is_idempotent() {
        let ix = index(&[
            ("apis mellifera", 12, &["BIN001"]),
            ("apis cerana", 1, &["BIN001"]),
        ]);
        let t = taxon(0, "Apis mellifera", &[]);
        let first = analyze(&t, &ix);
        let second = analyze(&t, &ix);
        assert_eq!(first.number_records, second.number_records);
        assert_eq!(first.bags_grade, second.bags_grade);
        assert_eq!(first.species_status, second.species_status);
        assert_eq!(first.other_names, second.other_names);
    }

    #[test]
    fn test_batch_order_matches_serial_for_any_batch_size() {
        let ix = index(&[
            ("species a", 12, &["BIN1"]),
            ("species b", 2, &["BIN2"]),
            ("species c", 5, &["BIN2", "BIN3"]),
        ]);
        let taxa: Vec<Taxon> = (0..25)
            .map(|i| taxon(i, ["Species a", "Species b", "Species c", "Species d"][i % 4], &[]))
            .collect();

        let serial = analyze_all(&taxa, &ix, usize::MAX);
        for batch_size in [1, 2, 3, 7, 25] {
            let batched = analyze_all(&taxa, &ix, batch_size);
            let serial_order: Vec<_> = serial.iter().map(|r| (r.row_index, r.bags_grade)).collect();
            let batched_order: Vec<_> =
                batched.iter().map(|r| (r.row_index, r.bags_grade)).collect();
            assert_eq!(serial_order, batched_order, "batch_size={}", batch_size);
        }
    }
}
