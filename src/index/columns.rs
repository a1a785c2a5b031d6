//! Prioritized header-alias resolution.
//!
//! Upstream exports disagree on column naming, so each logical field carries
//! a fixed preference-ordered list of acceptable header names. Aliases are
//! resolved once into column indices before any rows are read; a required
//! field with no matching alias fails the run immediately.

use crate::{LacunaError, Result};

/// Valid-name column in a species list; `taxon_name` preferred.
pub const TAXON_NAME_ALIASES: &[&str] = &["taxon_name", "species"];

/// Species/organism name column in a records file.
pub const SPECIES_ALIASES: &[&str] = &["species", "organism"];

/// Cluster-id column in a records file, in preference order.
pub const CLUSTER_ALIASES: &[&str] = &["bin_uri", "otu_id", "bin"];

pub const SYNONYMS_COLUMN: &str = "synonyms";
pub const SUBSPECIES_COLUMN: &str = "subspecies";
pub const MARKER_COLUMN: &str = "marker_code";
pub const KINGDOM_COLUMN: &str = "kingdom";

/// Index of the first alias present in `headers` (case-insensitive).
pub fn resolve(headers: &[String], aliases: &[&str]) -> Option<usize> {
    let lower: Vec<String> = headers.iter().map(|h| h.trim().to_lowercase()).collect();
    aliases
        .iter()
        .find_map(|alias| lower.iter().position(|h| h == &alias.to_lowercase()))
}

pub fn resolve_required(headers: &[String], aliases: &[&str]) -> Result<usize> {
    resolve(headers, aliases).ok_or_else(|| LacunaError::MissingColumn {
        wanted: aliases.iter().map(|s| s.to_string()).collect(),
        found: headers.to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_resolve_prefers_earlier_alias() {
        let h = headers(&["otu_id", "bin_uri", "species"]);
        // bin_uri wins even though otu_id appears first in the header
        assert_eq!(resolve(&h, CLUSTER_ALIASES), Some(1));
    }

    #[test]
    fn test_resolve_is_case_insensitive() {
        let h = headers(&["Species", "OTU_ID"]);
        assert_eq!(resolve(&h, SPECIES_ALIASES), Some(0));
        assert_eq!(resolve(&h, CLUSTER_ALIASES), Some(1));
    }

    #[test]
    fn test_resolve_required_reports_candidates_and_header() {
        let h = headers(&["accession", "sequence"]);
        let err = resolve_required(&h, CLUSTER_ALIASES).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("bin_uri"), "missing tried aliases: {}", msg);
        assert!(msg.contains("accession"), "missing observed header: {}", msg);
    }
}
