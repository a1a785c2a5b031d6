//! The species-name authority: taxa with valid names and synonym sets,
//! loaded once from a species-list TSV and immutable afterwards.

use std::collections::BTreeSet;
use std::path::Path;

use indexmap::IndexMap;
use tracing::info;

use crate::bio::name;
use crate::index::columns;
use crate::utils::encoding::{self, Codec};
use crate::Result;

/// Delimiter between synonym tokens in the synonyms column.
const SYNONYM_DELIMITER: char = ';';

/// One taxon from the authority list. Constructed at load time and never
/// mutated during analysis.
#[derive(Debug, Clone)]
pub struct Taxon {
    /// Position in the source list; stable ordering key.
    pub row_index: usize,
    /// Accepted name, case preserved for display.
    pub valid_name: String,
    pub synonyms: Vec<String>,
    /// Every input column for this row, verbatim and in input order.
    pub source_attributes: IndexMap<String, String>,
}

impl Taxon {
    /// Normalized name set: valid name plus every synonym.
    pub fn all_names(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        names.insert(name::normalize(&self.valid_name));
        names.extend(self.synonyms.iter().map(|s| name::normalize(s)));
        names
    }
}

#[derive(Debug)]
pub struct SpeciesAuthority {
    /// Taxa in input order.
    pub taxa: Vec<Taxon>,
    /// Original column names, for round-trip output.
    pub columns: Vec<String>,
}

impl SpeciesAuthority {
    /// Load a species list. Rows with an empty name column are skipped;
    /// a header without any recognized name column is fatal.
    pub fn load(path: &Path) -> Result<Self> {
        info!("Loading species list from {}", path.display());
        let authority = encoding::with_codec_fallback(|codec| Self::load_with_codec(path, codec))?;

        let total_synonyms: usize = authority.taxa.iter().map(|t| t.synonyms.len()).sum();
        info!(
            "Loaded {} taxa ({} synonyms, {} names to match)",
            authority.taxa.len(),
            total_synonyms,
            authority.taxa.len() + total_synonyms
        );
        Ok(authority)
    }

    fn load_with_codec(path: &Path, codec: Codec) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .quoting(false)
            .flexible(true)
            .from_reader(encoding::open_decoded(path, codec)?);

        let columns: Vec<String> = reader
            .headers()
            .map_err(encoding::classify_csv_error)?
            .iter()
            .map(String::from)
            .collect();

        let name_idx = columns::resolve_required(&columns, columns::TAXON_NAME_ALIASES)?;
        let synonyms_idx = columns::resolve(&columns, &[columns::SYNONYMS_COLUMN]);

        let mut taxa = Vec::new();
        for (row_index, record) in reader.records().enumerate() {
            let record = record.map_err(encoding::classify_csv_error)?;

            let valid_name = record.get(name_idx).unwrap_or("").trim();
            if valid_name.is_empty() {
                continue;
            }

            let synonyms: Vec<String> = synonyms_idx
                .and_then(|i| record.get(i))
                .map(|field| {
                    field
                        .split(SYNONYM_DELIMITER)
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default();

            let source_attributes: IndexMap<String, String> = columns
                .iter()
                .enumerate()
                .map(|(i, col)| {
                    (
                        col.clone(),
                        record.get(i).unwrap_or("").trim().to_string(),
                    )
                })
                .collect();

            taxa.push(Taxon {
                row_index,
                valid_name: valid_name.to_string(),
                synonyms,
                source_attributes,
            });
        }

        Ok(Self { taxa, columns })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LacunaError;
    use pretty_assertions::assert_eq;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn species_file(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_taxa_with_synonyms() {
        let file = species_file(
            "taxon_name\tsynonyms\tfamily\n\
             Apis mellifera\tApis mellifica; Apis cerana fabricii\tApidae\n\
             Bombus terrestris\t\tApidae\n",
        );
        let authority = SpeciesAuthority::load(file.path()).unwrap();

        assert_eq!(authority.columns, vec!["taxon_name", "synonyms", "family"]);
        assert_eq!(authority.taxa.len(), 2);

        let apis = &authority.taxa[0];
        assert_eq!(apis.valid_name, "Apis mellifera");
        assert_eq!(apis.synonyms, vec!["Apis mellifica", "Apis cerana fabricii"]);
        assert_eq!(apis.source_attributes["family"], "Apidae");
        assert!(apis.all_names().contains("apis mellifica"));

        assert!(authority.taxa[1].synonyms.is_empty());
    }

    #[test]
    fn test_species_alias_fallback() {
        let file = species_file("species\nVanessa atalanta\n");
        let authority = SpeciesAuthority::load(file.path()).unwrap();
        assert_eq!(authority.taxa[0].valid_name, "Vanessa atalanta");
    }

    #[test]
    fn test_empty_name_rows_skipped_but_indexed() {
        let file = species_file(
            "taxon_name\tfamily\n\
             Apis mellifera\tApidae\n\
             \tUnplaced\n\
             Bombus terrestris\tApidae\n",
        );
        let authority = SpeciesAuthority::load(file.path()).unwrap();
        assert_eq!(authority.taxa.len(), 2);
        // row_index keeps source positions, including the skipped row
        assert_eq!(authority.taxa[0].row_index, 0);
        assert_eq!(authority.taxa[1].row_index, 2);
    }

    #[test]
    fn test_missing_name_column_is_fatal() {
        let file = species_file("family\tgenus\nApidae\tApis\n");
        let err = SpeciesAuthority::load(file.path()).unwrap_err();
        assert!(matches!(err, LacunaError::MissingColumn { .. }));
    }

    #[test]
    fn test_latin1_fallback() {
        let mut file = NamedTempFile::new().unwrap();
        // 0xE9 is é in Latin-1 and invalid UTF-8
        file.write_all(b"taxon_name\tsynonyms\nApis m\xE9llifera\t\n")
            .unwrap();
        let authority = SpeciesAuthority::load(file.path()).unwrap();
        assert_eq!(authority.taxa[0].valid_name, "Apis méllifera");
    }
}
