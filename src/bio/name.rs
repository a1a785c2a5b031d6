//! Species-name normalization and display helpers.
//!
//! Upstream sources disagree on case and on space vs underscore separators
//! for the same binomial. Every name must go through `normalize` before any
//! map lookup or set membership test, or matches are silently missed.

/// Field values that mean "no value" in upstream exports.
const PLACEHOLDER_TOKENS: &[&str] = &["none", "null", "na", "-", "."];

/// Canonicalize a taxon name for matching: underscores become spaces, the
/// result is trimmed and lowercased. Total and idempotent.
pub fn normalize(name: &str) -> String {
    name.replace('_', " ").trim().to_lowercase()
}

/// True for empty fields and known placeholder tokens ("none", "na", ...).
pub fn is_placeholder(value: &str) -> bool {
    let trimmed = value.trim();
    trimmed.is_empty() || PLACEHOLDER_TOKENS.contains(&trimmed.to_lowercase().as_str())
}

/// Format a normalized name for output: capitalize the genus (first token),
/// leave the rest of the epithet untouched.
pub fn format_species_name(name: &str) -> String {
    let mut tokens = name.split_whitespace();
    match tokens.next() {
        Some(first) => {
            let mut out = capitalize(first);
            for token in tokens {
                out.push(' ');
                out.push_str(token);
            }
            out
        }
        None => name.to_string(),
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(c) => c.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}
