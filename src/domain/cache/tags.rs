//! Cache tag rules

use std::collections::HashSet;

use crate::domain::CacheError;

/// Prefix of the tag every record of a bin carries
pub const BIN_TAG_PREFIX: &str = "x-cache-bin:";

/// Tag shared by every record of `bin`, used to invalidate the whole bin
pub fn bin_tag(bin: &str) -> String {
    format!("{}{}", BIN_TAG_PREFIX, bin)
}

/// Tags are stored space-separated, so they must be non-empty and free of
/// whitespace.
pub fn validate_tag(tag: &str) -> Result<(), CacheError> {
    if tag.is_empty() {
        return Err(CacheError::contract("Cache tags must not be empty"));
    }

    if tag.chars().any(char::is_whitespace) {
        return Err(CacheError::contract(format!(
            "Cache tag '{}' must not contain whitespace",
            tag
        )));
    }

    Ok(())
}

/// Validates `tags`, drops duplicates keeping first occurrences and appends
/// `bin_tag`.
pub fn normalize_tags(tags: &[String], bin_tag: &str) -> Result<Vec<String>, CacheError> {
    let mut seen = HashSet::with_capacity(tags.len() + 1);
    let mut normalized = Vec::with_capacity(tags.len() + 1);

    for tag in tags.iter().map(String::as_str).chain(std::iter::once(bin_tag)) {
        validate_tag(tag)?;

        if seen.insert(tag) {
            normalized.push(tag.to_string());
        }
    }

    Ok(normalized)
}
