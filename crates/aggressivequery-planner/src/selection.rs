//! Selection path validation and the "more specific" expansion.

use aggressivequery_core::{ConfigError, Error, InvalidSelectionError, Result};
use regex::Regex;
use std::sync::OnceLock;

/// Path separator between relation and field names.
pub const SEPARATOR: &str = "__";

/// Wildcard segment.
pub const WILDCARD: &str = "*";

const SEGMENT_PATTERN: &str = r"^(\*|[A-Za-z_][A-Za-z0-9_]*)$";

fn segment_regex() -> Result<&'static Regex> {
    static SEGMENT: OnceLock<std::result::Result<Regex, regex::Error>> = OnceLock::new();
    SEGMENT
        .get_or_init(|| Regex::new(SEGMENT_PATTERN))
        .as_ref()
        .map_err(|e| {
            Error::Config(ConfigError {
                message: format!("invalid selection segment pattern: {e}"),
                source: Some(Box::new(e.clone())),
            })
        })
}

/// Check that every path tokenizes into well-formed segments.
///
/// Unknown names are fine; only the shape of the path is checked.
pub fn validate_selection<S: AsRef<str>>(paths: &[S]) -> Result<()> {
    for path in paths {
        validate_path(path.as_ref())?;
    }
    Ok(())
}

pub fn validate_path(path: &str) -> Result<()> {
    let regex = segment_regex()?;
    if path.is_empty() {
        return Err(InvalidSelectionError::new(path, "empty selection path").into());
    }
    for segment in path.split(SEPARATOR) {
        if segment.is_empty() {
            return Err(InvalidSelectionError::new(path, "empty path segment").into());
        }
        if !regex.is_match(segment) {
            return Err(InvalidSelectionError::new(
                path,
                format!("segment '{segment}' is neither a name nor '*'"),
            )
            .into());
        }
    }
    Ok(())
}

/// Expand a selection so every ancestor level selects all of its columns.
///
/// The result starts with `*`, then lists `<prefix>__*` for every prefix of
/// every path, without duplicates.
pub fn more_specific_selection<S: AsRef<str>>(paths: &[S]) -> Vec<String> {
    let mut out = vec![WILDCARD.to_string()];
    for path in paths {
        let segments: Vec<&str> = path.as_ref().split(SEPARATOR).collect();
        for end in 1..=segments.len() {
            let expanded = format!("{}{SEPARATOR}{WILDCARD}", segments[..end].join(SEPARATOR));
            if !out.contains(&expanded) {
                out.push(expanded);
            }
        }
    }
    out
}
