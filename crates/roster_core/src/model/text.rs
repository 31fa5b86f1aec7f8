//! Text normalization shared by roster records.

use once_cell::sync::Lazy;
use regex::Regex;

static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid ws regex"));

/// Trims and collapses internal whitespace runs to one space.
pub fn normalize_label(value: &str) -> String {
    WHITESPACE_RE.replace_all(value.trim(), " ").into_owned()
}

/// Case-insensitive comparison key for names and grade labels.
///
/// Used by legacy name matching during import, where the spreadsheet row and
/// the stored record may differ only in spacing or case.
pub fn match_key(value: &str) -> String {
    normalize_label(value).to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::{match_key, normalize_label};

    #[test]
    fn normalize_label_collapses_whitespace() {
        assert_eq!(normalize_label("  Grade 3 \t-   Athena \n"), "Grade 3 - Athena");
        assert_eq!(normalize_label("   "), "");
    }

    #[test]
    fn match_key_ignores_case_and_spacing() {
        assert_eq!(match_key("Ana  Lopez"), match_key(" ana lopez"));
        assert_ne!(match_key("Ana"), match_key("Ann"));
    }
}
