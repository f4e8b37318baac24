//! ISRC normalization and validation (§4.6, §8 P6)

use regex::Regex;
use std::sync::OnceLock;

fn isrc_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Z]{2}[A-Z0-9]{3}[0-9]{2}[0-9]{5}$").unwrap())
}

/// Strip hyphens, uppercase, and validate the 12-character ISRC pattern.
///
/// Returns `None` if the input does not match after normalization —
/// invalid ISRCs are treated as absent per §4.6.
pub fn normalize_isrc(raw: &str) -> Option<String> {
    let candidate: String = raw.chars().filter(|c| *c != '-').collect::<String>().to_uppercase();
    if isrc_pattern().is_match(&candidate) {
        Some(candidate)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_hyphenated_lowercase() {
        assert_eq!(normalize_isrc("ab12c3456789"), Some("AB12C3456789".to_string()));
        assert_eq!(normalize_isrc("AB-12C-34-56789"), Some("AB12C3456789".to_string()));
    }

    #[test]
    fn both_forms_collapse_to_same_code() {
        let a = normalize_isrc("AB-12C-34-56789").unwrap();
        let b = normalize_isrc("ab12c3456789").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn rejects_wrong_length() {
        assert_eq!(normalize_isrc("US1234567"), None);
        assert_eq!(normalize_isrc("USABC123456789"), None);
    }

    #[test]
    fn rejects_non_alnum() {
        assert_eq!(normalize_isrc("US-ABC-12-3456$"), None);
    }

    #[test]
    fn rejects_digits_in_country_code() {
        assert_eq!(normalize_isrc("1SABC1234567"), None);
    }
}
