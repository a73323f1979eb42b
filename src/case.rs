//! Naming conventions: path-parameter keys for models, default table names, identifier checks.

use regex::Regex;
use std::sync::OnceLock;

/// Path parameter key for a model or parent resource name: first character
/// lower-cased, `Id` appended. e.g. "Organization" -> "organizationId".
pub fn param_key(name: &str) -> String {
    let mut chars = name.chars();
    let mut out = String::with_capacity(name.len() + 2);
    if let Some(first) = chars.next() {
        out.extend(first.to_lowercase());
        out.push_str(chars.as_str());
    }
    out.push_str("Id");
    out
}

/// Convert a single identifier from camelCase to snake_case.
/// e.g. "userId" -> "user_id", "ScheduledReport" -> "scheduled_report"
pub fn to_snake_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 4);
    for (i, c) in s.chars().enumerate() {
        if c.is_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// True for names usable as a column, table or filter field.
pub fn is_identifier(s: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,62}$").expect("identifier regex"))
        .is_match(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn param_key_lowercases_first_char() {
        assert_eq!(param_key("Organization"), "organizationId");
        assert_eq!(param_key("report"), "reportId");
        assert_eq!(param_key("URLMap"), "uRLMapId");
    }

    #[test]
    fn snake_case_for_table_names() {
        assert_eq!(to_snake_case("ScheduledReport"), "scheduled_report");
        assert_eq!(to_snake_case("report"), "report");
    }

    #[test]
    fn identifiers() {
        assert!(is_identifier("organizationId"));
        assert!(is_identifier("_private"));
        assert!(!is_identifier("1abc"));
        assert!(!is_identifier("name; DROP TABLE x"));
        assert!(!is_identifier(""));
    }
}
