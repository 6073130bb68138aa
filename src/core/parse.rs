//! Identifier parsing.
//!
//! Box and specimen names are structured identifiers; each configuration
//! carries a regular expression with named capture groups
//! (`participant_id`, `visit`, `sample_type`, `aliquot_number`, `year`, ...)
//! describing the site's nomenclature. Parsing is pure: same input, same
//! output, no side effects.

use indexmap::IndexMap;
use regex::Regex;

/// Parse result: named capture group -> matched substring.
///
/// Groups that exist in the pattern but did not participate in the match
/// are present with a `None` value. Downstream equality checks rely on
/// the null-vs-absent distinction, so absence always means "no match at
/// all".
pub type ParsedName = IndexMap<String, Option<String>>;

/// Parse `name` against `pattern`, returning named-capture-group values.
///
/// The pattern is wrapped to a full-string match unless it already starts
/// with `^`. Positional (numeric) groups are discarded. On empty input,
/// empty pattern, invalid pattern, or no match, the result is empty.
pub fn parse_name(name: &str, pattern: &str) -> ParsedName {
    let mut result = ParsedName::new();
    if name.is_empty() || pattern.is_empty() {
        return result;
    }
    let anchored = anchor(pattern);
    let re = match Regex::new(&anchored) {
        Ok(re) => re,
        // invalid patterns are reported by the configuration resolver;
        // here they parse as "no match"
        Err(_) => return result,
    };
    let caps = match re.captures(name) {
        Some(caps) => caps,
        None => return result,
    };
    for group in re.capture_names().flatten() {
        result.insert(
            group.to_string(),
            caps.name(group).map(|m| m.as_str().to_string()),
        );
    }
    result
}

/// Wrap a pattern to a full-string match unless already anchored.
fn anchor(pattern: &str) -> String {
    if pattern.starts_with('^') {
        pattern.to_string()
    } else {
        format!("^(?:{pattern})$")
    }
}

/// Build a store-compatible filter pattern from a named-capture-group base.
///
/// Every named group whose name appears in `fixed` is replaced by the
/// escaped literal value; the remaining groups keep their subpattern but
/// lose the name marker, so the result contains no capture-group syntax
/// the store's pattern-match operator would reject.
///
/// Unknown group names in `fixed` are ignored; a group named in `fixed`
/// with no value keeps its original subpattern.
pub fn derive_filter_pattern(base: &str, fixed: &IndexMap<String, String>) -> String {
    let chars: Vec<char> = base.chars().collect();
    let mut out = String::with_capacity(base.len());
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c == '\\' && i + 1 < chars.len() {
            out.push(c);
            out.push(chars[i + 1]);
            i += 2;
            continue;
        }
        if c == '(' {
            if let Some((group, body_start)) = named_group_at(&chars, i) {
                if let Some(value) = fixed.get(&group) {
                    let end = group_end(&chars, i);
                    out.push_str(&regex::escape(value));
                    i = end;
                    continue;
                }
                // keep the group, strip the name marker
                out.push('(');
                i = body_start;
                continue;
            }
        }
        out.push(c);
        i += 1;
    }
    out
}

/// If a named group `(?<name>` / `(?P<name>` opens at `start`, return its
/// name and the index just past the closing `>` of the marker.
fn named_group_at(chars: &[char], start: usize) -> Option<(String, usize)> {
    let mut i = start;
    if chars.get(i) != Some(&'(') || chars.get(i + 1) != Some(&'?') {
        return None;
    }
    i += 2;
    if chars.get(i) == Some(&'P') {
        i += 1;
    }
    if chars.get(i) != Some(&'<') {
        return None;
    }
    i += 1;
    // `(?<=` / `(?<!` are lookbehinds, not named groups
    if matches!(chars.get(i), Some(&'=') | Some(&'!')) {
        return None;
    }
    let name_start = i;
    while i < chars.len() && chars[i] != '>' {
        i += 1;
    }
    if i >= chars.len() {
        return None;
    }
    let name: String = chars[name_start..i].iter().collect();
    if name.is_empty() {
        return None;
    }
    Some((name, i + 1))
}

/// Index just past the `)` closing the group opening at `start`.
fn group_end(chars: &[char], start: usize) -> usize {
    let mut depth = 0usize;
    let mut in_class = false;
    let mut i = start;
    while i < chars.len() {
        let c = chars[i];
        if c == '\\' {
            i += 2;
            continue;
        }
        if in_class {
            if c == ']' {
                in_class = false;
            }
            i += 1;
            continue;
        }
        match c {
            '[' => in_class = true,
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return i + 1;
                }
            }
            _ => {}
        }
        i += 1;
    }
    chars.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PATTERN: &str = r"(?<year>\d{4})-(?<participant_id>P\d{3})(?:-(?<sample_type>[a-z]{2}))?(?:-(?<visit>\d{2}))?(?:-(?<aliquot_number>\d{2}))?";

    fn get<'a>(parsed: &'a ParsedName, key: &str) -> Option<&'a str> {
        parsed.get(key).and_then(|v| v.as_deref())
    }

    #[test]
    fn parse_recovers_substituted_values() {
        let parsed = parse_name("2024-P001-bl-01-02", PATTERN);
        assert_eq!(get(&parsed, "year"), Some("2024"));
        assert_eq!(get(&parsed, "participant_id"), Some("P001"));
        assert_eq!(get(&parsed, "sample_type"), Some("bl"));
        assert_eq!(get(&parsed, "visit"), Some("01"));
        assert_eq!(get(&parsed, "aliquot_number"), Some("02"));
    }

    #[test]
    fn unmatched_optional_groups_are_null_not_absent() {
        let parsed = parse_name("2024-P001", PATTERN);
        assert_eq!(get(&parsed, "year"), Some("2024"));
        assert_eq!(get(&parsed, "participant_id"), Some("P001"));
        // present with null value
        assert!(parsed.contains_key("sample_type"));
        assert_eq!(parsed.get("sample_type"), Some(&None));
        assert_eq!(parsed.get("visit"), Some(&None));
        assert_eq!(parsed.get("aliquot_number"), Some(&None));
    }

    #[test]
    fn no_match_yields_empty_map() {
        assert!(parse_name("not-a-specimen", PATTERN).is_empty());
        assert!(parse_name("", PATTERN).is_empty());
        assert!(parse_name("2024-P001", "").is_empty());
    }

    #[test]
    fn pattern_is_full_string_by_default() {
        // a substring match must not count
        assert!(parse_name("x2024-P001-bl-01-02x", PATTERN).is_empty());
    }

    #[test]
    fn already_anchored_pattern_is_untouched() {
        let parsed = parse_name("2024-P001", r"^(?<year>\d{4})-(?<participant_id>P\d{3})$");
        assert_eq!(get(&parsed, "year"), Some("2024"));
    }

    #[test]
    fn invalid_pattern_parses_as_no_match() {
        assert!(parse_name("2024", r"(?<year>\d{4}").is_empty());
    }

    #[test]
    fn derive_substitutes_literals_and_strips_markers() {
        let mut fixed = IndexMap::new();
        fixed.insert("year".to_string(), "2024".to_string());
        fixed.insert("participant_id".to_string(), "P001".to_string());
        let derived = derive_filter_pattern(PATTERN, &fixed);
        assert_eq!(
            derived,
            r"2024-P001(?:-([a-z]{2}))?(?:-(\d{2}))?(?:-(\d{2}))?"
        );
        // result must itself be a valid pattern
        let re = Regex::new(&derived).unwrap();
        assert!(re.is_match("2024-P001-bl-01-02"));
        assert!(!re.is_match("2024-P002-bl-01-02"));
    }

    #[test]
    fn derive_escapes_literal_values() {
        let mut fixed = IndexMap::new();
        fixed.insert("participant_id".to_string(), "P.01".to_string());
        let derived = derive_filter_pattern(r"(?<participant_id>P\d{3})", &fixed);
        assert_eq!(derived, r"P\.01");
    }

    #[test]
    fn derive_handles_p_style_groups() {
        let mut fixed = IndexMap::new();
        fixed.insert("year".to_string(), "2024".to_string());
        let derived = derive_filter_pattern(r"(?P<year>\d{4})-(?P<rest>\w+)", &fixed);
        assert_eq!(derived, r"2024-(\w+)");
    }

    #[test]
    fn derive_leaves_unfixed_base_untouched_apart_from_markers() {
        let derived = derive_filter_pattern(PATTERN, &IndexMap::new());
        assert_eq!(
            derived,
            r"(\d{4})-(P\d{3})(?:-([a-z]{2}))?(?:-(\d{2}))?(?:-(\d{2}))?"
        );
    }
}
