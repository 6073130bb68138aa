//! Raw-to-display value mapping.
//!
//! Stored values are codes (choice keys, 0/1 flags, ISO dates); lists,
//! reports and manifests show labels. The mapping is lossy by design and
//! only used for display rows, never written back.

use super::fields::{FieldMetadata, FieldType};

/// Render a stored raw value for display.
pub fn display_value(metadata: &FieldMetadata, raw: &str) -> String {
    if raw.is_empty() {
        return String::new();
    }
    match metadata.field_type {
        FieldType::Select | FieldType::Radio | FieldType::Checkbox => metadata
            .choices
            .as_ref()
            .and_then(|choices| choices.get(raw))
            .cloned()
            .unwrap_or_else(|| raw.to_string()),
        FieldType::Yesno => match raw {
            "1" => "Yes".to_string(),
            "0" => "No".to_string(),
            _ => raw.to_string(),
        },
        FieldType::Truefalse => match raw {
            "1" => "True".to_string(),
            "0" => "False".to_string(),
            _ => raw.to_string(),
        },
        FieldType::Date => format_date(raw).unwrap_or_else(|| raw.to_string()),
        FieldType::Datetime => format_datetime(raw).unwrap_or_else(|| raw.to_string()),
        _ => raw.to_string(),
    }
}

/// `YYYY-MM-DD` -> `M/D/YYYY`.
fn format_date(raw: &str) -> Option<String> {
    let (year, month, day) = split_date(raw)?;
    Some(format!("{month}/{day}/{year}"))
}

/// `YYYY-MM-DD HH:MM[:SS]` -> `M/D/YYYY HH:MM`.
fn format_datetime(raw: &str) -> Option<String> {
    let (date, time) = raw.split_once(' ')?;
    let (year, month, day) = split_date(date)?;
    let mut parts = time.split(':');
    let hour = parts.next()?;
    let minute = parts.next()?;
    if hour.len() != 2 || minute.len() != 2 {
        return None;
    }
    Some(format!("{month}/{day}/{year} {hour}:{minute}"))
}

fn split_date(raw: &str) -> Option<(u16, u8, u8)> {
    let mut parts = raw.split('-');
    let year: u16 = parts.next()?.parse().ok()?;
    let month: u8 = parts.next()?.parse().ok()?;
    let day: u8 = parts.next()?.parse().ok()?;
    if parts.next().is_some() || !(1..=12).contains(&month) || !(1..=31).contains(&day) {
        return None;
    }
    Some((year, month, day))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fields::{flatten_choices, FieldMetadata};

    fn metadata(field_type: FieldType, choices: Option<&str>) -> FieldMetadata {
        FieldMetadata {
            field_name: "f".into(),
            form: "form".into(),
            label: "F".into(),
            field_type,
            element_type: "text".into(),
            required: false,
            choices: choices.map(flatten_choices),
            validation: None,
            config: indexmap::IndexMap::new(),
        }
    }

    #[test]
    fn select_maps_code_to_label() {
        let m = metadata(FieldType::Select, Some("bl, Blood | sr, Serum"));
        assert_eq!(display_value(&m, "sr"), "Serum");
        // unknown codes pass through
        assert_eq!(display_value(&m, "xx"), "xx");
    }

    #[test]
    fn yesno_and_truefalse() {
        assert_eq!(display_value(&metadata(FieldType::Yesno, None), "1"), "Yes");
        assert_eq!(display_value(&metadata(FieldType::Yesno, None), "0"), "No");
        assert_eq!(
            display_value(&metadata(FieldType::Truefalse, None), "1"),
            "True"
        );
    }

    #[test]
    fn dates_reformat() {
        assert_eq!(
            display_value(&metadata(FieldType::Date, None), "2024-03-07"),
            "3/7/2024"
        );
        assert_eq!(
            display_value(&metadata(FieldType::Datetime, None), "2024-03-07 09:30"),
            "3/7/2024 09:30"
        );
        assert_eq!(
            display_value(&metadata(FieldType::Datetime, None), "2024-03-07 09:30:15"),
            "3/7/2024 09:30"
        );
        // malformed values pass through untouched
        assert_eq!(
            display_value(&metadata(FieldType::Date, None), "03/07/2024"),
            "03/07/2024"
        );
    }

    #[test]
    fn empty_stays_empty() {
        assert_eq!(display_value(&metadata(FieldType::Text, None), ""), "");
    }
}
