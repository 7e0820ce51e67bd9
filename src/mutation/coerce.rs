use super::value::SqlValue;
use crate::catalog::{ColumnDef, ColumnType};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

const DATE_TIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%d %H:%M:%S",
];

const TRUE_WORDS: &[&str] = &["yes", "y", "true", "t", "1", "on"];
const FALSE_WORDS: &[&str] = &["no", "n", "false", "f", "0", "off"];

/// Converts raw user text into the column's declared type. The error string is
/// shown to the user as the correction reason.
pub fn coerce_value(column: &ColumnDef, raw: &str) -> Result<SqlValue, String> {
    let text = strip_quotes(raw.trim());
    if text.is_empty() {
        return Err(format!("`{}` cannot be empty", column.name));
    }
    let text = if column.options.is_empty() {
        text.to_string()
    } else {
        normalize_option(column, text)?
    };

    match column.column_type {
        ColumnType::Text => {
            if let Some(max) = column.max_length {
                let len = text.chars().count();
                if len > max {
                    return Err(format!(
                        "`{}` allows at most {max} characters (got {len})",
                        column.name
                    ));
                }
            }
            Ok(SqlValue::Text(text))
        }
        ColumnType::Integer => text
            .replace('_', "")
            .parse::<i64>()
            .map(SqlValue::Integer)
            .map_err(|_| format!("`{}` expects a whole number, got `{text}`", column.name)),
        ColumnType::Decimal => text
            .parse::<f64>()
            .ok()
            .filter(|value| value.is_finite())
            .map(SqlValue::Decimal)
            .ok_or_else(|| format!("`{}` expects a number, got `{text}`", column.name)),
        ColumnType::Boolean => {
            let lowered = text.to_ascii_lowercase();
            if TRUE_WORDS.contains(&lowered.as_str()) {
                Ok(SqlValue::Boolean(true))
            } else if FALSE_WORDS.contains(&lowered.as_str()) {
                Ok(SqlValue::Boolean(false))
            } else {
                Err(format!("`{}` expects yes or no, got `{text}`", column.name))
            }
        }
        ColumnType::Date => NaiveDate::parse_from_str(&text, "%Y-%m-%d")
            .map(SqlValue::Date)
            .map_err(|_| {
                format!(
                    "`{}` expects a date like 2026-03-01, got `{text}`",
                    column.name
                )
            }),
        ColumnType::DateTime => parse_date_time(&text)
            .map(SqlValue::DateTime)
            .ok_or_else(|| {
                format!(
                    "`{}` expects a date and time like 2026-03-01T09:00, got `{text}`",
                    column.name
                )
            }),
    }
}

fn parse_date_time(text: &str) -> Option<NaiveDateTime> {
    DATE_TIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .map(|date| date.and_time(NaiveTime::MIN))
        })
}

/// Accepts an option's value, its label, or the rendered `Label (value)` form.
fn normalize_option(column: &ColumnDef, text: &str) -> Result<String, String> {
    let candidate = rendered_option_value(text).unwrap_or(text);
    for option in &column.options {
        if option.value.eq_ignore_ascii_case(candidate) || option.label.eq_ignore_ascii_case(text)
        {
            return Ok(option.value.clone());
        }
    }
    let choices = column
        .options
        .iter()
        .map(|option| format!("{} ({})", option.label, option.value))
        .collect::<Vec<_>>()
        .join(", ");
    Err(format!("`{}` must be one of: {choices}", column.name))
}

fn rendered_option_value(text: &str) -> Option<&str> {
    let inner = text.strip_suffix(')')?;
    let open = inner.rfind('(')?;
    let value = inner[open + 1..].trim();
    (!value.is_empty()).then_some(value)
}

fn strip_quotes(text: &str) -> &str {
    let trimmed = text
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .or_else(|| {
            text.strip_prefix('\'')
                .and_then(|rest| rest.strip_suffix('\''))
        })
        .unwrap_or(text);
    trimmed.trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ColumnOption;

    fn column(name: &str, column_type: ColumnType) -> ColumnDef {
        ColumnDef::new(name, column_type)
    }

    #[test]
    fn date_time_accepts_iso_minutes_and_date_only() {
        let def = column("start_time", ColumnType::DateTime);
        let parsed = coerce_value(&def, "2026-03-01T09:00").expect("iso minutes");
        assert_eq!(parsed.to_string(), "2026-03-01 09:00:00");
        let midnight = coerce_value(&def, "2026-03-01").expect("date only");
        assert_eq!(midnight.to_string(), "2026-03-01 00:00:00");
        assert!(coerce_value(&def, "not-a-date").is_err());
    }

    #[test]
    fn option_labels_normalize_to_values() {
        let mut def = column("occurrence", ColumnType::Integer);
        def.options = vec![
            ColumnOption {
                label: "Daily".to_string(),
                value: "1".to_string(),
            },
            ColumnOption {
                label: "Weekly".to_string(),
                value: "2".to_string(),
            },
        ];
        assert_eq!(
            coerce_value(&def, "Weekly (2)").expect("rendered"),
            SqlValue::Integer(2)
        );
        assert_eq!(coerce_value(&def, "daily").expect("label"), SqlValue::Integer(1));
        let err = coerce_value(&def, "monthly").expect_err("unknown option");
        assert!(err.contains("Daily (1), Weekly (2)"));
    }

    #[test]
    fn text_respects_max_length_and_strips_quotes() {
        let mut def = column("name", ColumnType::Text);
        def.max_length = Some(5);
        assert_eq!(
            coerce_value(&def, "\"Sync\"").expect("quoted"),
            SqlValue::Text("Sync".to_string())
        );
        assert!(coerce_value(&def, "Weekly Sync").is_err());
        assert!(coerce_value(&def, "   ").is_err());
    }

    #[test]
    fn booleans_accept_yes_no_words() {
        let def = column("active", ColumnType::Boolean);
        assert_eq!(coerce_value(&def, "Yes").expect("yes"), SqlValue::Boolean(true));
        assert_eq!(coerce_value(&def, "off").expect("off"), SqlValue::Boolean(false));
        assert!(coerce_value(&def, "maybe").is_err());
    }
}
