use crate::catalog::TableManifest;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;

static ASSIGNMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*([A-Za-z_][A-Za-z0-9_ ]*?)\s*(?:=|:|\s+is\s+)\s*(.*?)\s*$")
        .expect("assignment pattern is valid")
});

static INLINE_PAIR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\b([A-Za-z_][A-Za-z0-9_]*)\s*[=:]\s*(?:"([^"]*)"|'([^']*)'|([^\s,;]+))"#)
        .expect("inline pair pattern is valid")
});

/// Reads `field=value`, `field: value` or `field is value` pieces separated by
/// `,` or `;`. Every key must name a column of `table`; otherwise the whole
/// turn is treated as a plain value and nothing is returned. A piece without
/// a key continues the previous value.
pub fn parse_assignments(table: &TableManifest, text: &str) -> Vec<(String, String)> {
    let mut assignments: Vec<(String, String)> = Vec::new();
    let mut previous_separator = "";
    let mut rest = text;
    while !rest.is_empty() {
        let (piece, separator, tail) = match rest.find([',', ';']) {
            Some(index) => (&rest[..index], &rest[index..index + 1], &rest[index + 1..]),
            None => (rest, "", ""),
        };
        let parsed = ASSIGNMENT.captures(piece).and_then(|caps| {
            let column = table.column(caps.get(1)?.as_str())?;
            Some((column.name.clone(), caps.get(2)?.as_str().to_string()))
        });
        match (parsed, assignments.last_mut()) {
            (Some(pair), _) => assignments.push(pair),
            (None, Some((_, value))) => {
                value.push_str(previous_separator);
                value.push_str(piece);
            }
            (None, None) => return Vec::new(),
        }
        previous_separator = separator;
        rest = tail;
    }
    for (_, value) in &mut assignments {
        *value = value.trim().to_string();
    }
    if assignments.iter().any(|(_, value)| value.is_empty()) {
        return Vec::new();
    }
    assignments
}

/// Collects `key=value` / `key: value` pairs embedded anywhere in free text.
/// Keys are returned as written; callers match them against the catalog.
pub fn extract_inline_pairs(text: &str) -> BTreeMap<String, String> {
    INLINE_PAIR
        .captures_iter(text)
        .filter_map(|caps| {
            let key = caps.get(1)?.as_str().to_ascii_lowercase();
            let value = caps
                .get(2)
                .or_else(|| caps.get(3))
                .or_else(|| caps.get(4))?
                .as_str()
                .to_string();
            Some((key, value))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ColumnDef, ColumnType};

    fn schedule() -> TableManifest {
        TableManifest {
            name: "schedule".to_string(),
            description: None,
            aliases: Vec::new(),
            columns: vec![
                ColumnDef::new("name", ColumnType::Text),
                ColumnDef::new("start_time", ColumnType::DateTime),
                ColumnDef::new("owner_id", ColumnType::Integer),
            ],
        }
    }

    #[test]
    fn parses_mixed_separators_and_styles() {
        let pairs = parse_assignments(&schedule(), "owner_id=42; Name is Weekly Sync");
        assert_eq!(
            pairs,
            vec![
                ("owner_id".to_string(), "42".to_string()),
                ("name".to_string(), "Weekly Sync".to_string()),
            ]
        );
    }

    #[test]
    fn date_time_values_keep_their_colons() {
        let pairs = parse_assignments(&schedule(), "start_time: 2026-03-01T09:00");
        assert_eq!(
            pairs,
            vec![("start_time".to_string(), "2026-03-01T09:00".to_string())]
        );
    }

    #[test]
    fn unknown_keys_mean_plain_value() {
        assert!(parse_assignments(&schedule(), "Standup: daily").is_empty());
        assert!(parse_assignments(&schedule(), "2026-03-01T09:00").is_empty());
    }

    #[test]
    fn trailing_pieces_continue_previous_value() {
        let pairs = parse_assignments(&schedule(), "name=Sync, weekly");
        assert_eq!(pairs, vec![("name".to_string(), "Sync, weekly".to_string())]);
    }

    #[test]
    fn inline_pairs_support_quotes() {
        let pairs = extract_inline_pairs(r#"create schedule name="Weekly Sync" owner_id=42"#);
        assert_eq!(pairs.get("name").map(String::as_str), Some("Weekly Sync"));
        assert_eq!(pairs.get("owner_id").map(String::as_str), Some("42"));
    }
}
