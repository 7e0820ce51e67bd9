use super::manifest::TableManifest;
use std::collections::{BTreeMap, BTreeSet};

/// Static alias → table lookup built once from manifest data.
#[derive(Debug, Clone, Default)]
pub(crate) struct AliasIndex {
    entries: BTreeMap<String, BTreeSet<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum AliasMatch<'a> {
    None,
    Unique(&'a str),
    Ambiguous(Vec<String>),
}

impl AliasIndex {
    pub(crate) fn build<'a>(tables: impl IntoIterator<Item = &'a TableManifest>) -> Self {
        let mut entries = BTreeMap::<String, BTreeSet<String>>::new();
        for table in tables {
            for alias in table_aliases(table) {
                entries.entry(alias).or_default().insert(table.name.clone());
            }
        }
        Self { entries }
    }

    pub(crate) fn exact(&self, token: &str) -> AliasMatch<'_> {
        let normalized = normalize_phrase(token);
        if normalized.is_empty() {
            return AliasMatch::None;
        }
        match self.entries.get(&normalized) {
            None => AliasMatch::None,
            Some(tables) => single_or_ambiguous(tables.iter()),
        }
    }

    /// Finds aliases occurring as whole words inside `text`. The longest
    /// matching alias wins; equally long aliases naming different tables are
    /// ambiguous.
    pub(crate) fn mentioned_in(&self, text: &str) -> AliasMatch<'_> {
        let words = phrase_words(text);
        if words.is_empty() {
            return AliasMatch::None;
        }

        let mut best_len = 0usize;
        let mut best = BTreeSet::<&str>::new();
        for (alias, tables) in &self.entries {
            let alias_words = phrase_words(alias);
            if alias_words.is_empty() || !contains_run(&words, &alias_words) {
                continue;
            }
            let len = alias.chars().count();
            if len > best_len {
                best_len = len;
                best.clear();
            }
            if len == best_len {
                best.extend(tables.iter().map(String::as_str));
            }
        }

        match best.len() {
            0 => AliasMatch::None,
            1 => best
                .into_iter()
                .next()
                .map(AliasMatch::Unique)
                .unwrap_or(AliasMatch::None),
            _ => AliasMatch::Ambiguous(best.into_iter().map(str::to_string).collect()),
        }
    }
}

fn single_or_ambiguous<'a>(mut tables: impl ExactSizeIterator<Item = &'a String>) -> AliasMatch<'a> {
    if tables.len() == 1 {
        return tables
            .next()
            .map(|table| AliasMatch::Unique(table.as_str()))
            .unwrap_or(AliasMatch::None);
    }
    AliasMatch::Ambiguous(tables.cloned().collect())
}

fn table_aliases(table: &TableManifest) -> BTreeSet<String> {
    let mut aliases = BTreeSet::new();
    aliases.insert(normalize_phrase(&table.name));
    aliases.insert(normalize_phrase(&table.name.replace('_', " ")));
    for alias in &table.aliases {
        let normalized = normalize_phrase(alias);
        if !normalized.is_empty() {
            aliases.insert(normalized);
        }
    }
    aliases
}

pub(crate) fn phrase_words(input: &str) -> Vec<String> {
    input
        .to_ascii_lowercase()
        .replace('\'', "")
        .split(|c: char| !c.is_ascii_alphanumeric() && c != '_')
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}

pub(crate) fn normalize_phrase(input: &str) -> String {
    phrase_words(input).join(" ")
}

fn contains_run(haystack: &[String], needle: &[String]) -> bool {
    needle.len() <= haystack.len()
        && haystack
            .windows(needle.len())
            .any(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(name: &str, aliases: &[&str]) -> TableManifest {
        TableManifest {
            name: name.to_string(),
            description: None,
            aliases: aliases.iter().map(|alias| alias.to_string()).collect(),
            columns: Vec::new(),
        }
    }

    #[test]
    fn normalizes_case_punctuation_and_spacing() {
        assert_eq!(normalize_phrase("  Create   Schedule! "), "create schedule");
        assert_eq!(normalize_phrase("owner's"), "owners");
    }

    #[test]
    fn longest_mentioned_alias_wins() {
        let tables = [
            table("scheduler_details", &["schedule"]),
            table("scheduler_task_details", &["schedule task"]),
        ];
        let index = AliasIndex::build(tables.iter());
        assert_eq!(
            index.mentioned_in("create a schedule task for friday"),
            AliasMatch::Unique("scheduler_task_details")
        );
        assert_eq!(
            index.mentioned_in("create a schedule"),
            AliasMatch::Unique("scheduler_details")
        );
    }

    #[test]
    fn aliases_only_match_whole_words() {
        let tables = [table("users", &["user"])];
        let index = AliasIndex::build(tables.iter());
        assert_eq!(index.mentioned_in("superuser access"), AliasMatch::None);
    }
}
