use std::collections::{BTreeMap, HashMap};

use crate::models::Repo;

#[derive(Default)]
struct LanguageGroup {
    repos: usize,
    spellings: HashMap<String, usize>,
}

impl LanguageGroup {
    /// Most frequent spelling; ties go to the lexically smallest.
    fn display_name(&self) -> Option<&str> {
        self.spellings
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
            .map(|(name, _)| name.as_str())
    }
}

/// Percentage of repositories per primary language.
///
/// Shares are by repository count, not by bytes of code. Repositories with
/// no language are left out of the denominator. Names that differ only in
/// case are merged under their most common spelling.
pub fn language_shares(repos: &[Repo]) -> BTreeMap<String, f64> {
    let mut groups: HashMap<String, LanguageGroup> = HashMap::new();
    let mut total = 0usize;

    for language in repos
        .iter()
        .filter_map(|r| r.primary_language.as_deref())
        .map(str::trim)
        .filter(|l| !l.is_empty())
    {
        let group = groups.entry(language.to_lowercase()).or_default();
        group.repos += 1;
        *group.spellings.entry(language.to_string()).or_insert(0) += 1;
        total += 1;
    }

    if total == 0 {
        return BTreeMap::new();
    }

    groups
        .values()
        .filter_map(|group| {
            let share = group.repos as f64 / total as f64 * 100.0;
            group.display_name().map(|name| (name.to_string(), share))
        })
        .collect()
}
