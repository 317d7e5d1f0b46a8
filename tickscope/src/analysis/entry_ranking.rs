//! Ranking of native-entry tick counts.

use std::collections::HashMap;

/// One row of the native-entry ranking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryRank {
    pub name: String,
    pub ticks: u64,
}

/// Synthetic row summing every entry's ticks.
pub const TOTAL_LABEL: &str = "TOTAL";

/// Rank native entries by attributed tick count.
///
/// A synthetic TOTAL row carrying the sum is prepended, then the whole set is
/// sorted by ticks descending with ties broken by name. Because TOTAL holds
/// the sum of non-negative counts it sorts first, except in the degenerate
/// all-zero case where only the name tiebreak orders it.
#[must_use]
pub fn rank_native_entries(table: &HashMap<String, u64>) -> Vec<EntryRank> {
    let mut rows = Vec::with_capacity(table.len() + 1);
    rows.push(EntryRank {
        name: TOTAL_LABEL.to_string(),
        ticks: 0,
    });

    let mut total = 0;
    for (name, &ticks) in table {
        total += ticks;
        rows.push(EntryRank {
            name: name.clone(),
            ticks,
        });
    }
    rows[0].ticks = total;

    rows.sort_by(|a, b| b.ticks.cmp(&a.ticks).then_with(|| a.name.cmp(&b.name)));
    rows
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(entries: &[(&str, u64)]) -> HashMap<String, u64> {
        entries
            .iter()
            .map(|&(name, ticks)| (name.to_string(), ticks))
            .collect()
    }

    #[test]
    fn test_total_row_sums_and_sorts_first() {
        let ranked = rank_native_entries(&table(&[("f", 5), ("g", 5), ("h", 3)]));

        assert_eq!(ranked.len(), 4);
        assert_eq!(ranked[0], EntryRank { name: "TOTAL".into(), ticks: 13 });
        assert_eq!(ranked[1], EntryRank { name: "f".into(), ticks: 5 });
        assert_eq!(ranked[2], EntryRank { name: "g".into(), ticks: 5 });
        assert_eq!(ranked[3], EntryRank { name: "h".into(), ticks: 3 });
    }

    #[test]
    fn test_tie_break_is_deterministic() {
        let first = rank_native_entries(&table(&[("b", 2), ("a", 2), ("c", 2)]));
        let second = rank_native_entries(&table(&[("c", 2), ("a", 2), ("b", 2)]));
        assert_eq!(first, second);
        assert_eq!(first[1].name, "a");
        assert_eq!(first[2].name, "b");
        assert_eq!(first[3].name, "c");
    }

    #[test]
    fn test_degenerate_all_zero_counts() {
        // TOTAL ties with every entry at zero; the name tiebreak must still
        // produce a deterministic order, with TOTAL ahead of lowercase names.
        let ranked = rank_native_entries(&table(&[("f", 0), ("g", 0)]));
        assert_eq!(ranked[0], EntryRank { name: "TOTAL".into(), ticks: 0 });
        assert_eq!(ranked[1].name, "f");
        assert_eq!(ranked[2].name, "g");
    }

    #[test]
    fn test_empty_table_yields_total_only() {
        let ranked = rank_native_entries(&HashMap::new());
        assert_eq!(ranked, vec![EntryRank { name: "TOTAL".into(), ticks: 0 }]);
    }
}
