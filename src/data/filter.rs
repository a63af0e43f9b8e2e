use std::collections::{BTreeMap, BTreeSet};

use super::model::{CellValue, TweetTable};

// ---------------------------------------------------------------------------
// Row selection: which values are accepted per column
// ---------------------------------------------------------------------------

/// Per-column selection: maps column_name → set of accepted values.
/// A column absent from the map is unconstrained.
pub type RowFilter = BTreeMap<String, BTreeSet<CellValue>>;

/// Filter accepting only the given event ids.
pub fn events_filter(event_ids: impl IntoIterator<Item = i64>) -> RowFilter {
    let selected: BTreeSet<CellValue> = event_ids.into_iter().map(CellValue::Integer).collect();
    BTreeMap::from([("event_id".to_string(), selected)])
}

/// Return indices of rows that pass all filters.
///
/// A row passes a column filter when:
/// * The column does not exist in the table → fails
/// * The filter set for that column is empty → nothing selected → fails
/// * The row's value for that column is in the selected set → passes
pub fn filtered_indices(table: &TweetTable, filters: &RowFilter) -> Vec<usize> {
    let resolved: Vec<(Option<usize>, &BTreeSet<CellValue>)> = filters
        .iter()
        .map(|(col, selected)| (table.column_index(col), selected))
        .collect();

    table
        .rows()
        .iter()
        .enumerate()
        .filter(|(_, row)| {
            resolved.iter().all(|(col, selected)| match col {
                Some(idx) => selected.contains(&row[*idx]),
                None => false,
            })
        })
        .map(|(i, _)| i)
        .collect()
}

/// Convenience: the sub-table of rows passing `filters`.
pub fn select(table: &TweetTable, filters: &RowFilter) -> TweetTable {
    table.subset(&filtered_indices(table, filters))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::tests::sample_row;

    fn table() -> TweetTable {
        TweetTable::from_rows(vec![
            sample_row(1, 10),
            sample_row(2, 11),
            sample_row(3, 10),
            sample_row(4, 12),
        ])
        .unwrap()
    }

    #[test]
    fn test_select_by_event() {
        let t = table();
        assert_eq!(filtered_indices(&t, &events_filter([10])), vec![0, 2]);
        assert_eq!(filtered_indices(&t, &events_filter([11, 12])), vec![1, 3]);
    }

    #[test]
    fn test_empty_selection_hides_everything() {
        let t = table();
        assert!(filtered_indices(&t, &events_filter([])).is_empty());
    }

    #[test]
    fn test_no_filters_keeps_everything() {
        let t = table();
        assert_eq!(select(&t, &RowFilter::new()).len(), 4);
    }

    #[test]
    fn test_unknown_column_fails_rows() {
        let t = table();
        let mut f = RowFilter::new();
        f.insert("nope".into(), BTreeSet::from([CellValue::Null]));
        assert!(filtered_indices(&t, &f).is_empty());
    }
}
