use std::collections::HashSet;
use std::ops::Range;

use serde::ser::{Serialize, SerializeMap, Serializer};
use tracing::{debug, warn};

use super::price::{convert_cell, PriceCell};
use crate::config::Conventions;
use crate::db::RawRow;
use crate::error::SegmentError;

/// Half-open row range of one category, named by the row right before the
/// sentinel that closes it.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct CategoryBlock {
    pub label: String,
    pub start: usize,
    pub end: usize,
}

impl CategoryBlock {
    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }
}

/// All category blocks of one table, computed in a single scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryIndex {
    blocks: Vec<CategoryBlock>,
    first_sentinel: usize,
}

impl CategoryIndex {
    pub fn build(rows: &[RawRow], conventions: &Conventions) -> Result<Self, SegmentError> {
        let mut blocks = Vec::new();
        let mut first_sentinel = None;
        let mut start = 0;

        for (i, row) in rows.iter().enumerate() {
            if !conventions.is_sentinel(&row.row_type) {
                continue;
            }
            first_sentinel.get_or_insert(i);
            push_block(&mut blocks, rows, start, i);
            start = i + 1;
        }

        let Some(first_sentinel) = first_sentinel else {
            return Err(SegmentError::NoSentinel {
                sentinel: conventions.sentinel.clone(),
            });
        };
        // Trailing rows run to the end of the table.
        push_block(&mut blocks, rows, start, rows.len());

        Ok(Self {
            blocks,
            first_sentinel,
        })
    }

    pub fn blocks(&self) -> &[CategoryBlock] {
        &self.blocks
    }

    /// Rows before the first sentinel.
    pub fn leading(&self) -> Range<usize> {
        0..self.first_sentinel
    }

    pub fn find(&self, category: &str, conventions: &Conventions) -> Option<Range<usize>> {
        if conventions.is_leading(category) {
            return Some(self.leading()).filter(|r| !r.is_empty());
        }
        let wanted = category.trim();
        self.blocks
            .iter()
            .find(|b| b.label == wanted)
            .map(CategoryBlock::range)
    }
}

fn push_block(blocks: &mut Vec<CategoryBlock>, rows: &[RawRow], start: usize, end: usize) {
    if end <= start {
        return;
    }
    blocks.push(CategoryBlock {
        label: rows[end - 1].row_type.trim().to_string(),
        start,
        end,
    });
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceEntry {
    pub label: String,
    pub cell: PriceCell,
}

/// Item label → price for one category block, in table order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryRecord {
    pub category: String,
    pub entries: Vec<PriceEntry>,
}

impl CategoryRecord {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `None` if the label is not in the record, `Some(None)` if its price is absent.
    #[cfg(test)]
    pub fn get(&self, label: &str) -> Option<Option<u64>> {
        self.entries
            .iter()
            .find(|e| e.label == label)
            .map(|e| e.cell.amount())
    }

    pub fn amounts(&self) -> impl Iterator<Item = (&str, Option<u64>)> {
        self.entries.iter().map(|e| (e.label.as_str(), e.cell.amount()))
    }

    pub fn malformed_count(&self) -> usize {
        self.entries.iter().filter(|e| e.cell.is_malformed()).count()
    }
}

impl Serialize for CategoryRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (label, amount) in self.amounts() {
            map.serialize_entry(label, &amount)?;
        }
        map.end()
    }
}

/// " Local  transport " → "Localtransport". Only ASCII spaces are removed
/// inside the label.
pub fn clean_label(raw: &str) -> String {
    raw.trim().replace(' ', "")
}

/// Segment `rows` and reduce the block of `category` to a record.
///
/// `Ok(None)` means the category has no data in this table.
pub fn segment(
    rows: &[RawRow],
    category: &str,
    conventions: &Conventions,
) -> Result<Option<CategoryRecord>, SegmentError> {
    let index = CategoryIndex::build(rows, conventions)?;
    Ok(segment_indexed(&index, rows, category, conventions))
}

/// Same as [`segment`], reusing an index built for this table.
pub fn segment_indexed(
    index: &CategoryIndex,
    rows: &[RawRow],
    category: &str,
    conventions: &Conventions,
) -> Option<CategoryRecord> {
    let Some(range) = index.find(category, conventions) else {
        debug!("Category {:?} not present in table", category);
        return None;
    };
    Some(build_record(category, &rows[range], conventions))
}

fn build_record(category: &str, rows: &[RawRow], conventions: &Conventions) -> CategoryRecord {
    let mut seen: HashSet<String> = HashSet::new();
    let mut entries = Vec::with_capacity(rows.len());

    for row in rows {
        if conventions.is_sentinel(&row.row_type) {
            continue;
        }
        let label = clean_label(&row.row_type);
        if !seen.insert(label.clone()) {
            warn!("Duplicate item {:?} in category {:?}, keeping first", label, category);
            continue;
        }
        // The sentinel text can also sit in the price column; it is never a price.
        let cell = if conventions.is_sentinel(&row.avg_price) {
            PriceCell::Unknown
        } else {
            convert_cell(&row.avg_price, &conventions.unknown_marker)
        };
        entries.push(PriceEntry { label, cell });
    }

    CategoryRecord {
        category: category.trim().to_string(),
        entries,
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(pairs: &[(&str, &str)]) -> Vec<RawRow> {
        pairs.iter().map(|(t, p)| RawRow::new(t, p)).collect()
    }

    fn fixture(name: &str) -> Vec<RawRow> {
        let json = std::fs::read_to_string(format!("tests/fixtures/{}.json", name)).unwrap();
        serde_json::from_str::<crate::db::RawPage>(&json).unwrap().rows
    }

    fn sample() -> Vec<RawRow> {
        rows(&[
            ("Water", "1,20€"),
            ("Edit", ""),
            ("Milk", "?"),
            ("Edit", ""),
        ])
    }

    #[test]
    fn end_to_end_small_table() {
        let conv = Conventions::default();
        let table = sample();

        let first = segment(&table, "Water", &conv).unwrap().unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first.get("Water"), Some(Some(120)));
        assert_eq!(first.get("Edit"), None);

        let second = segment(&table, "Milk", &conv).unwrap().unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second.get("Milk"), Some(None));
        assert_eq!(
            serde_json::to_string(&second).unwrap(),
            r#"{"Milk":null}"#
        );
    }

    #[test]
    fn leading_group_is_rows_before_first_sentinel() {
        let conv = Conventions::default();
        let table = rows(&[
            ("Meal, Inexpensive Restaurant", "12,00€"),
            ("Cappuccino", "2,50€"),
            ("Imported Beer", "4,00€"),
            ("Edit", ""),
            ("Bread", "1,10€"),
            ("Edit", ""),
        ]);
        let record = segment(&table, "Restaurants", &conv).unwrap().unwrap();
        let labels: Vec<&str> = record.amounts().map(|(l, _)| l).collect();
        assert_eq!(labels, ["Meal,InexpensiveRestaurant", "Cappuccino", "ImportedBeer"]);
        assert_eq!(record.get("Cappuccino"), Some(Some(250)));
    }

    #[test]
    fn bracketed_block_counts_rows_between_sentinels() {
        let conv = Conventions::default();
        let table = rows(&[
            ("a", "1"),
            ("Edit", ""),
            ("b", "2"),
            ("c", "3"),
            ("Markets", "4"),
            ("Edit", ""),
            ("d", "5"),
        ]);
        let record = segment(&table, "Markets", &conv).unwrap().unwrap();
        assert_eq!(record.len(), 3);
        assert_eq!(record.get("b"), Some(Some(2)));
        assert_eq!(record.get("a"), None);
        assert_eq!(record.get("d"), None);
    }

    #[test]
    fn trailing_rows_extend_to_end_of_table() {
        let conv = Conventions::default();
        let table = rows(&[("a", "1"), ("Edit", ""), ("b", "2"), ("Rent", "3")]);
        let index = CategoryIndex::build(&table, &conv).unwrap();
        assert_eq!(
            index.blocks().last(),
            Some(&CategoryBlock { label: "Rent".into(), start: 2, end: 4 })
        );
        assert_eq!(segment(&table, "Rent", &conv).unwrap().unwrap().len(), 2);
    }

    #[test]
    fn block_sizes_follow_sentinels_not_counts() {
        let conv = Conventions::default();
        let table = rows(&[
            ("a", "1"),
            ("Edit", ""),
            ("b", "1"),
            ("c", "1"),
            ("d", "1"),
            ("Edit", ""),
            ("e", "1"),
            ("Edit", ""),
        ]);
        let index = CategoryIndex::build(&table, &conv).unwrap();
        let lens: Vec<usize> = index.blocks().iter().map(CategoryBlock::len).collect();
        assert_eq!(lens, [1, 3, 1]);
    }

    #[test]
    fn adjacent_sentinels_make_no_block() {
        let conv = Conventions::default();
        let table = rows(&[("Edit", ""), ("Edit", ""), ("x", "1"), ("Edit", "")]);
        let index = CategoryIndex::build(&table, &conv).unwrap();
        assert_eq!(index.blocks().len(), 1);
        assert!(index.leading().is_empty());
        assert_eq!(segment(&table, "Restaurants", &conv).unwrap(), None);
    }

    #[test]
    fn missing_category_is_absent_not_error() {
        let conv = Conventions::default();
        assert_eq!(segment(&sample(), "Childcare", &conv).unwrap(), None);
    }

    #[test]
    fn table_without_sentinel_is_rejected() {
        let conv = Conventions::default();
        let err = segment(&rows(&[("a", "1"), ("b", "2")]), "a", &conv).unwrap_err();
        assert_eq!(err, SegmentError::NoSentinel { sentinel: "Edit".into() });
    }

    #[test]
    fn segment_is_idempotent() {
        let conv = Conventions::default();
        let table = fixture("berlin");
        let before = table.clone();
        let a = segment(&table, "Markets", &conv).unwrap();
        let b = segment(&table, "Markets", &conv).unwrap();
        assert_eq!(a, b);
        assert_eq!(table, before);
    }

    #[test]
    fn malformed_cells_stay_in_record() {
        let conv = Conventions::default();
        let table = rows(&[("Taxi 1km", "n/a"), ("Bus ticket", "2,90€"), ("Edit", "")]);
        let record = segment(&table, "Restaurants", &conv).unwrap().unwrap();
        assert_eq!(record.len(), 2);
        assert_eq!(record.get("Taxi1km"), Some(None));
        assert_eq!(record.malformed_count(), 1);
    }

    #[test]
    fn duplicate_labels_keep_first() {
        let conv = Conventions::default();
        let table = rows(&[("Eggs", "3,00€"), ("Eggs ", "9,00€"), ("Edit", "")]);
        let record = segment(&table, "Restaurants", &conv).unwrap().unwrap();
        assert_eq!(record.len(), 1);
        assert_eq!(record.get("Eggs"), Some(Some(300)));
    }

    #[test]
    fn berlin_fixture_categories() {
        let conv = Conventions::default();
        let table = fixture("berlin");
        let index = CategoryIndex::build(&table, &conv).unwrap();
        let labels: Vec<&str> = index.blocks().iter().map(|b| b.label.as_str()).collect();
        assert_eq!(
            labels,
            ["Cappuccino (regular)", "Markets", "Transportation", "Utilities"]
        );

        let restaurants = segment_indexed(&index, &table, "Restaurants", &conv).unwrap();
        assert_eq!(restaurants.len(), 3);
        assert_eq!(restaurants.get("McMealatMcDonalds"), Some(Some(1000)));

        let transport = segment_indexed(&index, &table, "Transportation", &conv).unwrap();
        assert_eq!(transport.len(), 4);
        assert_eq!(transport.get("Monthlypass"), Some(Some(4900)));
        assert_eq!(transport.get("Taxi1km"), Some(None));
    }

    #[test]
    fn clean_label_removes_spaces_only() {
        assert_eq!(clean_label("  Local  transport ticket "), "Localtransportticket");
        assert_eq!(clean_label("Taxi\u{a0}1km"), "Taxi\u{a0}1km");
    }

    #[test]
    fn sentinel_text_in_price_column_is_not_parsed() {
        let conv = Conventions::default();
        let table = rows(&[
            ("Water", "1,20€"),
            ("Markets", "Edit"),
            ("Edit", ""),
            ("Milk", "?"),
            ("Edit", ""),
        ]);
        let record = segment(&table, "Markets", &conv).unwrap().unwrap();
        assert_eq!(record.len(), 2);
        assert_eq!(record.get("Water"), Some(Some(120)));
        assert_eq!(record.get("Markets"), Some(None));
        assert_eq!(record.malformed_count(), 0);
    }
}
