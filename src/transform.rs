//! Reductions applied to one dataset's annotation table.
//!
//! Every transform is a pure function of the table it is given. The row
//! transforms render kept cells to strings and keep the first occurrence of
//! each distinct row; grouping hashes whole rows of [`Cell`]s.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::error::AtlasError;
use crate::frame::{ObsFrame, TallyTable};
use crate::obs::{AnnotationTable, Cell, Column};

pub const DEFAULT_MAX_CATEGORIES: usize = 1000;

/// Standardized CELLxGENE schema fields.
pub const STANDARD_COLUMNS: [&str; 19] = [
    "assay_ontology_term_id",
    "cell_type_ontology_term_id",
    "development_stage_ontology_term_id",
    "donor_id",
    "is_primary_data",
    "organism_ontology_term_id",
    "self_reported_ethnicity_ontology_term_id",
    "ethnicity_ontology_term_id",
    "sex_ontology_term_id",
    "suspension_type",
    "assay",
    "cell_type",
    "development_stage",
    "disease",
    "organism",
    "self_reported_ethnicity",
    "ethnicity",
    "sex",
    "tissue",
];

/// Columns whose name contains this are skipped by [`CategorySummary`].
pub const ONTOLOGY_ID_MARKER: &str = "ontology_term_id";

pub trait ObsTransform {
    type Output;

    fn name(&self) -> &str;

    fn apply(&self, table: &AnnotationTable) -> Result<Self::Output, AtlasError>;
}

/// Drops categorical columns with more than `max_categories` categories, then
/// deduplicates rows. With `drop_non_categorical` only categorical columns
/// can survive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DropHighCardinality {
    pub max_categories: usize,
    pub drop_non_categorical: bool,
}

impl Default for DropHighCardinality {
    fn default() -> Self {
        Self {
            max_categories: DEFAULT_MAX_CATEGORIES,
            drop_non_categorical: false,
        }
    }
}

impl DropHighCardinality {
    pub fn new(max_categories: usize) -> Self {
        Self {
            max_categories,
            drop_non_categorical: false,
        }
    }

    pub fn categorical_only(mut self) -> Self {
        self.drop_non_categorical = true;
        self
    }

    pub fn kept_columns<'t>(&self, table: &'t AnnotationTable) -> Vec<&'t Column> {
        table
            .columns()
            .iter()
            .filter(|column| match column.n_categories() {
                Some(n_categories) => n_categories <= self.max_categories,
                None => !self.drop_non_categorical,
            })
            .collect()
    }
}

impl ObsTransform for DropHighCardinality {
    type Output = ObsFrame;

    fn name(&self) -> &str {
        if self.drop_non_categorical {
            "drop-high-cardinality-categorical-only"
        } else {
            "drop-high-cardinality"
        }
    }

    fn apply(&self, table: &AnnotationTable) -> Result<ObsFrame, AtlasError> {
        distinct_rows(table, &self.kept_columns(table))
    }
}

/// Keeps only allow-listed columns, in input order, then deduplicates rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowList {
    columns: Vec<String>,
}

impl AllowList {
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }

    pub fn standard() -> Self {
        Self::new(STANDARD_COLUMNS)
    }

    pub fn allowed(&self) -> &[String] {
        &self.columns
    }

    pub fn kept_columns<'t>(&self, table: &'t AnnotationTable) -> Vec<&'t Column> {
        table
            .columns()
            .iter()
            .filter(|column| self.columns.iter().any(|allowed| allowed == column.name()))
            .collect()
    }
}

impl Default for AllowList {
    fn default() -> Self {
        Self::standard()
    }
}

impl ObsTransform for AllowList {
    type Output = ObsFrame;

    fn name(&self) -> &str {
        "allow-list"
    }

    fn apply(&self, table: &AnnotationTable) -> Result<ObsFrame, AtlasError> {
        distinct_rows(table, &self.kept_columns(table))
    }
}

/// Allow-list restriction followed by a count of rows per distinct combination.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllowListTally {
    allow: AllowList,
}

impl AllowListTally {
    pub fn new(allow: AllowList) -> Self {
        Self { allow }
    }
}

impl ObsTransform for AllowListTally {
    type Output = TallyTable;

    fn name(&self) -> &str {
        "allow-list-tally"
    }

    fn apply(&self, table: &AnnotationTable) -> Result<TallyTable, AtlasError> {
        tally_rows(table, &self.allow.kept_columns(table))
    }
}

/// Category statistics of one dataset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DatasetCategories {
    pub n_col_one_category: usize,
    pub n_col_two_or_more_category: usize,
    pub largest_category_n: usize,
    pub largest_category_label: Option<String>,
    pub n_categories_per_column: Vec<usize>,
}

/// Summarizes the categorical columns that are not ontology identifiers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CategorySummary;

impl ObsTransform for CategorySummary {
    type Output = DatasetCategories;

    fn name(&self) -> &str {
        "category-summary"
    }

    fn apply(&self, table: &AnnotationTable) -> Result<DatasetCategories, AtlasError> {
        let mut summary = DatasetCategories::default();
        for column in table.columns() {
            if column.name().contains(ONTOLOGY_ID_MARKER) {
                continue;
            }
            let Some(n_categories) = column.n_categories() else {
                continue;
            };
            summary.n_categories_per_column.push(n_categories);
            if n_categories > summary.largest_category_n {
                summary.largest_category_n = n_categories;
                summary.largest_category_label = Some(column.name().to_string());
            }
            if n_categories > 1 {
                summary.n_col_two_or_more_category += 1;
            } else {
                summary.n_col_one_category += 1;
            }
        }
        Ok(summary)
    }
}

fn column_names(columns: &[&Column]) -> Vec<String> {
    columns.iter().map(|column| column.name().to_string()).collect()
}

fn row_key<'t>(columns: &[&'t Column], row: usize) -> Vec<Cell<'t>> {
    columns.iter().map(|&column| column.cell(row)).collect()
}

fn render_row(key: &[Cell<'_>]) -> Vec<Option<String>> {
    key.iter().map(Cell::render).collect()
}

fn distinct_rows(table: &AnnotationTable, columns: &[&Column]) -> Result<ObsFrame, AtlasError> {
    let mut frame = ObsFrame::new(column_names(columns));
    let mut seen = HashSet::new();
    for row in 0..table.n_rows() {
        let key = row_key(columns, row);
        if seen.contains(&key) {
            continue;
        }
        frame.push_row(table.index()[row].clone(), render_row(&key))?;
        seen.insert(key);
    }
    Ok(frame)
}

fn tally_rows(table: &AnnotationTable, columns: &[&Column]) -> Result<TallyTable, AtlasError> {
    let mut groups: HashMap<Vec<Cell<'_>>, usize> = HashMap::new();
    // (first row, count) per group, in first-seen order
    let mut order: Vec<(usize, u64)> = Vec::new();
    for row in 0..table.n_rows() {
        match groups.entry(row_key(columns, row)) {
            Entry::Occupied(entry) => order[*entry.get()].1 += 1,
            Entry::Vacant(entry) => {
                entry.insert(order.len());
                order.push((row, 1));
            }
        }
    }

    let mut tally = TallyTable::new(column_names(columns));
    for (row, count) in order {
        let rendered = render_row(&row_key(columns, row));
        tally.push_group(table.index()[row].clone(), rendered, count)?;
    }
    Ok(tally)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::obs::ColumnData;

    fn table() -> AnnotationTable {
        AnnotationTable::new(
            ["c1", "c2", "c3", "c4"].map(String::from).to_vec(),
            vec![
                Column::categorical(
                    "sex",
                    &[Some("male"), Some("male"), Some("female"), Some("male")],
                ),
                Column::categorical("donor_id", &[Some("d1"), Some("d1"), Some("d2"), Some("d1")]),
                Column::new(
                    "n_genes",
                    ColumnData::Integer(vec![Some(10), Some(11), Some(12), Some(10)]),
                ),
            ],
        )
        .unwrap()
    }

    #[test]
    fn distinct_rows_keep_first_label() {
        let frame = AllowList::new(["sex", "donor_id"]).apply(&table()).unwrap();
        assert_eq!(frame.n_rows(), 2);
        assert_eq!(frame.labels(), ["c1", "c3"]);
    }

    #[test]
    fn scalar_columns_take_part_in_dedup() {
        let frame = DropHighCardinality::default().apply(&table()).unwrap();
        assert_eq!(frame.columns(), ["sex", "donor_id", "n_genes"]);
        assert_eq!(frame.n_rows(), 3);
    }

    #[test]
    fn tally_counts_groups_in_first_seen_order() {
        let tally = AllowListTally::new(AllowList::new(["sex"]))
            .apply(&table())
            .unwrap();
        assert_eq!(tally.counts(), [3_u64, 1]);
        assert_eq!(tally.frame().value(0, "sex"), Some("male"));
        assert_eq!(tally.total(), 4);
    }

    #[test]
    fn category_summary_skips_ontology_ids() {
        let table = AnnotationTable::new(
            ["c1", "c2"].map(String::from).to_vec(),
            vec![
                Column::categorical("sex", &[Some("male"), Some("female")]),
                Column::categorical("batch", &[Some("b1"), Some("b1")]),
                Column::categorical("cell_type_ontology_term_id", &[Some("CL:1"), Some("CL:2")]),
                Column::new("n_genes", ColumnData::Float(vec![1.0, 2.0])),
            ],
        )
        .unwrap();
        let summary = CategorySummary.apply(&table).unwrap();
        assert_eq!(summary.n_categories_per_column, vec![2, 1]);
        assert_eq!(summary.n_col_one_category, 1);
        assert_eq!(summary.n_col_two_or_more_category, 1);
        assert_eq!(summary.largest_category_n, 2);
        assert_eq!(summary.largest_category_label.as_deref(), Some("sex"));
    }
}
