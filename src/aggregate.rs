use std::collections::HashMap;

use camino::Utf8PathBuf;
use chrono::{DateTime, SecondsFormat, Utc};
use clap::ValueEnum;
use serde::Serialize;

use crate::app::{ApplyReport, ResultEntry, SkippedDataset};
use crate::catalog::{DatasetRecord, SkippedRow};
use crate::error::AtlasError;
use crate::frame::{ObsFrame, TallyTable};
use crate::store::Store;
use crate::table_io::{write_frame_tsv_gz, write_tsv};
use crate::transform::DatasetCategories;

pub const ALL_OBS_FILE: &str = "all_obs.tsv.gz";
pub const ALL_OBS_STANDARD_FILE: &str = "all_obs_standard.tsv.gz";
pub const ALL_OBS_STANDARD_COUNTS_FILE: &str = "all_obs_standard_counts.tsv.gz";
pub const CATEGORY_COUNTS_FILE: &str = "category_counts.tsv";
pub const N_CATEGORIES_FILE: &str = "n_categories.tsv";
pub const RUN_SUMMARY_FILE: &str = "run_summary.json";

pub const COUNT_COLUMN: &str = "n_cells";

pub const CATEGORY_COUNTS_HEADER: [&str; 2] = ["n_categories", "counts"];
pub const N_CATEGORIES_HEADER: [&str; 5] = [
    "exp_url",
    "n_col_one_category",
    "n_col_two_or_more_category",
    "largest_category_n",
    "largest_category_label",
];

/// Per-row column naming the dataset a concatenated row came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    #[default]
    None,
    ExplorerUrl,
    DatasetUri,
}

impl Provenance {
    pub fn column(self) -> Option<&'static str> {
        match self {
            Provenance::None => None,
            Provenance::ExplorerUrl => Some("explorer_url"),
            Provenance::DatasetUri => Some("dataset_uri"),
        }
    }

    fn value(self, record: &DatasetRecord) -> Option<String> {
        match self {
            Provenance::None => None,
            Provenance::ExplorerUrl => Some(record.explorer_url.clone()),
            Provenance::DatasetUri => Some(record.locator.to_string()),
        }
    }
}

/// Stacks per-dataset frames. Columns are the union of all inputs in
/// first-seen order and cells a dataset does not have are missing.
pub fn concat_frames(
    entries: &[ResultEntry<ObsFrame>],
    provenance: Provenance,
) -> Result<ObsFrame, AtlasError> {
    let parts: Vec<_> = entries
        .iter()
        .map(|entry| (&entry.value, &entry.record))
        .collect();
    concat(&parts, provenance)
}

/// Like [`concat_frames`] with the group counts appended as `n_cells`.
pub fn concat_tallies(
    entries: &[ResultEntry<TallyTable>],
    provenance: Provenance,
) -> Result<ObsFrame, AtlasError> {
    let parts: Vec<_> = entries
        .iter()
        .map(|entry| (entry.value.frame(), &entry.record))
        .collect();
    let mut frame = concat(&parts, provenance)?;
    let counts = entries
        .iter()
        .flat_map(|entry| entry.value.counts())
        .map(|count| Some(count.to_string()))
        .collect();
    frame.push_column(COUNT_COLUMN, counts)?;
    Ok(frame)
}

fn concat(
    parts: &[(&ObsFrame, &DatasetRecord)],
    provenance: Provenance,
) -> Result<ObsFrame, AtlasError> {
    let mut positions: HashMap<&str, usize> = HashMap::new();
    let mut columns = Vec::new();
    let names = parts
        .iter()
        .flat_map(|(frame, _)| frame.columns().iter().map(String::as_str))
        .chain(provenance.column());
    for name in names {
        if !positions.contains_key(name) {
            positions.insert(name, columns.len());
            columns.push(name.to_string());
        }
    }
    let width = columns.len();
    let provenance_position = provenance.column().and_then(|name| positions.get(name).copied());

    let mut merged = ObsFrame::new(columns);
    for (frame, record) in parts {
        let targets: Vec<usize> = frame
            .columns()
            .iter()
            .map(|name| positions[name.as_str()])
            .collect();
        for (label, row) in frame.labels().iter().zip(frame.rows()) {
            let mut values = vec![None; width];
            for (&target, value) in targets.iter().zip(row) {
                values[target] = value.clone();
            }
            if let Some(position) = provenance_position {
                values[position] = provenance.value(record);
            }
            merged.push_row(label.clone(), values)?;
        }
    }
    Ok(merged)
}

/// How many columns across the corpus have a given number of categories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryCount {
    pub n_categories: usize,
    pub counts: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatasetCategoryRow {
    pub exp_url: String,
    pub n_col_one_category: usize,
    pub n_col_two_or_more_category: usize,
    pub largest_category_n: usize,
    pub largest_category_label: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CategoryCensus {
    pub histogram: Vec<CategoryCount>,
    pub datasets: Vec<DatasetCategoryRow>,
}

impl CategoryCensus {
    pub fn from_entries(entries: &[ResultEntry<DatasetCategories>]) -> Self {
        let mut counter: HashMap<usize, usize> = HashMap::new();
        let mut datasets = Vec::with_capacity(entries.len());
        for entry in entries {
            let summary = &entry.value;
            for &n_categories in &summary.n_categories_per_column {
                *counter.entry(n_categories).or_default() += 1;
            }
            datasets.push(DatasetCategoryRow {
                exp_url: entry.record.explorer_url.clone(),
                n_col_one_category: summary.n_col_one_category,
                n_col_two_or_more_category: summary.n_col_two_or_more_category,
                largest_category_n: summary.largest_category_n,
                largest_category_label: summary.largest_category_label.clone(),
            });
        }

        let mut histogram: Vec<CategoryCount> = counter
            .into_iter()
            .map(|(n_categories, counts)| CategoryCount {
                n_categories,
                counts,
            })
            .collect();
        histogram.sort_by(|a, b| {
            b.counts
                .cmp(&a.counts)
                .then_with(|| a.n_categories.cmp(&b.n_categories))
        });

        Self {
            histogram,
            datasets,
        }
    }

    /// Writes `category_counts.tsv` and `n_categories.tsv`.
    pub fn persist(&self, store: &Store) -> Result<Vec<Utf8PathBuf>, AtlasError> {
        let histogram_path = store.result_path(CATEGORY_COUNTS_FILE);
        write_tsv(&histogram_path, &CATEGORY_COUNTS_HEADER, &self.histogram)?;
        let datasets_path = store.result_path(N_CATEGORIES_FILE);
        write_tsv(&datasets_path, &N_CATEGORIES_HEADER, &self.datasets)?;
        Ok(vec![histogram_path, datasets_path])
    }
}

/// Writes a concatenated frame under the results directory.
pub fn persist_frame(
    store: &Store,
    file_name: &str,
    frame: &ObsFrame,
) -> Result<Utf8PathBuf, AtlasError> {
    let path = store.result_path(file_name);
    write_frame_tsv_gz(&path, frame)?;
    Ok(path)
}

/// Machine-readable record of one run, written next to its outputs.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub transform: String,
    pub started_at: String,
    pub finished_at: String,
    pub attempted: usize,
    pub processed: Vec<String>,
    pub skipped: Vec<SkippedDataset>,
    pub catalog_skipped: Vec<SkippedRow>,
    pub outputs: Vec<String>,
}

impl RunSummary {
    pub fn from_report<T>(
        report: &ApplyReport<T>,
        started_at: DateTime<Utc>,
        outputs: Vec<Utf8PathBuf>,
    ) -> Self {
        Self {
            transform: report.transform.clone(),
            started_at: started_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            finished_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            attempted: report.attempted,
            processed: report.keys().map(ToString::to_string).collect(),
            skipped: report.skipped.clone(),
            catalog_skipped: report.catalog_skipped.clone(),
            outputs: outputs.iter().map(ToString::to_string).collect(),
        }
    }

    pub fn persist(&self, store: &Store) -> Result<Utf8PathBuf, AtlasError> {
        let path = store.result_path(RUN_SUMMARY_FILE);
        let json = serde_json::to_vec_pretty(self).map_err(|err| AtlasError::OutputWrite {
            path: path.as_std_path().to_path_buf(),
            message: err.to_string(),
        })?;
        Store::write_atomic(&path, |out| out.write_all(&json))?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DatasetKey, S3Uri};

    fn record(uri: &str) -> DatasetRecord {
        let locator: S3Uri = uri.parse().unwrap();
        DatasetRecord {
            production_locator: locator.to_production(),
            locator,
            explorer_url: format!("https://explorer.example/{}", uri.len()),
            collection_id: "c".to_string(),
            collection_name: "collection".to_string(),
            cell_count: 0,
            organisms: Vec::new(),
            tissues: Vec::new(),
            assays: Vec::new(),
        }
    }

    fn entry<T>(uri: &str, value: T) -> ResultEntry<T> {
        let record = record(uri);
        ResultEntry {
            key: DatasetKey::from(record.locator.clone()),
            record,
            value,
        }
    }

    fn frame(columns: &[&str], rows: &[(&str, &[Option<&str>])]) -> ObsFrame {
        let mut frame = ObsFrame::new(columns.iter().map(ToString::to_string).collect());
        for (label, row) in rows {
            let row = row.iter().map(|value| value.map(str::to_string)).collect();
            frame.push_row(label.to_string(), row).unwrap();
        }
        frame
    }

    #[test]
    fn concat_unions_columns_in_first_seen_order() {
        let one = frame(&["sex", "tissue"], &[("a", &[Some("male"), Some("lung")])]);
        let two = frame(&["donor_id", "sex"], &[("b", &[Some("d1"), Some("female")])]);
        let entries = vec![entry("s3://b/one.h5ad", one), entry("s3://b/two.h5ad", two)];
        let merged = concat_frames(&entries, Provenance::DatasetUri).unwrap();
        assert_eq!(merged.columns(), ["sex", "tissue", "donor_id", "dataset_uri"]);
        assert_eq!(merged.n_rows(), 2);
        assert_eq!(merged.value(1, "tissue"), None);
        assert_eq!(merged.value(1, "sex"), Some("female"));
        assert_eq!(merged.value(0, "dataset_uri"), Some("s3://b/one.h5ad"));
    }

    #[test]
    fn concat_tallies_appends_counts() {
        let mut first = TallyTable::new(vec!["sex".to_string()]);
        first
            .push_group("a".to_string(), vec![Some("male".to_string())], 3)
            .unwrap();
        let mut second = TallyTable::new(vec!["sex".to_string()]);
        second
            .push_group("b".to_string(), vec![Some("male".to_string())], 4)
            .unwrap();
        let merged = concat_tallies(
            &[entry("s3://b/one.h5ad", first), entry("s3://b/two.h5ad", second)],
            Provenance::None,
        )
        .unwrap();
        assert_eq!(merged.columns(), ["sex", COUNT_COLUMN]);
        assert_eq!(merged.value(1, COUNT_COLUMN), Some("4"));
    }

    #[test]
    fn census_orders_by_frequency() {
        let one = DatasetCategories {
            n_col_one_category: 1,
            n_col_two_or_more_category: 2,
            largest_category_n: 5,
            largest_category_label: Some("cell_type".to_string()),
            n_categories_per_column: vec![5, 2, 1],
        };
        let two = DatasetCategories {
            n_categories_per_column: vec![2, 1],
            ..DatasetCategories::default()
        };
        let census = CategoryCensus::from_entries(&[
            entry("s3://b/one.h5ad", one),
            entry("s3://b/two.h5ad", two),
        ]);
        let ordered: Vec<(usize, usize)> = census
            .histogram
            .iter()
            .map(|count| (count.n_categories, count.counts))
            .collect();
        assert_eq!(ordered, vec![(1, 2), (2, 2), (5, 1)]);
        assert_eq!(census.datasets.len(), 2);
        assert_eq!(
            census.datasets[0].largest_category_label.as_deref(),
            Some("cell_type")
        );
    }
}
