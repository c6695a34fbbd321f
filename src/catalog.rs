use std::collections::HashMap;
use std::fs;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::domain::{CatalogFormat, H5AD_MARKER, S3Uri};
use crate::error::AtlasError;

pub const COL_S3_URIS: &str = "S3 URIs";
pub const COL_ORGANISMS: &str = "Organisms";
pub const COL_TISSUES: &str = "Tissues";
pub const COL_ASSAYS: &str = "Assays";
pub const COL_EXPLORER_URL: &str = "Explorer URL";
pub const COL_ID: &str = "ID";
pub const COL_NAME: &str = "Name";
pub const COL_CELL_COUNT: &str = "Cell Count";

const REQUIRED_COLUMNS: [&str; 8] = [
    COL_S3_URIS,
    COL_ORGANISMS,
    COL_TISSUES,
    COL_ASSAYS,
    COL_EXPLORER_URL,
    COL_ID,
    COL_NAME,
    COL_CELL_COUNT,
];

/// Descriptive fields of one dataset, keyed by its storage locator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatasetRecord {
    pub locator: S3Uri,
    pub production_locator: S3Uri,
    pub explorer_url: String,
    pub collection_id: String,
    pub collection_name: String,
    pub cell_count: u64,
    pub organisms: Vec<String>,
    pub tissues: Vec<String>,
    pub assays: Vec<String>,
}

/// A catalog row that produced no record, with the reason it was dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedRow {
    pub row: String,
    pub reason: String,
}

/// Ordered index of datasets. Iteration follows catalog order; a locator seen
/// twice keeps its first position and its last record.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Catalog {
    records: Vec<DatasetRecord>,
    skipped: Vec<SkippedRow>,
    #[serde(skip)]
    positions: HashMap<S3Uri, usize>,
}

impl Catalog {
    pub fn load(path: &Path, format: Option<CatalogFormat>) -> Result<Self, AtlasError> {
        let format = format.unwrap_or_else(|| CatalogFormat::detect(path));
        let catalog = match format {
            CatalogFormat::Tsv => {
                let file = fs::File::open(path)
                    .map_err(|_| AtlasError::CatalogRead(path.to_path_buf()))?;
                Self::parse_tsv(file)?
            }
            CatalogFormat::Json => {
                let content = fs::read_to_string(path)
                    .map_err(|_| AtlasError::CatalogRead(path.to_path_buf()))?;
                Self::parse_json(&content)?
            }
        };

        for skipped in &catalog.skipped {
            warn!(row = %skipped.row, reason = %skipped.reason, "skipping catalog row");
        }
        info!(
            datasets = catalog.len(),
            skipped = catalog.skipped.len(),
            %format,
            "loaded catalog {}",
            path.display()
        );
        Ok(catalog)
    }

    pub fn from_records(records: impl IntoIterator<Item = DatasetRecord>) -> Self {
        let mut catalog = Self::default();
        for record in records {
            catalog.insert(record);
        }
        catalog
    }

    pub fn records(&self) -> &[DatasetRecord] {
        &self.records
    }

    pub fn skipped(&self) -> &[SkippedRow] {
        &self.skipped
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, locator: &S3Uri) -> Option<&DatasetRecord> {
        self.positions
            .get(locator)
            .and_then(|&position| self.records.get(position))
    }

    /// Parses the tab-separated portal export. The first column is a row index.
    pub fn parse_tsv<R: Read>(reader: R) -> Result<Self, AtlasError> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .flexible(true)
            .from_reader(reader);

        let headers = reader
            .headers()
            .map_err(|err| AtlasError::CatalogParse(err.to_string()))?
            .clone();
        let mut columns = ColumnIndex::new();
        for name in REQUIRED_COLUMNS {
            let position = headers
                .iter()
                .position(|header| header.trim() == name)
                .ok_or_else(|| AtlasError::CatalogColumn(name.to_string()))?;
            columns.insert(name, position);
        }

        let mut catalog = Self::default();
        for (row_number, result) in reader.records().enumerate() {
            let record = match result {
                Ok(record) => record,
                Err(err) if matches!(err.kind(), csv::ErrorKind::Io(_)) => {
                    return Err(AtlasError::CatalogParse(err.to_string()));
                }
                Err(err) => {
                    catalog.skip(format!("row {}", row_number + 1), err.to_string());
                    continue;
                }
            };
            let row_label = record
                .get(0)
                .filter(|value| !value.is_empty())
                .map(|value| format!("row {value}"))
                .unwrap_or_else(|| format!("row {}", row_number + 1));

            match parse_tsv_row(&record, &columns) {
                Ok(parsed) => {
                    for result in parsed {
                        match result {
                            Ok(record) => catalog.insert(record),
                            Err(reason) => catalog.skip(row_label.clone(), reason),
                        }
                    }
                }
                Err(reason) => catalog.skip(row_label, reason),
            }
        }
        Ok(catalog)
    }

    /// Parses the structured export: an object keyed by collection id. Only the
    /// last `h5ad` locator of a collection is kept.
    pub fn parse_json(content: &str) -> Result<Self, AtlasError> {
        let value: Value =
            serde_json::from_str(content).map_err(|err| AtlasError::CatalogParse(err.to_string()))?;
        let Value::Object(collections) = value else {
            return Err(AtlasError::CatalogParse(
                "expected an object keyed by collection".to_string(),
            ));
        };

        let mut catalog = Self::default();
        for (collection_id, value) in collections {
            let entry: JsonCollection = match serde_json::from_value(value) {
                Ok(entry) => entry,
                Err(err) => {
                    catalog.skip(format!("collection {collection_id}"), err.to_string());
                    continue;
                }
            };
            match entry.into_record(&collection_id) {
                Ok(record) => catalog.insert(record),
                Err(reason) => catalog.skip(format!("collection {collection_id}"), reason),
            }
        }
        Ok(catalog)
    }

    fn insert(&mut self, record: DatasetRecord) {
        match self.positions.get(&record.locator) {
            Some(&position) => self.records[position] = record,
            None => {
                self.positions
                    .insert(record.locator.clone(), self.records.len());
                self.records.push(record);
            }
        }
    }

    fn skip(&mut self, row: String, reason: String) {
        self.skipped.push(SkippedRow { row, reason });
    }
}

type ColumnIndex = HashMap<&'static str, usize>;

fn tsv_field<'r>(
    record: &'r csv::StringRecord,
    columns: &ColumnIndex,
    name: &str,
) -> Result<&'r str, String> {
    columns
        .get(name)
        .and_then(|&position| record.get(position))
        .ok_or_else(|| format!("missing field `{name}`"))
}

/// Fails for the whole row when a column is unusable. A single bad locator
/// only fails its own entry.
fn parse_tsv_row(
    record: &csv::StringRecord,
    columns: &ColumnIndex,
) -> Result<Vec<Result<DatasetRecord, String>>, String> {
    let cell_count = parse_cell_count(tsv_field(record, columns, COL_CELL_COUNT)?)?;
    let organisms = parse_bracket_list(tsv_field(record, columns, COL_ORGANISMS)?);
    let tissues = parse_bracket_list(tsv_field(record, columns, COL_TISSUES)?);
    let assays = parse_bracket_list(tsv_field(record, columns, COL_ASSAYS)?);
    let explorer_url = tsv_field(record, columns, COL_EXPLORER_URL)?;
    let collection_id = tsv_field(record, columns, COL_ID)?;
    let collection_name = tsv_field(record, columns, COL_NAME)?;

    let mut records = Vec::new();
    for uri in parse_bracket_list(tsv_field(record, columns, COL_S3_URIS)?) {
        if !uri.contains(H5AD_MARKER) {
            continue;
        }
        let locator = match uri.parse::<S3Uri>() {
            Ok(locator) => locator,
            Err(err) => {
                records.push(Err(err.to_string()));
                continue;
            }
        };
        records.push(Ok(DatasetRecord {
            production_locator: locator.to_production(),
            locator,
            explorer_url: explorer_url.to_string(),
            collection_id: collection_id.to_string(),
            collection_name: collection_name.to_string(),
            cell_count,
            organisms: organisms.clone(),
            tissues: tissues.clone(),
            assays: assays.clone(),
        }));
    }
    Ok(records)
}

/// Parses a list serialized as `['a', 'b']`.
pub fn parse_bracket_list(value: &str) -> Vec<String> {
    value
        .trim()
        .trim_matches(|ch| ch == '[' || ch == ']')
        .replace('\'', "")
        .split(", ")
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(ToString::to_string)
        .collect()
}

fn parse_cell_count(value: &str) -> Result<u64, String> {
    let trimmed = value.trim();
    if let Ok(count) = trimmed.parse::<u64>() {
        return Ok(count);
    }
    match trimmed.parse::<f64>() {
        Ok(count) if count.is_finite() && count >= 0.0 && count.fract() == 0.0 => {
            Ok(count as u64)
        }
        _ => Err(format!("invalid cell count `{trimmed}`")),
    }
}

#[derive(Debug, Deserialize)]
struct JsonCollection {
    s3_uris: Vec<String>,
    explorer_url: String,
    cell_count: JsonCount,
    #[serde(default)]
    organisms: Option<JsonTerms>,
    #[serde(default, alias = "tissues")]
    tissue: Option<JsonTerms>,
    #[serde(default, alias = "assays")]
    assay: Option<JsonTerms>,
    #[serde(default, alias = "collection_name")]
    name: Option<String>,
}

impl JsonCollection {
    fn into_record(self, collection_id: &str) -> Result<DatasetRecord, String> {
        let uri = self
            .s3_uris
            .iter()
            .rev()
            .find(|uri| uri.contains(H5AD_MARKER))
            .ok_or_else(|| format!("no {H5AD_MARKER} locator"))?;
        let locator: S3Uri = uri.parse().map_err(|err: AtlasError| err.to_string())?;
        Ok(DatasetRecord {
            production_locator: locator.clone(),
            locator,
            explorer_url: self.explorer_url,
            collection_id: collection_id.to_string(),
            collection_name: self.name.unwrap_or_default(),
            cell_count: self.cell_count.into_count()?,
            organisms: self.organisms.map(JsonTerms::into_labels).unwrap_or_default(),
            tissues: self.tissue.map(JsonTerms::into_labels).unwrap_or_default(),
            assays: self.assay.map(JsonTerms::into_labels).unwrap_or_default(),
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum JsonCount {
    Integer(u64),
    Float(f64),
    Text(String),
}

impl JsonCount {
    fn into_count(self) -> Result<u64, String> {
        match self {
            JsonCount::Integer(count) => Ok(count),
            JsonCount::Float(count) => parse_cell_count(&count.to_string()),
            JsonCount::Text(text) => parse_cell_count(&text),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum JsonTerms {
    List(Vec<JsonTerm>),
    Bracketed(String),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum JsonTerm {
    Label(String),
    Object { label: String },
}

impl JsonTerms {
    fn into_labels(self) -> Vec<String> {
        match self {
            JsonTerms::List(terms) => terms
                .into_iter()
                .map(|term| match term {
                    JsonTerm::Label(label) | JsonTerm::Object { label } => label,
                })
                .collect(),
            JsonTerms::Bracketed(text) => parse_bracket_list(&text),
        }
    }
}
