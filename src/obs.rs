//! In-memory model of a dataset's per-cell annotation table (`obs`).

use std::collections::HashSet;

use crate::error::AtlasError;

#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    /// Dictionary-encoded column; a `None` code is a missing value.
    Categorical {
        categories: Vec<String>,
        codes: Vec<Option<u32>>,
    },
    Integer(Vec<Option<i64>>),
    Float(Vec<f64>),
    Boolean(Vec<Option<bool>>),
    Text(Vec<Option<String>>),
}

impl ColumnData {
    pub fn len(&self) -> usize {
        match self {
            ColumnData::Categorical { codes, .. } => codes.len(),
            ColumnData::Integer(values) => values.len(),
            ColumnData::Float(values) => values.len(),
            ColumnData::Boolean(values) => values.len(),
            ColumnData::Text(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One cell value, hashable so rows can be grouped.
///
/// NaN floats are missing and `-0.0` equals `0.0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cell<'a> {
    Missing,
    Text(&'a str),
    Integer(i64),
    Float(u64),
    Boolean(bool),
}

impl Cell<'_> {
    pub fn from_f64(value: f64) -> Self {
        if value.is_nan() {
            Cell::Missing
        } else if value == 0.0 {
            Cell::Float(0f64.to_bits())
        } else {
            Cell::Float(value.to_bits())
        }
    }

    pub fn render(&self) -> Option<String> {
        match self {
            Cell::Missing => None,
            Cell::Text(value) => Some((*value).to_string()),
            Cell::Integer(value) => Some(value.to_string()),
            Cell::Float(bits) => Some(f64::from_bits(*bits).to_string()),
            Cell::Boolean(true) => Some("True".to_string()),
            Cell::Boolean(false) => Some("False".to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    name: String,
    data: ColumnData,
}

impl Column {
    pub fn new(name: impl Into<String>, data: ColumnData) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }

    pub fn categorical<S: AsRef<str>>(name: impl Into<String>, values: &[Option<S>]) -> Self {
        let mut categories: Vec<String> = Vec::new();
        let mut codes = Vec::with_capacity(values.len());
        for value in values {
            let code = value.as_ref().map(|value| {
                let value = value.as_ref();
                match categories.iter().position(|category| category == value) {
                    Some(position) => position as u32,
                    None => {
                        categories.push(value.to_string());
                        (categories.len() - 1) as u32
                    }
                }
            });
            codes.push(code);
        }
        Self::new(name, ColumnData::Categorical { categories, codes })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data(&self) -> &ColumnData {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn is_categorical(&self) -> bool {
        matches!(self.data, ColumnData::Categorical { .. })
    }

    /// Number of declared categories, including unused ones.
    pub fn n_categories(&self) -> Option<usize> {
        match &self.data {
            ColumnData::Categorical { categories, .. } => Some(categories.len()),
            _ => None,
        }
    }

    pub fn cell(&self, row: usize) -> Cell<'_> {
        match &self.data {
            ColumnData::Categorical { categories, codes } => codes[row]
                .and_then(|code| categories.get(code as usize))
                .map(|value| Cell::Text(value))
                .unwrap_or(Cell::Missing),
            ColumnData::Integer(values) => values[row].map(Cell::Integer).unwrap_or(Cell::Missing),
            ColumnData::Float(values) => Cell::from_f64(values[row]),
            ColumnData::Boolean(values) => values[row].map(Cell::Boolean).unwrap_or(Cell::Missing),
            ColumnData::Text(values) => values[row]
                .as_deref()
                .map(Cell::Text)
                .unwrap_or(Cell::Missing),
        }
    }
}

/// Per-cell annotation table: one row per observation, named columns.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationTable {
    index: Vec<String>,
    columns: Vec<Column>,
}

impl AnnotationTable {
    pub fn new(index: Vec<String>, columns: Vec<Column>) -> Result<Self, AtlasError> {
        let mut seen = HashSet::new();
        for column in &columns {
            if column.len() != index.len() {
                return Err(AtlasError::MalformedTable(format!(
                    "column `{}` has {} values for {} rows",
                    column.name(),
                    column.len(),
                    index.len()
                )));
            }
            if !seen.insert(column.name()) {
                return Err(AtlasError::MalformedTable(format!(
                    "duplicate column `{}`",
                    column.name()
                )));
            }
        }
        Ok(Self { index, columns })
    }

    pub fn n_rows(&self) -> usize {
        self.index.len()
    }

    pub fn index(&self) -> &[String] {
        &self.index
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|column| column.name() == name)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(Column::name).collect()
    }
}
