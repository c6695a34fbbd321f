use serde::Serialize;

use crate::error::AtlasError;

/// String-rendered table produced by the row transforms and the aggregators.
///
/// Each row carries a label: the obs name of the first input row it stands for.
/// A `None` cell is a missing value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ObsFrame {
    columns: Vec<String>,
    labels: Vec<String>,
    rows: Vec<Vec<Option<String>>>,
}

impl ObsFrame {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            labels: Vec::new(),
            rows: Vec::new(),
        }
    }

    pub fn push_row(&mut self, label: String, row: Vec<Option<String>>) -> Result<(), AtlasError> {
        if row.len() != self.columns.len() {
            return Err(AtlasError::MalformedTable(format!(
                "row `{label}` has {} values for {} columns",
                row.len(),
                self.columns.len()
            )));
        }
        self.labels.push(label);
        self.rows.push(row);
        Ok(())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn rows(&self) -> &[Vec<Option<String>>] {
        &self.rows
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column == name)
    }

    pub fn value(&self, row: usize, column: &str) -> Option<&str> {
        let position = self.column_position(column)?;
        self.rows.get(row)?.get(position)?.as_deref()
    }

    /// Appends a column holding one value per row.
    pub fn push_column(
        &mut self,
        name: impl Into<String>,
        values: Vec<Option<String>>,
    ) -> Result<(), AtlasError> {
        let name = name.into();
        if values.len() != self.rows.len() {
            return Err(AtlasError::MalformedTable(format!(
                "column `{name}` has {} values for {} rows",
                values.len(),
                self.rows.len()
            )));
        }
        if self.column_position(&name).is_some() {
            return Err(AtlasError::MalformedTable(format!("duplicate column `{name}`")));
        }
        self.columns.push(name);
        for (row, value) in self.rows.iter_mut().zip(values) {
            row.push(value);
        }
        Ok(())
    }
}

/// Distinct value combinations with the number of input rows sharing each.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TallyTable {
    frame: ObsFrame,
    counts: Vec<u64>,
}

impl TallyTable {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            frame: ObsFrame::new(columns),
            counts: Vec::new(),
        }
    }

    pub fn push_group(
        &mut self,
        label: String,
        row: Vec<Option<String>>,
        count: u64,
    ) -> Result<(), AtlasError> {
        self.frame.push_row(label, row)?;
        self.counts.push(count);
        Ok(())
    }

    pub fn frame(&self) -> &ObsFrame {
        &self.frame
    }

    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// Flattens the tally into a frame with a trailing count column.
    pub fn into_frame(self, count_column: &str) -> Result<ObsFrame, AtlasError> {
        let mut frame = self.frame;
        let counts = self
            .counts
            .into_iter()
            .map(|count| Some(count.to_string()))
            .collect();
        frame.push_column(count_column, counts)?;
        Ok(frame)
    }
}
