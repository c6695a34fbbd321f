use std::path::Path;

use crate::error::AtlasError;
use crate::obs::AnnotationTable;

/// Opens a fetched dataset file read-only and loads its annotation table.
pub trait ObsReader: Send + Sync {
    fn read_obs(&self, path: &Path) -> Result<AnnotationTable, AtlasError>;
}

/// Reads the `obs` group of an AnnData HDF5 file.
#[derive(Debug, Clone, Copy, Default)]
pub struct H5adObsReader;

#[cfg(feature = "h5ad")]
impl ObsReader for H5adObsReader {
    fn read_obs(&self, path: &Path) -> Result<AnnotationTable, AtlasError> {
        let (index, columns) = h5ad::read_obs(path).map_err(|err| AtlasError::Open {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;
        AnnotationTable::new(index, columns)
    }
}

#[cfg(not(feature = "h5ad"))]
impl ObsReader for H5adObsReader {
    fn read_obs(&self, path: &Path) -> Result<AnnotationTable, AtlasError> {
        Err(AtlasError::UnsupportedFormat(path.display().to_string()))
    }
}

#[cfg(feature = "h5ad")]
mod h5ad {
    use std::path::Path;

    use hdf5::types::{FixedAscii, FixedUnicode, TypeDescriptor, VarLenAscii, VarLenUnicode};
    use hdf5::{Dataset, Group};
    use tracing::debug;

    use crate::obs::{Column, ColumnData};

    const LEGACY_CATEGORIES: &str = "__categories";

    pub fn read_obs(path: &Path) -> hdf5::Result<(Vec<String>, Vec<Column>)> {
        let file = hdf5::File::open(path)?;
        let obs = file.group("obs")?;

        let index_name = obs
            .attr("_index")
            .and_then(|attr| attr.read_scalar::<VarLenUnicode>())
            .map(|name| name.as_str().to_string())
            .unwrap_or_else(|_| "_index".to_string());
        let index = read_strings(&obs.dataset(&index_name)?)?;

        let order = match obs
            .attr("column-order")
            .and_then(|attr| attr.read_1d::<VarLenUnicode>())
        {
            Ok(names) => names.iter().map(|name| name.as_str().to_string()).collect(),
            Err(_) => obs
                .member_names()?
                .into_iter()
                .filter(|name| name != &index_name && name != LEGACY_CATEGORIES)
                .collect::<Vec<_>>(),
        };
        debug!(rows = index.len(), columns = order.len(), "reading obs");

        let legacy = obs.group(LEGACY_CATEGORIES).ok();
        let mut columns = Vec::with_capacity(order.len());
        for name in order {
            let data = match obs.group(&name) {
                Ok(group) => read_encoded_group(&group)?,
                Err(_) => {
                    let dataset = obs.dataset(&name)?;
                    match legacy.as_ref().and_then(|legacy| legacy.dataset(&name).ok()) {
                        Some(categories) => categorical(&categories, &dataset)?,
                        None => read_plain(&dataset)?,
                    }
                }
            };
            columns.push(Column::new(name, data));
        }
        Ok((index, columns))
    }

    fn encoding_type(group: &Group) -> String {
        group
            .attr("encoding-type")
            .and_then(|attr| attr.read_scalar::<VarLenUnicode>())
            .map(|value| value.as_str().to_string())
            .unwrap_or_default()
    }

    fn read_encoded_group(group: &Group) -> hdf5::Result<ColumnData> {
        let encoding = encoding_type(group);
        match encoding.as_str() {
            "categorical" => categorical(&group.dataset("categories")?, &group.dataset("codes")?),
            "nullable-integer" => {
                let values = group.dataset("values")?.read_1d::<i64>()?;
                let mask = group.dataset("mask")?.read_1d::<bool>()?;
                Ok(ColumnData::Integer(
                    values
                        .iter()
                        .zip(mask.iter())
                        .map(|(&value, &missing)| (!missing).then_some(value))
                        .collect(),
                ))
            }
            "nullable-boolean" => {
                let values = group.dataset("values")?.read_1d::<bool>()?;
                let mask = group.dataset("mask")?.read_1d::<bool>()?;
                Ok(ColumnData::Boolean(
                    values
                        .iter()
                        .zip(mask.iter())
                        .map(|(&value, &missing)| (!missing).then_some(value))
                        .collect(),
                ))
            }
            other => Err(hdf5::Error::from(format!(
                "unsupported obs column encoding `{other}` in {}",
                group.name()
            ))),
        }
    }

    fn categorical(categories: &Dataset, codes: &Dataset) -> hdf5::Result<ColumnData> {
        let categories = read_labels(categories)?;
        let codes = codes
            .read_1d::<i64>()?
            .iter()
            .map(|&code| u32::try_from(code).ok())
            .collect();
        Ok(ColumnData::Categorical { categories, codes })
    }

    fn read_plain(dataset: &Dataset) -> hdf5::Result<ColumnData> {
        let descriptor = dataset.dtype()?.to_descriptor()?;
        let data = match descriptor {
            TypeDescriptor::Integer(_) | TypeDescriptor::Unsigned(_) => {
                ColumnData::Integer(dataset.read_1d::<i64>()?.iter().map(|&v| Some(v)).collect())
            }
            TypeDescriptor::Float(_) => ColumnData::Float(dataset.read_1d::<f64>()?.to_vec()),
            TypeDescriptor::Boolean => {
                ColumnData::Boolean(dataset.read_1d::<bool>()?.iter().map(|&v| Some(v)).collect())
            }
            _ => ColumnData::Text(read_strings(dataset)?.into_iter().map(Some).collect()),
        };
        Ok(data)
    }

    /// Category labels may be stored as strings or as numbers.
    fn read_labels(dataset: &Dataset) -> hdf5::Result<Vec<String>> {
        let descriptor = dataset.dtype()?.to_descriptor()?;
        match descriptor {
            TypeDescriptor::Integer(_) | TypeDescriptor::Unsigned(_) => Ok(dataset
                .read_1d::<i64>()?
                .iter()
                .map(ToString::to_string)
                .collect()),
            TypeDescriptor::Float(_) => Ok(dataset
                .read_1d::<f64>()?
                .iter()
                .map(ToString::to_string)
                .collect()),
            TypeDescriptor::Boolean => Ok(dataset
                .read_1d::<bool>()?
                .iter()
                .map(|&value| if value { "True" } else { "False" }.to_string())
                .collect()),
            _ => read_strings(dataset),
        }
    }

    fn read_strings(dataset: &Dataset) -> hdf5::Result<Vec<String>> {
        let descriptor = dataset.dtype()?.to_descriptor()?;
        let strings = match descriptor {
            TypeDescriptor::VarLenUnicode => to_strings(dataset.read_1d::<VarLenUnicode>()?.iter()),
            TypeDescriptor::VarLenAscii => to_strings(dataset.read_1d::<VarLenAscii>()?.iter()),
            TypeDescriptor::FixedAscii(n) if n <= 64 => {
                to_strings(dataset.read_1d::<FixedAscii<64>>()?.iter())
            }
            TypeDescriptor::FixedAscii(_) => {
                to_strings(dataset.read_1d::<FixedAscii<1024>>()?.iter())
            }
            TypeDescriptor::FixedUnicode(n) if n <= 64 => {
                to_strings(dataset.read_1d::<FixedUnicode<64>>()?.iter())
            }
            TypeDescriptor::FixedUnicode(_) => {
                to_strings(dataset.read_1d::<FixedUnicode<1024>>()?.iter())
            }
            other => {
                return Err(hdf5::Error::from(format!(
                    "unsupported string type {other:?} in {}",
                    dataset.name()
                )));
            }
        };
        Ok(strings)
    }

    fn to_strings<'a, T>(values: impl Iterator<Item = &'a T>) -> Vec<String>
    where
        T: std::fmt::Display + 'a,
    {
        values.map(ToString::to_string).collect()
    }
}
