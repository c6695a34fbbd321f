use std::path::Path;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{info, warn};

use crate::catalog::{Catalog, DatasetRecord, SkippedRow};
use crate::domain::{CatalogFormat, DatasetKey};
use crate::error::AtlasError;
use crate::reader::ObsReader;
use crate::s3::ObjectStore;
use crate::store::Store;
use crate::transform::ObsTransform;

#[derive(Debug, Clone, Default)]
pub struct ApplyOptions {
    /// Stop after this many catalog records have been attempted.
    pub max_datasets: Option<usize>,
}

/// Where processing of a dataset stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Fetch,
    Open,
    Transform,
}

#[derive(Debug, Clone, Serialize)]
pub struct SkippedDataset {
    pub key: DatasetKey,
    pub stage: Stage,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResultEntry<T> {
    pub key: DatasetKey,
    pub record: DatasetRecord,
    pub value: T,
}

/// Outcome of one pipeline pass, in catalog order.
#[derive(Debug, Clone, Serialize)]
pub struct ApplyReport<T> {
    pub transform: String,
    pub attempted: usize,
    pub entries: Vec<ResultEntry<T>>,
    pub skipped: Vec<SkippedDataset>,
    pub catalog_skipped: Vec<SkippedRow>,
}

impl<T> ApplyReport<T> {
    pub fn get(&self, key: &DatasetKey) -> Option<&T> {
        self.entries
            .iter()
            .find(|entry| &entry.key == key)
            .map(|entry| &entry.value)
    }

    pub fn keys(&self) -> impl Iterator<Item = &DatasetKey> {
        self.entries.iter().map(|entry| &entry.key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

/// Download-apply-collect loop over a catalog.
///
/// Every dataset is staged through the store's single scratch path, so one
/// `App` must not run two passes at the same time.
#[derive(Clone)]
pub struct App<S: ObjectStore, R: ObsReader> {
    store: Store,
    objects: S,
    reader: R,
}

impl<S: ObjectStore, R: ObsReader> App<S, R> {
    pub fn new(store: Store, objects: S, reader: R) -> Self {
        Self {
            store,
            objects,
            reader,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn apply_path<T: ObsTransform>(
        &self,
        catalog_path: &Path,
        format: Option<CatalogFormat>,
        transform: &T,
        options: &ApplyOptions,
        sink: &dyn ProgressSink,
    ) -> Result<ApplyReport<T::Output>, AtlasError> {
        sink.event(ProgressEvent {
            message: format!("phase=Resolve; reading catalog {}", catalog_path.display()),
            elapsed: None,
        });
        let catalog = Catalog::load(catalog_path, format)?;
        self.apply(&catalog, transform, options, sink)
    }

    /// Runs `transform` over every dataset of `catalog`. Datasets that cannot
    /// be fetched, opened or transformed are reported in `skipped` and the pass
    /// moves on.
    pub fn apply<T: ObsTransform>(
        &self,
        catalog: &Catalog,
        transform: &T,
        options: &ApplyOptions,
        sink: &dyn ProgressSink,
    ) -> Result<ApplyReport<T::Output>, AtlasError> {
        self.store.ensure_scratch_dir()?;
        let total = options
            .max_datasets
            .map_or(catalog.len(), |max| max.min(catalog.len()));

        let mut report = ApplyReport {
            transform: transform.name().to_string(),
            attempted: 0,
            entries: Vec::new(),
            skipped: Vec::new(),
            catalog_skipped: catalog.skipped().to_vec(),
        };

        for (position, record) in catalog.records().iter().take(total).enumerate() {
            let key = DatasetKey::from(record.locator.clone());
            sink.event(ProgressEvent {
                message: format!("Working on data {} of {total}", position + 1),
                elapsed: None,
            });
            info!(dataset = %key, "working on data {} of {total}", position + 1);
            report.attempted += 1;

            let start = Instant::now();
            let outcome = self.process(record, transform);
            self.store.remove_scratch()?;

            match outcome {
                Ok(value) => {
                    sink.event(ProgressEvent {
                        message: format!("phase=Apply; {} done", record.locator.file_name()),
                        elapsed: Some(start.elapsed()),
                    });
                    report.entries.push(ResultEntry {
                        key,
                        record: record.clone(),
                        value,
                    });
                }
                Err((stage, err)) => {
                    warn!(dataset = %key, ?stage, error = %err, "skipping dataset");
                    sink.event(ProgressEvent {
                        message: format!("phase=Apply; skipped {} ({stage:?})", key),
                        elapsed: Some(start.elapsed()),
                    });
                    report.skipped.push(SkippedDataset {
                        key,
                        stage,
                        reason: err.to_string(),
                    });
                }
            }
        }

        info!(
            processed = report.entries.len(),
            skipped = report.skipped.len(),
            transform = %report.transform,
            "pass finished"
        );
        Ok(report)
    }

    fn process<T: ObsTransform>(
        &self,
        record: &DatasetRecord,
        transform: &T,
    ) -> Result<T::Output, (Stage, AtlasError)> {
        let scratch = self.store.scratch_path().as_std_path();

        let bytes = self
            .objects
            .download(&record.locator, scratch)
            .map_err(|err| (Stage::Fetch, err))?;
        info!(dataset = %record.locator, bytes, "applying {}", transform.name());

        let table = self
            .reader
            .read_obs(scratch)
            .map_err(|err| (Stage::Open, err))?;
        transform.apply(&table).map_err(|err| {
            (
                Stage::Transform,
                AtlasError::Transform {
                    name: transform.name().to_string(),
                    message: err.to_string(),
                },
            )
        })
    }
}
