use std::fs;
use std::path::PathBuf;

use camino::Utf8PathBuf;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::CatalogFormat;
use crate::error::AtlasError;
use crate::s3::DEFAULT_ENDPOINT;
use crate::store::{DEFAULT_RESULTS_DIR, Store};
use crate::transform::{DEFAULT_MAX_CATEGORIES, STANDARD_COLUMNS};

pub const CONFIG_FILE_NAME: &str = "kira-obs.json";
pub const DEFAULT_CATALOG: &str = "data_tables/cellxgene_all_data_latest.tsv";
pub const ENDPOINT_ENV: &str = "KIRA_OBS_S3_ENDPOINT";

const STANDARD_PRESET: &str = "standard";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub catalog: Option<CatalogEntry>,
    #[serde(default)]
    pub results_dir: Option<String>,
    #[serde(default)]
    pub scratch: Option<String>,
    #[serde(default)]
    pub s3: Option<S3Entry>,
    #[serde(default)]
    pub max_datasets: Option<usize>,
    #[serde(default)]
    pub max_categories: Option<usize>,
    #[serde(default)]
    pub allow_list: Option<AllowListEntry>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub enum CatalogEntry {
    Shorthand(String),
    Detailed(CatalogEntryObject),
}

#[derive(Debug, Deserialize, Serialize)]
pub struct CatalogEntryObject {
    pub path: String,
    #[serde(default)]
    pub format: Option<CatalogFormat>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct S3Entry {
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

/// Either a named preset (`"standard"`) or explicit column names.
#[derive(Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub enum AllowListEntry {
    Preset(String),
    Columns(Vec<String>),
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub catalog: Utf8PathBuf,
    pub catalog_format: Option<CatalogFormat>,
    pub results_dir: Utf8PathBuf,
    pub scratch_path: Utf8PathBuf,
    pub s3_endpoint: String,
    pub request_timeout_secs: Option<u64>,
    pub max_datasets: Option<usize>,
    pub max_categories: usize,
    pub allow_list: Vec<String>,
}

impl ResolvedConfig {
    pub fn store(&self) -> Store {
        Store::new_with_paths(self.scratch_path.clone(), self.results_dir.clone())
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads `path`, or `kira-obs.json` in the working directory when present.
    /// Without either, every setting takes its default.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, AtlasError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(CONFIG_FILE_NAME),
        };

        let config = if path.is_none() && !config_path.exists() {
            Config::default()
        } else {
            let content = fs::read_to_string(&config_path)
                .map_err(|_| AtlasError::ConfigRead(config_path.clone()))?;
            serde_json::from_str(&content)
                .map_err(|err| AtlasError::ConfigParse(err.to_string()))?
        };

        let mut resolved = Self::resolve_config(config)?;
        if let Ok(endpoint) = std::env::var(ENDPOINT_ENV) {
            resolved.s3_endpoint = validate_endpoint(&endpoint)?;
        }
        Ok(resolved)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, AtlasError> {
        let schema_version = config.schema_version.unwrap_or(1);

        let (catalog, catalog_format) = match config.catalog {
            None => (Utf8PathBuf::from(DEFAULT_CATALOG), None),
            Some(CatalogEntry::Shorthand(path)) => (Utf8PathBuf::from(path), None),
            Some(CatalogEntry::Detailed(obj)) => (Utf8PathBuf::from(obj.path), obj.format),
        };

        let scratch_path = match config.scratch {
            Some(path) => Utf8PathBuf::from(path),
            None => Store::default_scratch_path()?,
        };

        let s3 = config.s3.unwrap_or_default();
        let s3_endpoint = match s3.endpoint {
            Some(endpoint) => validate_endpoint(&endpoint)?,
            None => DEFAULT_ENDPOINT.to_string(),
        };

        let allow_list = match config.allow_list {
            None => default_allow_list(),
            Some(AllowListEntry::Preset(name)) if name == STANDARD_PRESET => default_allow_list(),
            Some(AllowListEntry::Preset(name)) => {
                return Err(AtlasError::ConfigParse(format!(
                    "unknown allow-list preset `{name}`"
                )));
            }
            Some(AllowListEntry::Columns(columns)) => columns,
        };

        Ok(ResolvedConfig {
            schema_version,
            catalog,
            catalog_format,
            results_dir: Utf8PathBuf::from(
                config
                    .results_dir
                    .unwrap_or_else(|| DEFAULT_RESULTS_DIR.to_string()),
            ),
            scratch_path,
            s3_endpoint,
            request_timeout_secs: s3.request_timeout_secs,
            max_datasets: config.max_datasets,
            max_categories: config.max_categories.unwrap_or(DEFAULT_MAX_CATEGORIES),
            allow_list,
        })
    }
}

pub fn default_allow_list() -> Vec<String> {
    STANDARD_COLUMNS.iter().map(ToString::to_string).collect()
}

fn validate_endpoint(endpoint: &str) -> Result<String, AtlasError> {
    let endpoint = endpoint.trim();
    let origin = Regex::new(r"^https?://[A-Za-z0-9.\-]+(:[0-9]{1,5})?/?$").unwrap();
    if !origin.is_match(endpoint) {
        return Err(AtlasError::ConfigParse(format!(
            "S3 endpoint must be an http(s) origin, got `{endpoint}`"
        )));
    }
    Ok(endpoint.trim_end_matches('/').to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_to_empty_config() {
        let config = Config {
            scratch: Some("/tmp/kira-obs/scratch.h5ad".to_string()),
            ..Config::default()
        };

        let resolved = ConfigLoader::resolve_config(config).unwrap();
        assert_eq!(resolved.schema_version, 1);
        assert_eq!(resolved.catalog, DEFAULT_CATALOG);
        assert_eq!(resolved.catalog_format, None);
        assert_eq!(resolved.results_dir, DEFAULT_RESULTS_DIR);
        assert_eq!(resolved.s3_endpoint, DEFAULT_ENDPOINT);
        assert_eq!(resolved.max_categories, DEFAULT_MAX_CATEGORIES);
        assert_eq!(resolved.allow_list, default_allow_list());
    }

    #[test]
    fn endpoint_must_be_an_origin() {
        assert_eq!(
            validate_endpoint("http://localhost:9000/").unwrap(),
            "http://localhost:9000"
        );
        assert!(validate_endpoint("ftp://example.org").is_err());
        assert!(validate_endpoint("https://example.org/bucket").is_err());
    }
}
