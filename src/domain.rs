use std::fmt;
use std::path::Path;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::AtlasError;

/// Marker a locator must contain to be treated as an AnnData dataset.
pub const H5AD_MARKER: &str = "h5ad";

pub const STAGING_BUCKET: &str = "corpora-data-dev";
pub const PRODUCTION_BUCKET: &str = "corpora-data-prod";

/// Remote object locator of the form `scheme://bucket/key/...`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct S3Uri {
    scheme: String,
    bucket: String,
    key: String,
}

impl S3Uri {
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn file_name(&self) -> &str {
        self.key.rsplit('/').next().unwrap_or(&self.key)
    }

    pub fn is_h5ad(&self) -> bool {
        self.to_string().contains(H5AD_MARKER)
    }

    /// Same object in the production bucket; other buckets are returned unchanged.
    pub fn to_production(&self) -> S3Uri {
        S3Uri {
            scheme: self.scheme.clone(),
            bucket: self.bucket.replace(STAGING_BUCKET, PRODUCTION_BUCKET),
            key: self.key.replace(STAGING_BUCKET, PRODUCTION_BUCKET),
        }
    }
}

impl fmt::Display for S3Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}/{}", self.scheme, self.bucket, self.key)
    }
}

impl FromStr for S3Uri {
    type Err = AtlasError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let (scheme, rest) = trimmed
            .split_once("://")
            .ok_or_else(|| AtlasError::InvalidLocator(value.to_string()))?;
        let (bucket, key) = rest
            .split_once('/')
            .ok_or_else(|| AtlasError::InvalidLocator(value.to_string()))?;
        let scheme_ok = !scheme.is_empty()
            && scheme
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '+' | '-' | '.'));
        if !scheme_ok || bucket.is_empty() || key.is_empty() {
            return Err(AtlasError::InvalidLocator(value.to_string()));
        }
        Ok(Self {
            scheme: scheme.to_string(),
            bucket: bucket.to_string(),
            key: key.to_string(),
        })
    }
}

impl TryFrom<String> for S3Uri {
    type Error = AtlasError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<S3Uri> for String {
    fn from(value: S3Uri) -> Self {
        value.to_string()
    }
}

/// Identifier every pipeline result is stored under.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct DatasetKey(S3Uri);

impl DatasetKey {
    pub fn locator(&self) -> &S3Uri {
        &self.0
    }
}

impl From<S3Uri> for DatasetKey {
    fn from(value: S3Uri) -> Self {
        Self(value)
    }
}

impl fmt::Display for DatasetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum CatalogFormat {
    Tsv,
    Json,
}

impl CatalogFormat {
    pub fn detect(path: &Path) -> CatalogFormat {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => CatalogFormat::Json,
            _ => CatalogFormat::Tsv,
        }
    }
}

impl fmt::Display for CatalogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CatalogFormat::Tsv => write!(f, "tsv"),
            CatalogFormat::Json => write!(f, "json"),
        }
    }
}
