use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum AtlasError {
    #[error("invalid storage locator: {0}")]
    InvalidLocator(String),

    #[error("failed to read catalog at {0}")]
    CatalogRead(PathBuf),

    #[error("failed to parse catalog: {0}")]
    CatalogParse(String),

    #[error("catalog is missing required column `{0}`")]
    #[diagnostic(help("the delimited catalog needs the columns produced by the portal export"))]
    CatalogColumn(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("S3 request failed: {0}")]
    S3Http(String),

    #[error("S3 returned status {status} for {locator}")]
    S3Status { status: u16, locator: String },

    #[error("failed to open annotation table {path}: {message}")]
    Open { path: PathBuf, message: String },

    #[error("unsupported annotation file: {0}")]
    #[diagnostic(help("rebuild with `--features h5ad` to read AnnData files"))]
    UnsupportedFormat(String),

    #[error("malformed annotation table: {0}")]
    MalformedTable(String),

    #[error("transform `{name}` failed: {message}")]
    Transform { name: String, message: String },

    #[error("failed to write output {path}: {message}")]
    OutputWrite { path: PathBuf, message: String },

    #[error("failed to read output {path}: {message}")]
    OutputRead { path: PathBuf, message: String },

    #[error("filesystem error: {0}")]
    Filesystem(String),
}
