use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;

use reqwest::blocking::{Client, Response};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use tracing::debug;

use crate::domain::S3Uri;
use crate::error::AtlasError;

pub const DEFAULT_ENDPOINT: &str = "https://s3.amazonaws.com";

/// Retrieves remote objects into local files.
pub trait ObjectStore: Send + Sync {
    /// Downloads `locator` to `destination`, replacing any file already there.
    /// Returns the number of bytes written.
    fn download(&self, locator: &S3Uri, destination: &Path) -> Result<u64, AtlasError>;
}

#[derive(Debug, Clone)]
pub struct S3ClientOptions {
    pub endpoint: String,
    pub connect_timeout: Duration,
    pub request_timeout: Option<Duration>,
}

impl Default for S3ClientOptions {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            connect_timeout: Duration::from_secs(30),
            request_timeout: None,
        }
    }
}

/// Anonymous, path-style reads from public buckets.
#[derive(Clone)]
pub struct S3HttpClient {
    client: Client,
    endpoint: String,
}

impl S3HttpClient {
    pub fn new(options: S3ClientOptions) -> Result<Self, AtlasError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("kira-obs/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| AtlasError::S3Http(err.to_string()))?,
        );

        let mut builder = Client::builder()
            .default_headers(headers)
            .connect_timeout(options.connect_timeout);
        if let Some(timeout) = options.request_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|err| AtlasError::S3Http(err.to_string()))?;

        Ok(Self {
            client,
            endpoint: options.endpoint.trim_end_matches('/').to_string(),
        })
    }

    pub fn object_url(&self, locator: &S3Uri) -> String {
        match locator.scheme() {
            "http" | "https" => locator.to_string(),
            _ => format!("{}/{}/{}", self.endpoint, locator.bucket(), locator.key()),
        }
    }

    fn write_response_to_file(
        &self,
        mut response: Response,
        locator: &S3Uri,
        destination: &Path,
    ) -> Result<u64, AtlasError> {
        if !response.status().is_success() {
            return Err(AtlasError::S3Status {
                status: response.status().as_u16(),
                locator: locator.to_string(),
            });
        }

        let parent = destination
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        fs::create_dir_all(parent).map_err(|err| AtlasError::Filesystem(err.to_string()))?;
        let mut temp = tempfile::Builder::new()
            .prefix("kira-obs-fetch")
            .tempfile_in(parent)
            .map_err(|err| AtlasError::Filesystem(err.to_string()))?;
        let written = io::copy(&mut response, temp.as_file_mut())
            .map_err(|err| AtlasError::S3Http(err.to_string()))?;
        temp.persist(destination)
            .map_err(|err| AtlasError::Filesystem(err.to_string()))?;
        Ok(written)
    }
}

impl ObjectStore for S3HttpClient {
    fn download(&self, locator: &S3Uri, destination: &Path) -> Result<u64, AtlasError> {
        if !matches!(locator.scheme(), "s3" | "http" | "https") {
            return Err(AtlasError::InvalidLocator(locator.to_string()));
        }
        let url = self.object_url(locator);
        debug!(%url, "requesting object");
        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|err| AtlasError::S3Http(err.to_string()))?;
        self.write_response_to_file(response, locator, destination)
    }
}
