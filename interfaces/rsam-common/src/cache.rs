use hf_hub::{Repo, RepoType};
use httpdate::parse_http_date;
use reqwest::{
    header::{HeaderValue, CONTENT_LENGTH, LAST_MODIFIED, RANGE},
    IntoUrl,
};
use reqwest::{Response, StatusCode};
use std::path::PathBuf;
use std::str::FromStr;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;

use crate::{FileLoadingProgress, FileSource};

/// An error that can occur while resolving a [`FileSource`] through the [`Cache`]
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// The Hugging Face API returned an error while building the download URL
    #[error("Hugging Face API error: {0}")]
    HuggingFaceApi(#[from] hf_hub::api::sync::ApiError),
    /// The metadata of a cached file could not be read
    #[error("Unable to get file metadata for {0}: {1}")]
    UnableToGetFileMetadata(PathBuf, #[source] std::io::Error),
    /// An IO error occurred while writing the download to disk
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// An HTTP error occurred while downloading
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    /// The server responded with a status code other than 200 or 206
    #[error("Unexpected status code: {0}")]
    UnexpectedStatusCode(StatusCode),
}

/// A cache that resolves [`FileSource`]s to local paths, downloading remote
/// files at most once.
#[derive(Debug, Clone)]
pub struct Cache {
    location: PathBuf,
    /// The huggingface token to use (defaults to the token set with `huggingface-cli login`)
    huggingface_token: Option<String>,
}

impl Cache {
    /// Create a new cache with a specific location
    pub fn new(location: PathBuf) -> Self {
        Self {
            location,
            huggingface_token: None,
        }
    }

    /// Set the Hugging Face token to use for downloading (defaults to the token set with `huggingface-cli login`, and then the environment variable `HF_TOKEN`)
    pub fn with_huggingface_token(mut self, token: Option<String>) -> Self {
        self.huggingface_token = token;
        self
    }

    /// Check if the file exists locally (if it is a local file or if it has been downloaded)
    pub fn exists(&self, source: &FileSource) -> bool {
        match source {
            FileSource::HuggingFace {
                model_id,
                revision,
                file,
            } => {
                let path = self.location.join(model_id).join(revision);
                let complete_download = path.join(file);
                complete_download.exists()
            }
            FileSource::Local(path) => path.exists(),
        }
    }

    /// Get the file from the cache, downloading it if necessary
    pub async fn get(
        &self,
        source: &FileSource,
        progress: impl FnMut(FileLoadingProgress),
    ) -> Result<PathBuf, CacheError> {
        match source {
            FileSource::HuggingFace {
                model_id,
                revision,
                file,
            } => {
                let token = self.huggingface_token.clone().or_else(huggingface_token);

                let path = self.location.join(model_id).join(revision);
                let complete_download = path.join(file);

                let repo = Repo::with_revision(
                    model_id.to_string(),
                    RepoType::Model,
                    revision.to_string(),
                );
                let api = hf_hub::api::sync::Api::new()?.repo(repo);
                let url = api.url(file);
                let client = reqwest::Client::new();
                tracing::trace!("Fetching metadata for {file} from {url}");
                let response = client
                    .head(&url)
                    .with_authorization_header(token.clone())
                    .send()
                    .await;

                if complete_download.exists() {
                    let metadata = tokio::fs::metadata(&complete_download).await.map_err(|e| {
                        CacheError::UnableToGetFileMetadata(complete_download.clone(), e)
                    })?;
                    let file_last_modified = metadata.modified()?;
                    // If the server says the file hasn't been modified since we downloaded it, we can use the local file
                    if let Some(last_updated) = response
                        .as_ref()
                        .ok()
                        .and_then(|response| response.headers().get(LAST_MODIFIED))
                        .and_then(|last_updated| last_updated.to_str().ok())
                        .and_then(|s| parse_http_date(s).ok())
                    {
                        if last_updated <= file_last_modified {
                            return Ok(complete_download);
                        }
                    } else {
                        // Or if we are offline, we can use the local file
                        return Ok(complete_download);
                    }
                }
                let incomplete_download = path.join(format!("{file}.partial"));

                tracing::trace!("Downloading into {:?}", incomplete_download);

                download_into(
                    url,
                    &incomplete_download,
                    response?,
                    client,
                    token,
                    progress,
                )
                .await?;

                // Rename the file to remove the .partial extension
                tokio::fs::rename(&incomplete_download, &complete_download).await?;

                Ok(complete_download)
            }
            FileSource::Local(path) => Ok(path.clone()),
        }
    }
}

impl Default for Cache {
    fn default() -> Self {
        Self {
            location: dirs::data_dir().unwrap().join("rsam").join("cache"),
            huggingface_token: None,
        }
    }
}

async fn download_into<U: IntoUrl>(
    url: U,
    file: &PathBuf,
    head: Response,
    client: reqwest::Client,
    token: Option<String>,
    mut progress: impl FnMut(FileLoadingProgress),
) -> Result<(), CacheError> {
    let length = head
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|length| length.to_str().ok())
        .and_then(|s| u64::from_str(s).ok());

    // Only resume a partial download when the server reports a length to resume against
    let (start, mut output_file) = match tokio::fs::metadata(file).await {
        Ok(metadata) if length.is_some() => {
            let start = metadata.len();
            let output_file = OpenOptions::new().append(true).open(file).await?;
            (start, output_file)
        }
        _ => {
            if let Some(parent) = file.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            (0, File::create(file).await?)
        }
    };

    if let Some(length) = length {
        progress(FileLoadingProgress {
            progress: start,
            cached_size: start,
            size: length,
            start_time: std::time::Instant::now(),
        });

        if start == length {
            tracing::trace!("File {} already downloaded", file.display());
            return Ok(());
        }
    }

    let range = length
        .and_then(|length| HeaderValue::from_str(&format!("bytes={}-{}", start, length - 1)).ok());

    tracing::trace!("Fetching range {:?}", range);
    let mut request = client.get(url).with_authorization_header(token);
    if let Some(range) = range {
        request = request.header(RANGE, range);
    }
    let mut response = request.send().await?;

    let status = response.status();
    if !(status == StatusCode::OK || status == StatusCode::PARTIAL_CONTENT) {
        return Err(CacheError::UnexpectedStatusCode(status));
    }

    let mut current_progress = start;

    while let Some(chunk) = response.chunk().await? {
        output_file.write_all(&chunk).await?;
        tracing::trace!("wrote chunk of size {}", chunk.len());
        current_progress += chunk.len() as u64;
        if let Some(length) = length {
            progress(FileLoadingProgress {
                progress: current_progress,
                cached_size: start,
                size: length,
                start_time: std::time::Instant::now(),
            });
        }
    }

    tracing::trace!("Download of {} complete", file.display());

    Ok(())
}

trait RequestBuilderExt {
    fn with_authorization_header(self, token: Option<String>) -> Self;
}

impl RequestBuilderExt for reqwest::RequestBuilder {
    fn with_authorization_header(self, token: Option<String>) -> Self {
        if let Some(token) = token {
            self.header(reqwest::header::AUTHORIZATION, format!("Bearer {token}"))
        } else {
            self
        }
    }
}

fn huggingface_token() -> Option<String> {
    let cache = hf_hub::Cache::default();
    cache.token().or_else(|| std::env::var("HF_TOKEN").ok())
}

#[cfg(test)]
#[tokio::test]
async fn local_sources_resolve_without_downloading() {
    let dir = std::env::temp_dir().join("rsam-common-cache-test");
    tokio::fs::create_dir_all(&dir).await.unwrap();
    let file = dir.join("weights.safetensors");
    tokio::fs::write(&file, b"checkpoint").await.unwrap();

    let source = FileSource::local(file.clone());
    let cache = Cache::new(std::env::temp_dir().join("rsam-common-cache-test-store"));
    assert!(cache.exists(&source));

    let resolved = cache.get(&source, |_| {}).await.unwrap();
    assert_eq!(resolved, file);

    tokio::fs::remove_file(file).await.unwrap();
}

#[cfg(test)]
#[tokio::test]
async fn missing_hub_files_are_not_reported_as_cached() {
    let cache = Cache::new(std::env::temp_dir().join("rsam-common-cache-test-empty"));
    let source = FileSource::huggingface("lmz/candle-sam", "main", "does-not-exist.safetensors");
    assert!(!cache.exists(&source));
}
