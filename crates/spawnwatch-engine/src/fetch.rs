use std::io::Read;
use std::time::Duration;

use anyhow::Context;
use reqwest::blocking::Client as HttpClient;

use crate::error::WatchError;

/// Largest spawn image accepted from a download.
pub const MAX_IMAGE_BYTES: u64 = 8 * 1024 * 1024;

/// Resolves an image location (URL or path) to raw bytes.
pub trait ImageSource: Send + Sync {
    fn fetch(&self, location: &str) -> Result<Vec<u8>, WatchError>;
}

/// Downloads `http(s)://` locations; other locations are read from disk
/// only when enabled with [`with_local_files`](Self::with_local_files).
///
/// There is no retry; a failed fetch is reported once.
#[derive(Debug, Clone)]
pub struct ImageFetcher {
    http: HttpClient,
    local_files: bool,
}

impl ImageFetcher {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let http = HttpClient::builder()
            .timeout(timeout)
            .build()
            .context("failed to build image download client")?;
        Ok(Self {
            http,
            local_files: false,
        })
    }

    pub fn with_local_files(mut self) -> Self {
        self.local_files = true;
        self
    }

    fn download(&self, url: &str) -> Result<Vec<u8>, WatchError> {
        let response = self.http.get(url).send().map_err(|err| {
            WatchError::ImageUnavailable(format!("failed downloading spawn image ({url}): {err}"))
        })?;
        if !response.status().is_success() {
            let code = response.status().as_u16();
            return Err(WatchError::ImageUnavailable(format!(
                "spawn image download failed ({code}): {url}"
            )));
        }
        if response
            .content_length()
            .is_some_and(|len| len > MAX_IMAGE_BYTES)
        {
            return Err(too_large(url));
        }
        read_capped(response, MAX_IMAGE_BYTES, url)
    }
}

impl ImageSource for ImageFetcher {
    fn fetch(&self, location: &str) -> Result<Vec<u8>, WatchError> {
        if is_http_location(location) {
            return self.download(location);
        }
        if !self.local_files {
            return Err(WatchError::ImageUnavailable(format!(
                "refusing non-http spawn image location: {location}"
            )));
        }
        std::fs::read(location).map_err(|err| {
            WatchError::ImageUnavailable(format!("failed reading spawn image {location}: {err}"))
        })
    }
}

fn read_capped(reader: impl Read, limit: u64, url: &str) -> Result<Vec<u8>, WatchError> {
    let mut bytes = Vec::new();
    reader
        .take(limit + 1)
        .read_to_end(&mut bytes)
        .map_err(|err| {
            WatchError::ImageUnavailable(format!("failed reading spawn image bytes ({url}): {err}"))
        })?;
    if bytes.len() as u64 > limit {
        return Err(too_large(url));
    }
    Ok(bytes)
}

fn too_large(url: &str) -> WatchError {
    WatchError::ImageUnavailable(format!(
        "spawn image exceeds {MAX_IMAGE_BYTES} bytes: {url}"
    ))
}

fn is_http_location(location: &str) -> bool {
    let lowered = location.trim_start().to_ascii_lowercase();
    lowered.starts_with("http://") || lowered.starts_with("https://")
}
