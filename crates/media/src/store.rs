use std::path::Path;

use {
    futures::StreamExt,
    relay_common::types::MediaSource,
    tracing::debug,
};

use crate::{
    Error, Result,
    mime::{mime_from_extension, mime_from_path},
};

/// 5 MiB, WhatsApp's cap for most media sent through the sidecar.
pub const DEFAULT_MAX_BYTES: u64 = 5 * 1024 * 1024;

/// Raw media bytes plus their content type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaBlob {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

/// Loads media from URLs or local paths under a size cap.
#[derive(Debug, Clone)]
pub struct MediaStore {
    client: reqwest::Client,
    max_bytes: u64,
}

impl MediaStore {
    pub fn new(max_bytes: u64) -> Self {
        Self {
            client: reqwest::Client::new(),
            max_bytes,
        }
    }

    pub fn with_client(client: reqwest::Client, max_bytes: u64) -> Self {
        Self { client, max_bytes }
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    pub async fn load(&self, source: &MediaSource) -> Result<MediaBlob> {
        match source {
            MediaSource::Url(url) => self.fetch(url).await,
            MediaSource::Path(path) => self.read(Path::new(path)).await,
        }
    }

    async fn fetch(&self, url: &str) -> Result<MediaBlob> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::external(format!("fetching {url}"), e))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        if let Some(len) = resp.content_length() {
            self.check_size(len)?;
        }

        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
            .filter(|v| !v.is_empty())
            .or_else(|| guess_from_url(url).map(str::to_string))
            .unwrap_or_else(|| "application/octet-stream".into());

        let mut bytes = Vec::new();
        let mut stream = resp.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| Error::external(format!("reading {url}"), e))?;
            bytes.extend_from_slice(&chunk);
            self.check_size(bytes.len() as u64)?;
        }

        debug!(url, size = bytes.len(), content_type, "media fetched");
        Ok(MediaBlob {
            bytes,
            content_type,
        })
    }

    async fn read(&self, path: &Path) -> Result<MediaBlob> {
        let read_err = |source| Error::Read {
            path: path.display().to_string(),
            source,
        };
        let meta = tokio::fs::metadata(path).await.map_err(read_err)?;
        self.check_size(meta.len())?;

        let bytes = tokio::fs::read(path).await.map_err(read_err)?;
        // The file may have grown between stat and read.
        self.check_size(bytes.len() as u64)?;

        debug!(path = %path.display(), size = bytes.len(), "media read");
        Ok(MediaBlob {
            bytes,
            content_type: mime_from_path(path).to_string(),
        })
    }

    fn check_size(&self, size: u64) -> Result<()> {
        if size > self.max_bytes {
            return Err(Error::TooLarge {
                size,
                max: self.max_bytes,
            });
        }
        Ok(())
    }
}

impl Default for MediaStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_BYTES)
    }
}

fn guess_from_url(url: &str) -> Option<&'static str> {
    let path = url.split(['?', '#']).next()?;
    let ext = path.rsplit_once('.')?.1;
    mime_from_extension(ext)
}
