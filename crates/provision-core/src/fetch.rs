//! Package download: stream the response body to disk chunk by chunk.

use std::path::Path;

use futures_util::StreamExt;
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use provision_platform::{Error, Result};

#[derive(Debug, Clone, Default)]
pub struct PackageFetcher {
    client: reqwest::Client,
}

impl PackageFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Download `url` to `dest`, returning the number of bytes written.
    pub async fn fetch(&self, url: &str, dest: &Path) -> Result<u64> {
        let (written, _) = self.download(url, dest).await?;
        Ok(written)
    }

    /// Download and check the SHA-256 of the body. A mismatching file is removed.
    pub async fn fetch_verified(&self, url: &str, dest: &Path, sha256: &str) -> Result<u64> {
        let (written, digest) = self.download(url, dest).await?;
        if !digest.eq_ignore_ascii_case(sha256) {
            if let Err(e) = tokio::fs::remove_file(dest).await {
                warn!("failed to remove {}: {}", dest.display(), e);
            }
            return Err(Error::ChecksumMismatch {
                expected: sha256.to_string(),
                actual: digest,
            });
        }
        debug!("checksum verified for {}", dest.display());
        Ok(written)
    }

    async fn download(&self, url: &str, dest: &Path) -> Result<(u64, String)> {
        info!("downloading {} to {}", url, dest.display());

        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| network(url, e))?;

        if !resp.status().is_success() {
            return Err(Error::HttpStatus {
                url: url.to_string(),
                status: resp.status().as_u16(),
            });
        }

        if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::filesystem(parent, e))?;
        }
        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|e| Error::filesystem(dest, e))?;

        let mut hasher = Sha256::new();
        let mut written = 0u64;
        let mut stream = resp.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| network(url, e))?;
            hasher.update(&chunk);
            file.write_all(&chunk)
                .await
                .map_err(|e| Error::filesystem(dest, e))?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(|e| Error::filesystem(dest, e))?;

        info!("downloaded {} bytes", written);
        Ok((written, format!("{:x}", hasher.finalize())))
    }
}

/// Local file name for a package URL: its last non-empty path segment.
pub fn package_file_name(url: &str) -> Result<String> {
    let parsed = reqwest::Url::parse(url)
        .map_err(|e| Error::InvalidArgument(format!("invalid package URL {}: {}", url, e)))?;
    parsed
        .path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .map(str::to_string)
        .ok_or_else(|| Error::InvalidArgument(format!("package URL has no file name: {}", url)))
}

fn network(url: &str, err: reqwest::Error) -> Error {
    Error::Network {
        url: url.to_string(),
        reason: err.to_string(),
    }
}
