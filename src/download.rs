use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("failed to download {url}: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to expand {}: {reason}", .archive.display())]
    Extract { archive: PathBuf, reason: String },
}

/// Fetch `url` into `dest`, creating parent directories as needed.
pub fn download_to(
    client: &reqwest::blocking::Client,
    url: &str,
    dest: &Path,
) -> Result<PathBuf, DownloadError> {
    let http_err = |source| DownloadError::Http {
        url: url.to_string(),
        source,
    };
    let write_err = |source| DownloadError::Write {
        path: dest.to_path_buf(),
        source,
    };

    let response = client
        .get(url)
        .send()
        .and_then(|r| r.error_for_status())
        .map_err(http_err)?;
    let bytes = response.bytes().map_err(http_err)?;

    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent).map_err(write_err)?;
    }
    std::fs::write(dest, &bytes).map_err(write_err)?;
    tracing::debug!("downloaded {} bytes to {}", bytes.len(), dest.display());
    Ok(dest.to_path_buf())
}

/// Expand a zip archive into `dest_dir` using pure Rust; returns `dest_dir`.
pub fn extract_zip(archive_path: &Path, dest_dir: &Path) -> Result<PathBuf, DownloadError> {
    let extract_err = |reason: String| DownloadError::Extract {
        archive: archive_path.to_path_buf(),
        reason,
    };

    let f = std::fs::File::open(archive_path).map_err(|e| extract_err(e.to_string()))?;
    let mut archive = zip::ZipArchive::new(f).map_err(|e| extract_err(e.to_string()))?;
    std::fs::create_dir_all(dest_dir).map_err(|e| extract_err(e.to_string()))?;
    archive
        .extract(dest_dir)
        .map_err(|e| extract_err(e.to_string()))?;
    Ok(dest_dir.to_path_buf())
}
