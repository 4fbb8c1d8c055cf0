//! Kaggle dataset download with a local cache
//!
//! Archives are fetched from the public Kaggle API, streamed to a temporary
//! file, and extracted under `<cache_root>/<owner>/<name>`. A marker file
//! records a finished extraction so later runs skip the network entirely.

use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{debug, info, warn};

const KAGGLE_API: &str = "https://www.kaggle.com/api/v1";
const COMPLETE_MARKER: &str = ".cellscan-complete";

/// `owner/name` dataset reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetHandle {
    pub owner: String,
    pub name: String,
}

impl FromStr for DatasetHandle {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().split_once('/') {
            Some((owner, name))
                if !owner.is_empty() && !name.is_empty() && !name.contains('/') =>
            {
                Ok(Self {
                    owner: owner.to_string(),
                    name: name.to_string(),
                })
            }
            _ => anyhow::bail!("Invalid dataset handle '{}', expected owner/name", s),
        }
    }
}

impl fmt::Display for DatasetHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

impl DatasetHandle {
    pub fn download_url(&self) -> String {
        format!("{}/datasets/download/{}/{}", KAGGLE_API, self.owner, self.name)
    }

    pub fn cache_dir(&self, cache_root: &Path) -> PathBuf {
        cache_root.join(&self.owner).join(&self.name)
    }
}

/// API credentials, as found in `~/.kaggle/kaggle.json`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct KaggleCredentials {
    pub username: String,
    pub key: String,
}

impl KaggleCredentials {
    /// `KAGGLE_USERNAME` / `KAGGLE_KEY` first, then `~/.kaggle/kaggle.json`
    pub fn discover() -> Option<Self> {
        if let (Ok(username), Ok(key)) =
            (std::env::var("KAGGLE_USERNAME"), std::env::var("KAGGLE_KEY"))
        {
            return Some(Self { username, key });
        }

        let path = dirs::home_dir()?.join(".kaggle").join("kaggle.json");
        let content = std::fs::read_to_string(&path).ok()?;
        match Self::parse(&content) {
            Ok(creds) => Some(creds),
            Err(e) => {
                warn!("Ignoring malformed {}: {}", path.display(), e);
                None
            }
        }
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }
}

/// Default cache root: `~/.cache/cellscan/datasets`
pub fn default_cache_root() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("cellscan")
        .join("datasets")
}

/// Cached dataset root if a previous download finished
pub fn cached_path(handle: &DatasetHandle, cache_root: &Path) -> Option<PathBuf> {
    let dir = handle.cache_dir(cache_root);
    dir.join(COMPLETE_MARKER).is_file().then_some(dir)
}

/// Download and extract a dataset, returning its root directory
pub async fn download(handle: &DatasetHandle, cache_root: &Path) -> Result<PathBuf> {
    if let Some(dir) = cached_path(handle, cache_root) {
        info!("Using cached dataset {} at {}", handle, dir.display());
        return Ok(dir);
    }

    let target = handle.cache_dir(cache_root);
    std::fs::create_dir_all(&target)
        .with_context(|| format!("Failed to create cache dir {}", target.display()))?;

    let url = handle.download_url();
    info!("Downloading dataset {} from {}", handle, url);

    let client = reqwest::Client::builder()
        .user_agent(concat!("cellscan/", env!("CARGO_PKG_VERSION")))
        .build()?;
    let mut request = client.get(&url);
    match KaggleCredentials::discover() {
        Some(creds) => request = request.basic_auth(creds.username, Some(creds.key)),
        None => debug!("No Kaggle credentials found, trying an anonymous download"),
    }

    let mut response = request
        .send()
        .await
        .with_context(|| format!("Failed to reach {}", url))?
        .error_for_status()
        .with_context(|| format!("Dataset download refused for {}", handle))?;

    let archive_path = target.join("archive.zip.part");
    let mut archive = std::fs::File::create(&archive_path)?;
    let mut written: u64 = 0;
    while let Some(chunk) = response.chunk().await? {
        archive.write_all(&chunk)?;
        written += chunk.len() as u64;
    }
    archive.flush()?;
    drop(archive);
    info!("Downloaded {:.1} MiB", written as f64 / (1024.0 * 1024.0));

    let extract_dir = target.clone();
    let archive_for_task = archive_path.clone();
    tokio::task::spawn_blocking(move || extract_archive(&archive_for_task, &extract_dir))
        .await??;

    std::fs::remove_file(&archive_path)?;
    std::fs::write(target.join(COMPLETE_MARKER), handle.to_string())?;

    info!("Dataset {} ready at {}", handle, target.display());
    Ok(target)
}

/// Extract a zip archive into `dest`
pub fn extract_archive(archive_path: &Path, dest: &Path) -> Result<()> {
    let file = std::fs::File::open(archive_path)?;
    let mut archive = zip::ZipArchive::new(file)
        .with_context(|| format!("{} is not a zip archive", archive_path.display()))?;
    info!("Extracting {} entries into {}", archive.len(), dest.display());
    archive.extract(dest)?;
    Ok(())
}
