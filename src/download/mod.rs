//! Package download and verification pipeline.
//!
//! A download streams the package into `<staging>/<file>.partial`, hashing
//! the bytes as they arrive. Only after the digest (and, with a configured
//! key, the signature) check out is the file renamed to its final name and
//! the [`StagingRecord`] marked `verified`. Any failure deletes the partial
//! file, so a half-written or tampered package never looks installable.
//!
//! ```text
//! staging/
//! ├── staged.json             # StagingRecord
//! └── jubilee-8.0.5.zip       # present only when verified
//! ```

pub mod progress;
pub mod verification;

use crate::constants::{PROGRESS_EMIT_INTERVAL, STAGING_RECORD_FILE_NAME, USER_AGENT};
use crate::core::{UpdateError, UpdateResult};
use crate::manifest::{ReleaseDescriptor, ensure_secure_url};
use crate::utils::fs::{ensure_dir, read_json, remove_dir_all, remove_file_if_exists, write_json_atomic};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

pub use progress::{DownloadProgress, ProgressThrottle};
pub use verification::{ChecksumVerifier, SignatureVerifier};

/// What is known about the package in the staging directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StagingRecord {
    pub package_path: PathBuf,
    pub version: semver::Version,
    pub expected_digest: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_digest: Option<String>,
    pub verified: bool,
    pub staged_at: DateTime<Utc>,
}

impl StagingRecord {
    /// Verified and the package file is still on disk.
    #[must_use]
    pub fn is_installable(&self) -> bool {
        self.verified && self.actual_digest.is_some() && self.package_path.is_file()
    }
}

/// The staging directory and its record file.
#[derive(Debug, Clone)]
pub struct StagingArea {
    dir: PathBuf,
}

impl StagingArea {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
        }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self) -> PathBuf {
        self.dir.join(STAGING_RECORD_FILE_NAME)
    }

    /// Empties the staging directory, creating it if needed.
    pub fn reset(&self) -> UpdateResult<()> {
        remove_dir_all(&self.dir).map_err(UpdateError::storage)?;
        ensure_dir(&self.dir).map_err(UpdateError::storage)
    }

    pub fn save_record(&self, record: &StagingRecord) -> UpdateResult<()> {
        write_json_atomic(&self.record_path(), record).map_err(UpdateError::storage)
    }

    /// The current record; a corrupt record reads as none.
    pub fn load_record(&self) -> Option<StagingRecord> {
        match read_json(&self.record_path()) {
            Ok(record) => record,
            Err(e) => {
                warn!("Ignoring unreadable staging record: {e:#}");
                None
            }
        }
    }

    /// The record of an installable package, if there is one.
    pub fn installable(&self) -> Option<StagingRecord> {
        self.load_record().filter(StagingRecord::is_installable)
    }

    /// Abandons whatever is staged.
    pub fn clear(&self) -> UpdateResult<()> {
        remove_dir_all(&self.dir).map_err(UpdateError::storage)
    }
}

/// A package response: its announced size and a byte stream.
pub struct PackageBody {
    pub total: Option<u64>,
    pub stream: BoxStream<'static, UpdateResult<Bytes>>,
}

/// Anything that can stream a package by URL.
pub trait PackageSource: Send + Sync {
    fn open(&self, url: &str) -> impl Future<Output = UpdateResult<PackageBody>> + Send;
}

/// Streams packages over HTTPS with `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpPackageSource {
    client: reqwest::Client,
}

impl HttpPackageSource {
    pub fn new() -> UpdateResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| UpdateError::network("build HTTP client", e))?;
        Ok(Self {
            client,
        })
    }
}

impl PackageSource for HttpPackageSource {
    async fn open(&self, url: &str) -> UpdateResult<PackageBody> {
        let url = ensure_secure_url(url)?;
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| UpdateError::transfer(format!("request to {url} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpdateError::transfer(format!("{url} answered HTTP {status}")));
        }

        let total = response.content_length();
        let stream = response.bytes_stream().map(|chunk| chunk.map_err(UpdateError::transfer)).boxed();
        Ok(PackageBody {
            total,
            stream,
        })
    }
}

/// Downloads and verifies packages into a [`StagingArea`].
pub struct Downloader<P> {
    source: P,
    verifier: Option<SignatureVerifier>,
    timeout: Duration,
    progress_interval: Duration,
}

impl<P: PackageSource> Downloader<P> {
    pub fn new(source: P, verifier: Option<SignatureVerifier>, timeout: Duration) -> Self {
        Self {
            source,
            verifier,
            timeout,
            progress_interval: PROGRESS_EMIT_INTERVAL,
        }
    }

    #[must_use]
    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }

    /// Downloads `release` into `staging` and returns the verified record.
    ///
    /// `on_progress` receives coalesced samples. The staging directory is
    /// reset first, so at most one package is ever staged.
    ///
    /// # Errors
    ///
    /// - [`UpdateError::TransferError`] when the stream fails, is truncated or times out
    /// - [`UpdateError::IntegrityError`] when the digest does not match
    /// - [`UpdateError::SignatureError`] when a required signature is missing or invalid
    pub async fn download<F>(
        &self,
        release: &ReleaseDescriptor,
        staging: &StagingArea,
        mut on_progress: F,
    ) -> UpdateResult<StagingRecord>
    where
        F: FnMut(DownloadProgress) + Send,
    {
        staging.reset()?;

        let file_name = release.package_file_name();
        let final_path = staging.dir().join(&file_name);
        let partial_path = staging.dir().join(format!("{file_name}.partial"));

        let mut record = StagingRecord {
            package_path: final_path.clone(),
            version: release.version.clone(),
            expected_digest: release.digest.clone(),
            actual_digest: None,
            verified: false,
            staged_at: Utc::now(),
        };
        staging.save_record(&record)?;

        info!(version = %release.version, url = %release.download_url, "Downloading update package");

        let transfer = self.transfer(release, &partial_path, &mut on_progress);
        let actual = match tokio::time::timeout(self.timeout, transfer).await {
            Ok(Ok(actual)) => actual,
            Ok(Err(e)) => {
                discard(&partial_path);
                return Err(e);
            }
            Err(_) => {
                discard(&partial_path);
                return Err(UpdateError::transfer(format!(
                    "download timed out after {}s",
                    self.timeout.as_secs()
                )));
            }
        };

        record.actual_digest = Some(actual.clone());

        if !ChecksumVerifier::digests_match(&release.digest, &actual) {
            discard(&partial_path);
            staging.save_record(&record)?;
            return Err(UpdateError::IntegrityError {
                package: file_name,
                expected: release.digest.clone(),
                actual,
            });
        }

        match &self.verifier {
            Some(verifier) => {
                if let Err(e) = verifier.verify_digest(&actual, release.signature.as_deref()) {
                    discard(&partial_path);
                    staging.save_record(&record)?;
                    return Err(e);
                }
            }
            None => {
                warn!(version = %release.version, "No signing key configured, skipping signature verification");
            }
        }

        tokio::fs::rename(&partial_path, &final_path).await?;
        record.verified = true;
        record.staged_at = Utc::now();
        staging.save_record(&record)?;

        info!(version = %release.version, path = %final_path.display(), "Update package verified and staged");
        Ok(record)
    }

    async fn transfer<F>(
        &self,
        release: &ReleaseDescriptor,
        partial_path: &Path,
        on_progress: &mut F,
    ) -> UpdateResult<String>
    where
        F: FnMut(DownloadProgress) + Send,
    {
        let PackageBody {
            total,
            mut stream,
        } = self.source.open(&release.download_url).await?;

        let mut file = tokio::fs::File::create(partial_path).await?;
        let mut hasher = Sha256::new();
        let mut transferred = 0u64;
        let mut throttle = ProgressThrottle::new(self.progress_interval, Instant::now());

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            hasher.update(&chunk);
            transferred += chunk.len() as u64;

            if let Some(sample) = throttle.update_at(Instant::now(), transferred, total) {
                on_progress(sample);
            }
        }

        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        match total {
            Some(total) if transferred != total => {
                return Err(UpdateError::transfer(format!(
                    "received {transferred} of {total} bytes"
                )));
            }
            Some(_) => {}
            None => {
                if let Some(sample) = throttle.update_at(Instant::now(), transferred, Some(transferred)) {
                    on_progress(sample);
                }
            }
        }

        debug!(bytes = transferred, "Package transfer finished");
        Ok(hex::encode(hasher.finalize()))
    }
}

fn discard(path: &Path) {
    if let Err(e) = remove_file_if_exists(path) {
        warn!("Failed to remove partial package {}: {e:#}", path.display());
    }
}
