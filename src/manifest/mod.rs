//! Release manifest model and parser.
//!
//! The update server publishes a JSON array of releases, newest first:
//!
//! ```json
//! [{ "version": "8.0.5", "releaseNotes": "...", "downloadUrl": "https://.../pkg.zip",
//!    "sha256": "<hex>", "signature": "<base64, optional>", "channel": "stable" }]
//! ```
//!
//! [`parse_manifest`] turns that payload into validated [`ReleaseDescriptor`]s.
//! It is pure so it can be tested without a network; [`fetcher`] wraps it with
//! the HTTPS transport.

pub mod fetcher;

use crate::core::{UpdateError, UpdateResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub use fetcher::{HttpReleaseSource, ReleaseSource, ensure_secure_url};

/// A named update track.
///
/// Variants are ordered by stability: `Nightly < Beta < Stable`. A channel
/// accepts releases published to itself or to any more stable channel, so a
/// beta installation also receives stable releases.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Nightly,
    Beta,
    #[default]
    Stable,
}

impl Channel {
    /// Whether an installation following `self` may receive a release
    /// published on `release_channel`.
    #[must_use]
    pub fn accepts(self, release_channel: Channel) -> bool {
        release_channel >= self
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Nightly => "nightly",
            Self::Beta => "beta",
            Self::Stable => "stable",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = UpdateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stable" => Ok(Self::Stable),
            "beta" => Ok(Self::Beta),
            "nightly" => Ok(Self::Nightly),
            other => Err(UpdateError::manifest(format!("unknown channel '{other}'"))),
        }
    }
}

/// One published release. Immutable once fetched; identity is version + channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseDescriptor {
    pub version: semver::Version,
    pub channel: Channel,
    pub download_url: String,
    /// Lowercase hex SHA-256 of the package.
    pub digest: String,
    /// Base64 Ed25519 signature over the raw SHA-256 digest bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(default)]
    pub release_notes: String,
}

impl ReleaseDescriptor {
    /// File name the package is staged under, taken from the last URL segment.
    #[must_use]
    pub fn package_file_name(&self) -> String {
        let candidate = self
            .download_url
            .split(['?', '#'])
            .next()
            .and_then(|path| path.rsplit('/').next())
            .unwrap_or_default();

        let is_safe = !candidate.is_empty()
            && candidate != "."
            && candidate != ".."
            && !candidate.contains('\\')
            && candidate.chars().all(|c| c.is_ascii_alphanumeric() || "._-+".contains(c));

        if is_safe {
            candidate.to_string()
        } else {
            format!("jubilee-{}.zip", self.version)
        }
    }
}

/// Wire format of one manifest entry. Every field is optional here so that
/// missing fields produce a precise [`UpdateError::ManifestFormatError`].
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ManifestEntry {
    version: Option<String>,
    #[serde(default)]
    release_notes: Option<String>,
    download_url: Option<String>,
    sha256: Option<String>,
    #[serde(default)]
    signature: Option<String>,
    #[serde(default)]
    channel: Option<String>,
}

/// Parses a version string, tolerating a leading `v` as release tags often carry one.
pub fn parse_version(raw: &str) -> UpdateResult<semver::Version> {
    Ok(semver::Version::parse(raw.trim().trim_start_matches('v'))?)
}

/// Returns `true` for a 64-character hex string.
#[must_use]
pub fn is_sha256_hex(value: &str) -> bool {
    value.len() == 64 && value.chars().all(|c| c.is_ascii_hexdigit())
}

/// Parses and validates a manifest payload.
///
/// Entries without a `channel` are attributed to `requested`. The list must be
/// ordered newest first; equal versions are allowed here and resolved by
/// [`crate::version::select_candidate`].
///
/// # Errors
///
/// [`UpdateError::ManifestFormatError`] when the payload is not a JSON array,
/// an entry misses `version`, `sha256` or `downloadUrl`, a field is invalid, or
/// the list is not monotonic.
pub fn parse_manifest(payload: &[u8], requested: Channel) -> UpdateResult<Vec<ReleaseDescriptor>> {
    let entries: Vec<ManifestEntry> = serde_json::from_slice(payload)
        .map_err(|e| UpdateError::manifest(format!("payload is not a release array: {e}")))?;

    let mut releases = Vec::with_capacity(entries.len());
    for (index, entry) in entries.into_iter().enumerate() {
        releases.push(parse_entry(index, entry, requested)?);
    }

    if let Some(pair) = releases.windows(2).find(|pair| pair[1].version > pair[0].version) {
        return Err(UpdateError::manifest(format!(
            "releases are not ordered newest first ({} listed before {})",
            pair[0].version, pair[1].version
        )));
    }

    Ok(releases)
}

fn parse_entry(
    index: usize,
    entry: ManifestEntry,
    requested: Channel,
) -> UpdateResult<ReleaseDescriptor> {
    let raw_version = entry
        .version
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| UpdateError::manifest(format!("entry {index} has no version")))?;
    let version = parse_version(&raw_version).map_err(|e| {
        UpdateError::manifest(format!("entry {index} has invalid version '{raw_version}': {e}"))
    })?;

    let digest = entry
        .sha256
        .map(|d| d.trim().to_ascii_lowercase())
        .ok_or_else(|| UpdateError::manifest(format!("release {version} has no sha256 digest")))?;
    if !is_sha256_hex(&digest) {
        return Err(UpdateError::manifest(format!(
            "release {version} has a sha256 digest that is not 64 hex characters"
        )));
    }

    let download_url = entry
        .download_url
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| UpdateError::manifest(format!("release {version} has no downloadUrl")))?;
    ensure_secure_url(&download_url)
        .map_err(|e| UpdateError::manifest(format!("release {version}: {e}")))?;

    let channel = match entry.channel {
        Some(raw) => raw.parse()?,
        None => requested,
    };

    Ok(ReleaseDescriptor {
        version,
        channel,
        download_url,
        digest,
        signature: entry.signature.filter(|s| !s.trim().is_empty()),
        release_notes: entry.release_notes.unwrap_or_default(),
    })
}
