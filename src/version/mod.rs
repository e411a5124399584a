//! Version comparison and channel policy.
//!
//! Decides which release, if any, is offered to an installation. The decision
//! is a pure function of the current version, the followed channel, the
//! manifest and a [`ChannelPolicy`]:
//!
//! - a release must be published on an accepted channel (see
//!   [`Channel::accepts`]);
//! - prereleases are ignored unless `allow_prerelease` is set;
//! - versions at or below the current one are ignored unless
//!   `allow_downgrade` is set, and the running version itself is never offered;
//! - the highest remaining version wins.
//!
//! ```rust,no_run
//! use jubilee_update::manifest::Channel;
//! use jubilee_update::version::{ChannelPolicy, select_candidate};
//!
//! # fn example(releases: &[jubilee_update::manifest::ReleaseDescriptor]) -> jubilee_update::core::UpdateResult<()> {
//! let current = semver::Version::new(8, 0, 4);
//! if let Some(release) = select_candidate(&current, Channel::Stable, releases, ChannelPolicy::default())? {
//!     println!("Update available: {}", release.version);
//! }
//! # Ok(())
//! # }
//! ```

use crate::core::{UpdateError, UpdateResult};
use crate::manifest::{Channel, ReleaseDescriptor};
use semver::Version;
use serde::{Deserialize, Serialize};

/// Knobs that widen the default "newer stable release only" rule.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelPolicy {
    /// Offer versions lower than the running one.
    pub allow_downgrade: bool,
    /// Offer versions with a prerelease tag such as `-beta.1`.
    pub allow_prerelease: bool,
}

impl ChannelPolicy {
    fn admits(&self, current: &Version, channel: Channel, release: &ReleaseDescriptor) -> bool {
        if !channel.accepts(release.channel) {
            return false;
        }
        if !release.version.pre.is_empty() && !self.allow_prerelease {
            return false;
        }
        match release.version.cmp(current) {
            std::cmp::Ordering::Greater => true,
            std::cmp::Ordering::Less => self.allow_downgrade,
            std::cmp::Ordering::Equal => false,
        }
    }
}

/// Picks the release to offer, or `None` when the installation is current.
///
/// When the winning version appears more than once, the entry published on
/// `channel` itself is chosen. If none (or several) of the duplicates belong
/// to `channel` the manifest is ambiguous.
///
/// # Errors
///
/// [`UpdateError::ManifestFormatError`] for an ambiguous duplicate version.
pub fn select_candidate(
    current: &Version,
    channel: Channel,
    releases: &[ReleaseDescriptor],
    policy: ChannelPolicy,
) -> UpdateResult<Option<ReleaseDescriptor>> {
    let Some(best) = releases
        .iter()
        .filter(|release| policy.admits(current, channel, release))
        .map(|release| &release.version)
        .max()
    else {
        return Ok(None);
    };

    let tied: Vec<&ReleaseDescriptor> = releases
        .iter()
        .filter(|release| &release.version == best && policy.admits(current, channel, release))
        .collect();

    if let [only] = tied.as_slice() {
        return Ok(Some((*only).clone()));
    }

    let mut on_channel = tied.iter().filter(|release| release.channel == channel);
    match (on_channel.next(), on_channel.next()) {
        (Some(release), None) => Ok(Some((*release).clone())),
        _ => Err(UpdateError::manifest(format!(
            "version {best} is listed {} times without a unique '{channel}' entry",
            tied.len()
        ))),
    }
}
