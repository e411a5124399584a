use super::events::EventHub;
use super::schedule::{Clock, RetryPolicy, duration_ms};
use super::state::{Transition, UpdateState, UpdateStatus};
use super::store::UpdateStore;
use crate::apply::{ApplyController, ApplyOutcome, StartupRecovery};
use crate::config::AgentConfig;
use crate::core::{UpdateError, UpdateResult};
use crate::download::{DownloadProgress, Downloader, PackageSource, StagingArea, StagingRecord};
use crate::manifest::{Channel, ReleaseDescriptor, ReleaseSource};
use crate::session::{SessionCapture, SessionManager};
use crate::version::{ChannelPolicy, select_candidate};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// The scheduling and policy inputs of an [`UpdateMachine`].
#[derive(Debug, Clone)]
pub struct MachineSettings {
    pub endpoint: String,
    pub channel: Channel,
    pub policy: ChannelPolicy,
    pub check_interval: Duration,
    pub initial_delay: Duration,
    pub apply_check_interval: Duration,
    pub retry: RetryPolicy,
    /// Upper bound on one manifest fetch, whatever the source.
    pub fetch_timeout: Duration,
    /// Download as soon as a check finds a candidate. Without it the
    /// machine waits in `available` for [`UpdateMachine::request_download`].
    pub auto_download: bool,
}

impl MachineSettings {
    #[must_use]
    pub fn from_config(config: &AgentConfig) -> Self {
        Self {
            endpoint: config.update_endpoint.clone(),
            channel: config.channel,
            policy: config.channel_policy(),
            check_interval: config.check_interval(),
            initial_delay: config.initial_delay(),
            apply_check_interval: config.apply_check_interval(),
            retry: config.retry_policy(),
            fetch_timeout: config.fetch_timeout(),
            auto_download: true,
        }
    }
}

/// Result of an install request that did not fail outright.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    /// The new version is installed; the browser must restart into it.
    RestartRequired { version: semver::Version },
    /// The install failed and the previous version was restored.
    RolledBack { message: String },
}

/// Owns the [`UpdateState`] and drives checks, downloads and installs.
///
/// It is the only writer of the state: every change goes through
/// [`UpdateState::apply`], is persisted, and is published on the
/// [`EventHub`]. The machine does not sleep; callers read
/// [`Self::next_wake_ms`] and call [`Self::tick`] once that time is reached.
pub struct UpdateMachine<R, P, C> {
    settings: MachineSettings,
    releases: R,
    downloader: Downloader<P>,
    staging: StagingArea,
    store: UpdateStore,
    events: EventHub,
    clock: C,
    state: UpdateState,
    /// The release behind `available`, kept for a manual download.
    candidate: Option<ReleaseDescriptor>,
    next_wake_ms: Option<u64>,
    last_failure: Option<UpdateError>,
}

impl<R, P, C> UpdateMachine<R, P, C>
where
    R: ReleaseSource,
    P: PackageSource,
    C: Clock,
{
    /// Restores the persisted state and schedules the first wake-up.
    ///
    /// A persisted `downloaded` status survives only if its package is still
    /// staged and verified.
    pub fn new(
        settings: MachineSettings,
        current_version: semver::Version,
        releases: R,
        downloader: Downloader<P>,
        staging: StagingArea,
        store: UpdateStore,
        clock: C,
    ) -> Self {
        let mut state = store.load(settings.channel, current_version);

        if state.status == UpdateStatus::Downloaded {
            let staged = staging.installable();
            let matches = staged.as_ref().map(|record| &record.version) == state.available_version.as_ref();
            if !matches {
                info!("Staged update is gone, starting over");
                state = UpdateState {
                    status: UpdateStatus::Idle,
                    available_version: None,
                    download_progress: None,
                    ..state
                };
            }
        }

        let now = clock.now_ms();
        let next_wake_ms = Some(initial_wake(&settings, &state, now));

        let events = EventHub::new(state.clone());
        let machine = Self {
            settings,
            releases,
            downloader,
            staging,
            store,
            events,
            clock,
            state,
            candidate: None,
            next_wake_ms,
            last_failure: None,
        };
        machine.persist();
        machine
    }

    /// A copy of the current state.
    #[must_use]
    pub fn snapshot(&self) -> UpdateState {
        self.state.clone()
    }

    #[must_use]
    pub fn events(&self) -> &EventHub {
        &self.events
    }

    /// Epoch milliseconds of the next scheduled action; `None` after a fatal error
    /// or a completed install.
    #[must_use]
    pub const fn next_wake_ms(&self) -> Option<u64> {
        self.next_wake_ms
    }

    /// The machine's notion of now, in epoch milliseconds.
    #[must_use]
    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    /// Runs whatever is due at the current time.
    pub async fn tick(&mut self) -> UpdateState {
        let now = self.clock.now_ms();
        let Some(due) = self.next_wake_ms else {
            return self.snapshot();
        };
        if now < due {
            return self.snapshot();
        }

        match self.state.status {
            UpdateStatus::Idle | UpdateStatus::Error | UpdateStatus::Available => {
                self.run_check(self.settings.auto_download).await;
            }
            UpdateStatus::Downloaded => self.announce_staged(),
            status => debug!(%status, "Nothing to do on wake-up"),
        }
        self.snapshot()
    }

    /// Runs a check now, regardless of the timer.
    ///
    /// While a download or install is underway, or an update is already
    /// downloaded, this does nothing and returns the current state.
    pub async fn request_check(&mut self) -> UpdateState {
        if self.accepts_check() {
            self.run_check(self.settings.auto_download).await;
        }
        self.snapshot()
    }

    /// Downloads the pending candidate, checking first when there is none.
    ///
    /// This is how an update found with `auto_download` off gets fetched.
    pub async fn request_download(&mut self) -> UpdateState {
        match (self.state.status, self.candidate.clone()) {
            (UpdateStatus::Available, Some(release)) => self.download(release).await,
            _ => {
                if self.accepts_check() {
                    self.run_check(true).await;
                }
            }
        }
        self.snapshot()
    }

    fn accepts_check(&self) -> bool {
        match self.state.status {
            UpdateStatus::Error if self.next_wake_ms.is_none() => {
                warn!("Update checks are halted after a fatal error");
                false
            }
            UpdateStatus::Idle | UpdateStatus::Error | UpdateStatus::Available => true,
            status => {
                info!(%status, "update already in progress");
                false
            }
        }
    }

    async fn run_check(&mut self, then_download: bool) {
        if let Err(e) = self.transition(Transition::BeginCheck) {
            warn!("{e}");
            return;
        }
        self.candidate = None;
        info!(channel = %self.settings.channel, "Checking for updates");

        let timeout = self.settings.fetch_timeout;
        let result = tokio::time::timeout(
            timeout,
            self.releases.fetch_releases(&self.settings.endpoint, self.settings.channel),
        )
        .await
        .unwrap_or_else(|_| {
            Err(UpdateError::network(
                format!("fetch manifest from {}", self.settings.endpoint),
                format!("timed out after {}s", timeout.as_secs()),
            ))
        })
        .and_then(|releases| {
            select_candidate(&self.state.current_version, self.settings.channel, &releases, self.settings.policy)
        });

        let now = self.clock.now_ms();
        match result {
            Ok(None) => {
                info!(current = %self.state.current_version, "No update available");
                self.next_wake_ms = Some(now + duration_ms(self.settings.check_interval));
                self.commit(Transition::NoCandidate {
                    at: now,
                });
            }
            Ok(Some(release)) => {
                info!(version = %release.version, "Update available");
                self.next_wake_ms = Some(now + duration_ms(self.settings.check_interval));
                self.commit(Transition::CandidateFound {
                    version: release.version.clone(),
                    at: now,
                });
                if then_download {
                    self.download(release).await;
                } else {
                    self.candidate = Some(release);
                }
            }
            Err(e) => self.fail(e),
        }
    }

    async fn download(&mut self, release: ReleaseDescriptor) {
        if let Err(e) = self.transition(Transition::BeginDownload) {
            warn!("{e}");
            return;
        }
        self.candidate = None;

        let result = {
            let Self {
                downloader,
                staging,
                state,
                store,
                events,
                ..
            } = self;
            let (progress_tx, mut progress_rx) = mpsc::unbounded_channel();
            let transfer = downloader.download(&release, staging, move |sample| {
                // The receiver is drained below until the transfer ends.
                let _ = progress_tx.send(sample);
            });
            tokio::pin!(transfer);

            let result = loop {
                tokio::select! {
                    biased;
                    Some(sample) = progress_rx.recv() => record_progress(state, store, events, sample),
                    result = &mut transfer => break result,
                }
            };
            while let Ok(sample) = progress_rx.try_recv() {
                record_progress(state, store, events, sample);
            }
            result
        };

        match result {
            Ok(_) => {
                let now = self.clock.now_ms();
                self.next_wake_ms = Some(now + duration_ms(self.settings.apply_check_interval));
                self.commit(Transition::Downloaded);
                info!(version = %release.version, "Update downloaded and ready to install");
            }
            Err(e) => self.fail(e),
        }
    }

    /// Re-publishes a waiting update, or fails if its package disappeared.
    fn announce_staged(&mut self) {
        let now = self.clock.now_ms();
        if self.staged_for_available().is_none() {
            self.fail(UpdateError::transfer("the staged update package is missing"));
            return;
        }
        info!(version = ?self.state.available_version, "Update ready to install");
        self.events.publish_state(self.snapshot());
        self.next_wake_ms = Some(now + duration_ms(self.settings.apply_check_interval));
    }

    fn staged_for_available(&self) -> Option<StagingRecord> {
        let available = self.state.available_version.as_ref()?;
        self.staging.installable().filter(|record| &record.version == available)
    }

    /// Snapshots the session and installs the downloaded update.
    ///
    /// # Errors
    ///
    /// - [`UpdateError::InvalidTransition`] unless an update is downloaded
    /// - the refusal or fatal error from [`ApplyController::apply`]; both are
    ///   also recorded in the state
    pub async fn request_install(
        &mut self,
        capture: SessionCapture,
        sessions: &SessionManager,
        controller: &ApplyController,
    ) -> UpdateResult<InstallOutcome> {
        if self.state.status != UpdateStatus::Downloaded {
            return Err(UpdateError::InvalidTransition {
                from: self.state.status,
                event: Transition::BeginInstall.name(),
            });
        }

        let Some(staged) = self.staged_for_available() else {
            let error = UpdateError::transfer("the staged update package is missing");
            self.record_failure(&error);
            return Err(error);
        };

        sessions.snapshot(capture, true)?;
        self.transition(Transition::BeginInstall)?;

        match controller.apply(&staged).await {
            Ok(ApplyOutcome::Applied {
                version,
            }) => {
                if let Err(e) = self.staging.clear() {
                    warn!("Failed to clear staging after install: {e}");
                }
                self.next_wake_ms = None;
                Ok(InstallOutcome::RestartRequired {
                    version,
                })
            }
            Ok(ApplyOutcome::RolledBack {
                error,
            }) => {
                self.abandon_install(sessions);
                let message = error.user_message();
                self.fail(error);
                Ok(InstallOutcome::RolledBack {
                    message,
                })
            }
            Err(e) => {
                if !e.is_fatal() {
                    self.abandon_install(sessions);
                }
                self.record_failure(&e);
                Err(e)
            }
        }
    }

    fn abandon_install(&self, sessions: &SessionManager) {
        if let Err(e) = sessions.clear_pending_update() {
            warn!("Failed to clear pending-update flag on session: {e}");
        }
        if let Err(e) = self.staging.clear() {
            warn!("Failed to clear staging: {e}");
        }
    }

    /// Records a startup rollback as a failed install, so it shows up in
    /// `lastError` and backs off the next check like any other failure.
    pub fn record_interrupted_install(&mut self, recovery: &StartupRecovery) {
        let StartupRecovery::RolledBack {
            restored_version,
            interrupted_version,
        } = recovery
        else {
            return;
        };

        let error = UpdateError::ApplyError {
            version: interrupted_version.as_ref().map_or_else(|| "(unknown)".to_string(), ToString::to_string),
            reason: format!("the install did not finish and {restored_version} was put back"),
            rolled_back: true,
        };
        let now = self.clock.now_ms();
        error!("Update failed: {error}");
        self.commit(Transition::Interrupted {
            message: error.user_message(),
            at: now,
        });
        self.schedule_retry(now);
        self.last_failure = Some(error);
    }

    /// The error behind the most recent transition to `error`, if it has
    /// not been taken yet.
    pub fn take_last_failure(&mut self) -> Option<UpdateError> {
        self.last_failure.take()
    }

    fn fail(&mut self, error: UpdateError) {
        self.record_failure(&error);
        self.last_failure = Some(error);
    }

    /// Records `error` and schedules the retry. Fatal errors stop scheduling.
    fn record_failure(&mut self, error: &UpdateError) {
        let now = self.clock.now_ms();
        error!(status = %self.state.status, fatal = error.is_fatal(), "Update failed: {error}");

        self.commit(Transition::Failed {
            message: error.user_message(),
            at: now,
        });

        if error.is_fatal() {
            self.next_wake_ms = None;
        } else {
            self.schedule_retry(now);
        }
    }

    fn schedule_retry(&mut self, now: u64) {
        let delay = self.settings.retry.interval(self.state.consecutive_failures);
        debug!(failures = self.state.consecutive_failures, ?delay, "Scheduling retry");
        self.next_wake_ms = Some(now + duration_ms(delay));
    }

    fn transition(&mut self, transition: Transition) -> UpdateResult<()> {
        advance(&mut self.state, &self.store, &self.events, transition)
    }

    /// [`Self::transition`] for transitions the caller has already gated.
    fn commit(&mut self, transition: Transition) {
        if let Err(e) = self.transition(transition) {
            error!("Dropped update transition: {e}");
        }
    }

    fn persist(&self) {
        if let Err(e) = self.store.save(&self.state) {
            warn!("Failed to persist update state: {e}");
        }
    }
}

/// Applies, persists and publishes one transition.
fn advance(
    state: &mut UpdateState,
    store: &UpdateStore,
    events: &EventHub,
    transition: Transition,
) -> UpdateResult<()> {
    state.apply(transition)?;
    if let Err(e) = store.save(state) {
        warn!("Failed to persist update state: {e}");
    }
    events.publish_state(state.clone());
    Ok(())
}

fn record_progress(state: &mut UpdateState, store: &UpdateStore, events: &EventHub, sample: DownloadProgress) {
    if let Err(e) = advance(state, store, events, Transition::Progress(sample.percent)) {
        error!("Dropped update transition: {e}");
    }
    events.publish_progress(sample);
}

/// First wake-up after start: never before the initial delay, and not
/// before the persisted schedule says the next check is due.
fn initial_wake(settings: &MachineSettings, state: &UpdateState, now: u64) -> u64 {
    let earliest = now + duration_ms(settings.initial_delay);
    if state.status == UpdateStatus::Downloaded {
        return earliest;
    }

    let interval = if state.status == UpdateStatus::Error {
        settings.retry.interval(state.consecutive_failures)
    } else {
        settings.check_interval
    };
    let due = state.last_check_time.map_or(0, |at| at + duration_ms(interval));
    earliest.max(due)
}
