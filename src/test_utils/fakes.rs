//! In-memory [`ReleaseSource`] and [`PackageSource`] implementations.

use crate::core::{UpdateError, UpdateResult};
use crate::download::{PackageBody, PackageSource};
use crate::manifest::{Channel, ReleaseDescriptor, ReleaseSource};
use bytes::Bytes;
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Serves a fixed release list, or fails while an outage is set.
#[derive(Debug, Clone, Default)]
pub struct FakeReleaseSource {
    releases: Arc<Mutex<Vec<ReleaseDescriptor>>>,
    outage: Arc<Mutex<Option<String>>>,
    stalled: Arc<AtomicBool>,
    calls: Arc<AtomicUsize>,
}

impl FakeReleaseSource {
    #[must_use]
    pub fn new(releases: Vec<ReleaseDescriptor>) -> Self {
        Self {
            releases: Arc::new(Mutex::new(releases)),
            ..Self::default()
        }
    }

    /// Every fetch fails with a network error until [`Self::restore`].
    pub fn fail_with(&self, reason: &str) {
        *self.outage.lock().unwrap() = Some(reason.to_string());
    }

    /// Every fetch hangs without answering until [`Self::restore`].
    pub fn stall(&self) {
        self.stalled.store(true, Ordering::SeqCst);
    }

    pub fn restore(&self) {
        *self.outage.lock().unwrap() = None;
        self.stalled.store(false, Ordering::SeqCst);
    }

    pub fn set_releases(&self, releases: Vec<ReleaseDescriptor>) {
        *self.releases.lock().unwrap() = releases;
    }

    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ReleaseSource for FakeReleaseSource {
    async fn fetch_releases(&self, endpoint: &str, _channel: Channel) -> UpdateResult<Vec<ReleaseDescriptor>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.stalled.load(Ordering::SeqCst) {
            return futures::future::pending().await;
        }
        if let Some(reason) = self.outage.lock().unwrap().clone() {
            return Err(UpdateError::network(format!("GET {endpoint}"), reason));
        }
        Ok(self.releases.lock().unwrap().clone())
    }
}

type MidpointHook = Arc<dyn Fn() + Send + Sync>;

/// How a package body is delivered.
#[derive(Clone)]
enum Delivery {
    /// All chunks, back to back.
    Whole,
    /// The first half, then nothing ever again.
    StallAfterHalf,
    /// The first half, a yield to the runtime, `hook`, then the rest.
    PauseAtHalf(MidpointHook),
}

/// Serves package bytes by URL, in small chunks.
#[derive(Clone, Default)]
pub struct FakePackageSource {
    packages: Arc<Mutex<HashMap<String, (Vec<u8>, Delivery)>>>,
}

impl std::fmt::Debug for FakePackageSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let urls: Vec<String> = self.packages.lock().unwrap().keys().cloned().collect();
        f.debug_struct("FakePackageSource").field("urls", &urls).finish()
    }
}

impl FakePackageSource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_package(self, url: &str, bytes: Vec<u8>) -> Self {
        self.insert(url, bytes, Delivery::Whole)
    }

    /// Sends the first half of `bytes` and then hangs.
    #[must_use]
    pub fn with_stalled_package(self, url: &str, bytes: Vec<u8>) -> Self {
        self.insert(url, bytes, Delivery::StallAfterHalf)
    }

    /// Sends the first half of `bytes`, lets the consumer run, calls `hook`,
    /// then sends the rest.
    #[must_use]
    pub fn with_paused_package(self, url: &str, bytes: Vec<u8>, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.insert(url, bytes, Delivery::PauseAtHalf(Arc::new(hook)))
    }

    fn insert(self, url: &str, bytes: Vec<u8>, delivery: Delivery) -> Self {
        self.packages.lock().unwrap().insert(url.to_string(), (bytes, delivery));
        self
    }
}

impl PackageSource for FakePackageSource {
    async fn open(&self, url: &str) -> UpdateResult<PackageBody> {
        let Some((bytes, delivery)) = self.packages.lock().unwrap().get(url).cloned() else {
            return Err(UpdateError::transfer(format!("GET {url} returned 404 Not Found")));
        };
        let total = Some(bytes.len() as u64);
        let chunks = |bytes: &[u8]| -> Vec<UpdateResult<Bytes>> {
            bytes.chunks(1024).map(|chunk| Ok(Bytes::copy_from_slice(chunk))).collect()
        };

        let stream = match delivery {
            Delivery::Whole => futures::stream::iter(chunks(&bytes)).boxed(),
            Delivery::StallAfterHalf => {
                let (head, _) = bytes.split_at(bytes.len() / 2);
                futures::stream::iter(chunks(head)).chain(futures::stream::pending()).boxed()
            }
            Delivery::PauseAtHalf(hook) => {
                let (head, tail) = bytes.split_at(bytes.len() / 2);
                let tail = chunks(tail);
                let pause = futures::stream::once(async move {
                    tokio::task::yield_now().await;
                    hook();
                    futures::stream::iter(tail)
                })
                .flatten();
                futures::stream::iter(chunks(head)).chain(pause).boxed()
            }
        };
        Ok(PackageBody {
            total,
            stream,
        })
    }
}
