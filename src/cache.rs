use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant};
use tracing::{debug, trace, warn};

use crate::client::DeviceApi;
use crate::types::DeviceStatus;
use crate::{Error, Result};

pub const DEFAULT_TTL: Duration = Duration::from_secs(30);
pub const DEFAULT_DEVICE_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(30);

type FetchResult = std::result::Result<DeviceStatus, Arc<Error>>;
type Waiter = oneshot::Sender<FetchResult>;

#[derive(Debug, Clone, Copy)]
pub struct CacheOptions {
    /// Lifetime of a fetched status, counted from fetch completion.
    pub ttl: Duration,
    pub device_timeout: Duration,
    /// Upper bound on how long a read waits for an in-flight fetch.
    pub wait_timeout: Duration,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            device_timeout: DEFAULT_DEVICE_TIMEOUT,
            wait_timeout: DEFAULT_WAIT_TIMEOUT,
        }
    }
}

enum CachedEntry {
    Empty,
    Fetching {
        waiters: Vec<Waiter>,
        /// Set by `invalidate` mid-fetch: deliver the result, don't keep it.
        stale: bool,
    },
    Value {
        status: DeviceStatus,
        expires_at: Instant,
    },
}

/// Observable shape of the cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    Empty,
    Fetching,
    Fresh,
    Expired,
}

struct CacheInner {
    device: Arc<dyn DeviceApi>,
    options: CacheOptions,
    entry: Mutex<CachedEntry>,
    // While set, fetched statuses may predate a command and are not kept.
    write_pending: AtomicBool,
}

#[derive(Clone)]
pub struct StatusCache {
    inner: Arc<CacheInner>,
}

impl StatusCache {
    pub fn new(device: Arc<dyn DeviceApi>, options: CacheOptions) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                device,
                options,
                entry: Mutex::new(CachedEntry::Empty),
                write_pending: AtomicBool::new(false),
            }),
        }
    }

    pub fn options(&self) -> &CacheOptions {
        &self.inner.options
    }

    pub async fn read(&self) -> Result<DeviceStatus> {
        let (tx, rx) = oneshot::channel();
        let start_fetch = {
            let mut entry = self.inner.entry.lock();
            if let CachedEntry::Value { status, expires_at } = &*entry
                && Instant::now() < *expires_at
            {
                trace!("status cache hit");
                return Ok(status.clone());
            }

            if let CachedEntry::Fetching { waiters, .. } = &mut *entry {
                waiters.push(tx);
                debug!(waiting = waiters.len(), "status fetch in flight, queued");
                false
            } else {
                *entry = CachedEntry::Fetching {
                    waiters: vec![tx],
                    stale: self.inner.write_pending.load(Ordering::SeqCst),
                };
                true
            }
        };

        if start_fetch {
            self.spawn_fetch();
        }

        match timeout(self.inner.options.wait_timeout, rx).await {
            Ok(Ok(Ok(status))) => Ok(status),
            Ok(Ok(Err(e))) => Err(Error::Fetch(e)),
            Ok(Err(_)) => Err(Error::Closed),
            Err(_) => {
                warn!("gave up waiting for status fetch");
                Err(Error::Timeout)
            }
        }
    }

    /// Cached status if fresh; never touches the device.
    pub fn peek(&self) -> Option<DeviceStatus> {
        match &*self.inner.entry.lock() {
            CachedEntry::Value { status, expires_at } if Instant::now() < *expires_at => {
                Some(status.clone())
            }
            _ => None,
        }
    }

    pub fn state(&self) -> CacheState {
        match &*self.inner.entry.lock() {
            CachedEntry::Empty => CacheState::Empty,
            CachedEntry::Fetching { .. } => CacheState::Fetching,
            CachedEntry::Value { expires_at, .. } if Instant::now() < *expires_at => {
                CacheState::Fresh
            }
            CachedEntry::Value { .. } => CacheState::Expired,
        }
    }

    /// Forget the cached status. An in-flight fetch still answers its
    /// waiters but its result is not kept.
    pub fn invalidate(&self) {
        let mut entry = self.inner.entry.lock();
        if let CachedEntry::Fetching { stale, .. } = &mut *entry {
            *stale = true;
        } else {
            *entry = CachedEntry::Empty;
        }
    }

    /// Marks whether a device write is pending or in flight. While it is,
    /// reads still reach the device but their results are not cached.
    pub fn set_write_pending(&self, pending: bool) {
        self.inner.write_pending.store(pending, Ordering::SeqCst);
    }

    pub fn is_write_pending(&self) -> bool {
        self.inner.write_pending.load(Ordering::SeqCst)
    }

    /// Drops an expired value. Returns whether anything was evicted.
    pub fn evict_expired(&self) -> bool {
        let mut entry = self.inner.entry.lock();
        if let CachedEntry::Value { expires_at, .. } = &*entry
            && Instant::now() >= *expires_at
        {
            *entry = CachedEntry::Empty;
            return true;
        }
        false
    }

    /// Periodically evicts expired values until the cache is dropped.
    pub fn spawn_sweeper(&self, check_period: Duration) -> JoinHandle<()> {
        let weak: Weak<CacheInner> = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(check_period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                if (StatusCache { inner }).evict_expired() {
                    trace!("evicted expired status");
                }
            }
        })
    }

    // The fetch runs detached so a caller abandoning its read cannot strand
    // the entry in `Fetching`.
    fn spawn_fetch(&self) {
        let inner = self.inner.clone();
        tokio::spawn(async move {
            debug!("fetching status from device");
            let result = match timeout(inner.options.device_timeout, inner.device.get_status()).await
            {
                Ok(Ok(raw)) => Ok(DeviceStatus::from_raw(&raw, Utc::now())),
                Ok(Err(e)) => Err(Arc::new(e)),
                Err(_) => Err(Arc::new(Error::Timeout)),
            };
            inner.complete(result);
        });
    }
}

impl CacheInner {
    fn complete(&self, result: FetchResult) {
        let waiters = {
            let mut entry = self.entry.lock();
            let (waiters, stale) = match std::mem::replace(&mut *entry, CachedEntry::Empty) {
                CachedEntry::Fetching { waiters, stale } => (waiters, stale),
                other => {
                    *entry = other;
                    return;
                }
            };
            match &result {
                Ok(status) if !stale => {
                    debug!(
                        mode = %status.mode,
                        temperature = %status.temperature,
                        target = %status.target_temperature,
                        "status cached"
                    );
                    *entry = CachedEntry::Value {
                        status: status.clone(),
                        expires_at: Instant::now() + self.options.ttl,
                    };
                }
                Ok(_) => debug!("status fetched after invalidation, not caching"),
                Err(e) => warn!(error = %e, "failed getting status"),
            }
            waiters
        };

        for waiter in waiters {
            let _ = waiter.send(result.clone());
        }
    }
}
