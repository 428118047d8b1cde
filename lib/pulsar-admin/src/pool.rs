//! Connection policy and per-host connection pool.
//!
//! The pool hands out [`PooledConnection`] leases. Each host gets its own
//! semaphore when `max_connections_per_host > 0`, so the cap is a hard upper
//! bound on concurrent requests to that host. Released connections are kept
//! on an idle list until the idle sweep evicts them.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, trace};

use crate::{Error, Result};

/// Default maximum number of connections per host.
pub const DEFAULT_MAX_CONNECTIONS_PER_HOST: i32 = 16;
/// Default idle time before a pooled connection is evicted.
pub const DEFAULT_CONNECTION_MAX_IDLE: Duration = Duration::from_secs(25);
/// Default connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(60);
/// Default read timeout.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(60);
/// Default request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

const MIN_SWEEP_PERIOD: Duration = Duration::from_millis(100);

/// Pool sizing and timing policy.
///
/// A zero duration means "no explicit timeout": the transport default applies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionPolicy {
    /// Maximum concurrent connections per host; `<= 0` disables the cap.
    pub max_connections_per_host: i32,
    /// Idle time after which a pooled connection is evicted.
    pub connection_max_idle: Duration,
    /// TCP connect timeout, also bounding the wait for a pooled connection.
    pub connect_timeout: Duration,
    /// Timeout for reading the response body.
    pub read_timeout: Duration,
    /// Timeout for the whole request.
    pub request_timeout: Duration,
}

impl Default for ConnectionPolicy {
    fn default() -> Self {
        Self {
            max_connections_per_host: DEFAULT_MAX_CONNECTIONS_PER_HOST,
            connection_max_idle: DEFAULT_CONNECTION_MAX_IDLE,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl ConnectionPolicy {
    /// The per-host cap, or `None` when unlimited.
    #[must_use]
    pub fn connection_limit(&self) -> Option<usize> {
        usize::try_from(self.max_connections_per_host)
            .ok()
            .filter(|limit| *limit > 0)
    }

    /// Sanity checks run by `build()`.
    pub(crate) fn validate(&self) -> Result<()> {
        if let Some(limit) = self.connection_limit()
            && limit > Semaphore::MAX_PERMITS
        {
            return Err(Error::configuration(format!(
                "maxConnectionsPerHost {limit} exceeds the supported maximum {}",
                Semaphore::MAX_PERMITS
            )));
        }
        Ok(())
    }
}

/// Snapshot of the pool content.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Hosts with a pool entry.
    pub hosts: usize,
    /// Connections currently leased.
    pub active: usize,
    /// Connections waiting on the idle list.
    pub idle: usize,
}

struct IdleConnection {
    id: u64,
    idle_since: Instant,
}

struct HostSlots {
    permits: Option<Arc<Semaphore>>,
    idle: Vec<IdleConnection>,
    active: usize,
}

impl HostSlots {
    fn new(limit: Option<usize>) -> Self {
        Self {
            permits: limit.map(|limit| Arc::new(Semaphore::new(limit))),
            idle: Vec::new(),
            active: 0,
        }
    }

    fn is_unused(&self) -> bool {
        self.active == 0
            && self.idle.is_empty()
            && self
                .permits
                .as_ref()
                .is_none_or(|permits| Arc::strong_count(permits) == 1)
    }
}

struct PoolInner {
    policy: ConnectionPolicy,
    hosts: Mutex<HashMap<String, HostSlots>>,
    next_id: AtomicU64,
    closed: AtomicBool,
}

impl PoolInner {
    fn hosts(&self) -> MutexGuard<'_, HashMap<String, HostSlots>> {
        self.hosts.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn release(&self, host: &str, id: u64) {
        let mut hosts = self.hosts();
        let Some(slots) = hosts.get_mut(host) else {
            return;
        };
        slots.active = slots.active.saturating_sub(1);
        if !self.closed.load(Ordering::Acquire) {
            slots.idle.push(IdleConnection {
                id,
                idle_since: Instant::now(),
            });
            trace!(host, connection = id, "connection returned to pool");
        }
    }
}

/// Shared, concurrency-safe connection pool.
///
/// Cloning is cheap and yields a handle to the same pool.
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("policy", &self.inner.policy)
            .field("stats", &self.stats())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl ConnectionPool {
    /// Create an empty pool for the given policy.
    #[must_use]
    pub fn new(policy: ConnectionPolicy) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                policy,
                hosts: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// The policy this pool enforces.
    #[must_use]
    pub fn policy(&self) -> &ConnectionPolicy {
        &self.inner.policy
    }

    /// Lease a connection to `host`.
    ///
    /// Waits for a free slot when the host is at its cap, at most
    /// `connect_timeout` (forever when zero).
    pub async fn acquire(&self, host: &str) -> Result<PooledConnection> {
        if self.is_closed() {
            return Err(Error::PoolClosed);
        }

        let permits = {
            let limit = self.inner.policy.connection_limit();
            let mut hosts = self.inner.hosts();
            hosts
                .entry(host.to_string())
                .or_insert_with(|| HostSlots::new(limit))
                .permits
                .clone()
        };

        let permit = match permits {
            Some(permits) => Some(self.wait_for_permit(host, permits).await?),
            None => None,
        };

        let mut hosts = self.inner.hosts();
        if self.is_closed() {
            return Err(Error::PoolClosed);
        }
        let limit = self.inner.policy.connection_limit();
        let slots = hosts
            .entry(host.to_string())
            .or_insert_with(|| HostSlots::new(limit));
        let (id, reused) = match slots.idle.pop() {
            Some(idle) => (idle.id, true),
            None => (self.inner.next_id.fetch_add(1, Ordering::Relaxed), false),
        };
        slots.active += 1;
        trace!(host, connection = id, reused, "connection leased");

        Ok(PooledConnection {
            id,
            host: host.to_string(),
            reused,
            pool: Arc::clone(&self.inner),
            _permit: permit,
        })
    }

    async fn wait_for_permit(
        &self,
        host: &str,
        permits: Arc<Semaphore>,
    ) -> Result<OwnedSemaphorePermit> {
        let timeout = self.inner.policy.connect_timeout;
        let acquired = if timeout.is_zero() {
            permits.acquire_owned().await
        } else {
            tokio::time::timeout(timeout, permits.acquire_owned())
                .await
                .map_err(|_| {
                    debug!(host, waited = ?timeout, "no pooled connection available");
                    Error::PoolExhausted {
                        host: host.to_string(),
                        waited: timeout,
                    }
                })?
        };
        acquired.map_err(|_| Error::PoolClosed)
    }

    /// Remove idle connections older than `connection_max_idle`.
    ///
    /// Returns the number of evicted connections. A zero idle timeout keeps
    /// every connection.
    pub fn evict_idle(&self) -> usize {
        let max_idle = self.inner.policy.connection_max_idle;
        if max_idle.is_zero() {
            return 0;
        }

        let now = Instant::now();
        let mut evicted = 0;
        let mut hosts = self.inner.hosts();
        for (host, slots) in hosts.iter_mut() {
            let before = slots.idle.len();
            slots
                .idle
                .retain(|conn| now.saturating_duration_since(conn.idle_since) < max_idle);
            let removed = before - slots.idle.len();
            if removed > 0 {
                debug!(host, removed, "evicted idle connections");
            }
            evicted += removed;
        }
        hosts.retain(|_, slots| !slots.is_unused());
        evicted
    }

    /// Start the periodic idle sweep.
    ///
    /// Returns `None` when idle eviction is disabled. The task holds a weak
    /// reference and stops once the pool is closed or dropped.
    pub fn spawn_idle_sweeper(&self, runtime: &tokio::runtime::Handle) -> Option<JoinHandle<()>> {
        let max_idle = self.inner.policy.connection_max_idle;
        if max_idle.is_zero() {
            return None;
        }
        let period = (max_idle / 2).max(MIN_SWEEP_PERIOD);
        let pool = Arc::downgrade(&self.inner);

        Some(runtime.spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(inner) = Weak::upgrade(&pool) else {
                    break;
                };
                if inner.closed.load(Ordering::Acquire) {
                    break;
                }
                ConnectionPool { inner }.evict_idle();
            }
        }))
    }

    /// Close the pool: waiters and later acquisitions fail with
    /// [`Error::PoolClosed`], idle connections are dropped. Idempotent.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let mut hosts = self.inner.hosts();
        for slots in hosts.values_mut() {
            if let Some(permits) = &slots.permits {
                permits.close();
            }
            slots.idle.clear();
        }
        debug!("connection pool closed");
    }

    /// Returns `true` once [`ConnectionPool::close`] has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Current pool content.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        let hosts = self.inner.hosts();
        hosts.values().fold(
            PoolStats {
                hosts: hosts.len(),
                ..PoolStats::default()
            },
            |stats, slots| PoolStats {
                active: stats.active + slots.active,
                idle: stats.idle + slots.idle.len(),
                ..stats
            },
        )
    }
}

/// A leased connection slot; returned to the pool on drop.
pub struct PooledConnection {
    id: u64,
    host: String,
    reused: bool,
    pool: Arc<PoolInner>,
    _permit: Option<OwnedSemaphorePermit>,
}

impl std::fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("id", &self.id)
            .field("host", &self.host)
            .field("reused", &self.reused)
            .finish_non_exhaustive()
    }
}

impl PooledConnection {
    /// Connection identifier, stable across reuse.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Pool key of the target host.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Returns `true` if this connection came from the idle list.
    #[must_use]
    pub const fn is_reused(&self) -> bool {
        self.reused
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        self.pool.release(&self.host, self.id);
    }
}
