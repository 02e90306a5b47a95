//! Durable queue of requests that must eventually reach the server.

use crate::consent::ConsentGate;
use crate::error::{ClientError, ClientResult};
use crate::request::ApiRequest;
use crate::runner::ApiClient;
use crate::transport::Transport;
use parking_lot::Mutex;
use pushsync_storage::KeyValueStore;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, warn};

/// Storage key prefix of queued jobs.
pub const VAULT_KEY_PREFIX: &str = "vault/";

/// Retry policy of a [`RequestVault`].
#[derive(Debug, Clone, PartialEq)]
pub struct VaultConfig {
    /// Backoff after the first network failure is computed from this value.
    pub initial_backoff: Duration,
    /// Factor applied to the backoff on each network failure.
    pub backoff_multiplier: f64,
    /// Upper bound of the backoff.
    pub max_backoff: Duration,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_secs(10),
            backoff_multiplier: 1.5,
            max_backoff: Duration::from_secs(5 * 60),
        }
    }
}

impl VaultConfig {
    /// Sets the initial backoff.
    #[must_use]
    pub fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }

    /// Sets the backoff multiplier.
    #[must_use]
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Sets the maximum backoff.
    #[must_use]
    pub fn with_max_backoff(mut self, backoff: Duration) -> Self {
        self.max_backoff = backoff;
        self
    }

    fn next_backoff(&self, current: Duration) -> Duration {
        current.mul_f64(self.backoff_multiplier).min(self.max_backoff)
    }
}

/// A queue of requests, each not to be run before its due time.
pub trait RequestQueue: Send + Sync {
    /// Enqueues `request`, due after `delay`.
    ///
    /// # Errors
    ///
    /// Returns an error if the job cannot be persisted.
    fn put(&self, request: &ApiRequest, delay: Duration) -> ClientResult<()>;

    /// Time until the earliest job is due, zero if one is due already.
    fn next_due_in(&self) -> Option<Duration>;

    /// Removes and returns the earliest job if it is due.
    ///
    /// # Errors
    ///
    /// Returns an error if the removal cannot be persisted.
    fn take_due(&self) -> ClientResult<Option<ApiRequest>>;

    /// Number of queued jobs.
    fn len(&self) -> usize;

    /// Returns true if no job is queued.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug)]
struct QueuedJob {
    key: String,
    due: Instant,
    request: ApiRequest,
}

/// A [`RequestQueue`] persisted in a [`KeyValueStore`].
///
/// Each job is stored under [`VAULT_KEY_PREFIX`] as
/// `{"request": <request JSON>, "notBefore": <epoch ms>}`. Jobs are ordered by
/// due time, then by insertion.
pub struct StoredRequestQueue {
    store: Arc<dyn KeyValueStore>,
    jobs: Mutex<Vec<QueuedJob>>,
    next_seq: AtomicU64,
}

impl std::fmt::Debug for StoredRequestQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoredRequestQueue")
            .field("jobs", &self.jobs.lock().len())
            .finish_non_exhaustive()
    }
}

fn epoch_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
}

impl StoredRequestQueue {
    /// Opens the queue, loading jobs left by a previous run.
    ///
    /// Unreadable jobs are logged and removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be listed.
    pub fn open(store: Arc<dyn KeyValueStore>) -> ClientResult<Self> {
        let now = Instant::now();
        let now_ms = epoch_millis();
        let mut jobs = Vec::new();
        let mut max_seq = 0;

        for key in store.keys_with_prefix(VAULT_KEY_PREFIX)? {
            let seq = key
                .strip_prefix(VAULT_KEY_PREFIX)
                .and_then(|s| s.parse::<u64>().ok());
            let job = store
                .get(&key)?
                .and_then(|raw| serde_json::from_str::<Value>(&raw).ok())
                .and_then(|value| {
                    let request = ApiRequest::from_json(value.get("request")?).ok()?;
                    let not_before = value.get("notBefore").and_then(Value::as_i64).unwrap_or(0);
                    Some((request, not_before))
                });
            match (seq, job) {
                (Some(seq), Some((request, not_before))) => {
                    max_seq = max_seq.max(seq);
                    let wait = u64::try_from(not_before.saturating_sub(now_ms)).unwrap_or(0);
                    jobs.push(QueuedJob {
                        key,
                        due: now + Duration::from_millis(wait),
                        request,
                    });
                }
                _ => {
                    error!(key = %key, "could not restore queued request, discarding");
                    store.remove(&key)?;
                }
            }
        }

        jobs.sort_by_key(|job| job.due);
        debug!(jobs = jobs.len(), "opened request queue");
        Ok(Self {
            store,
            jobs: Mutex::new(jobs),
            next_seq: AtomicU64::new(max_seq + 1),
        })
    }
}

impl RequestQueue for StoredRequestQueue {
    fn put(&self, request: &ApiRequest, delay: Duration) -> ClientResult<()> {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        let key = format!("{VAULT_KEY_PREFIX}{seq:020}");
        let delay_ms = i64::try_from(delay.as_millis()).unwrap_or(i64::MAX);
        let raw = json!({
            "request": request.to_json(),
            "notBefore": epoch_millis().saturating_add(delay_ms),
        })
        .to_string();
        self.store.put(&key, &raw)?;

        let due = Instant::now() + delay;
        let mut jobs = self.jobs.lock();
        let at = jobs.partition_point(|job| job.due <= due);
        jobs.insert(
            at,
            QueuedJob {
                key,
                due,
                request: request.clone(),
            },
        );
        Ok(())
    }

    fn next_due_in(&self) -> Option<Duration> {
        let jobs = self.jobs.lock();
        jobs.first()
            .map(|job| job.due.saturating_duration_since(Instant::now()))
    }

    fn take_due(&self) -> ClientResult<Option<ApiRequest>> {
        let job = {
            let mut jobs = self.jobs.lock();
            match jobs.first() {
                Some(job) if job.due <= Instant::now() => jobs.remove(0),
                _ => return Ok(None),
            }
        };
        self.store.remove(&job.key)?;
        Ok(Some(job.request))
    }

    fn len(&self) -> usize {
        self.jobs.lock().len()
    }
}

/// Outcome of [`RequestVault::execute_next`].
#[derive(Debug, Clone)]
pub enum VaultStep {
    /// No job is due.
    Idle,
    /// Consent is withheld; nothing was run.
    AwaitingConsent,
    /// The job was delivered.
    Delivered,
    /// The job hit a network failure and was queued again after the delay.
    Requeued(Duration),
    /// The job failed for good and was dropped.
    Discarded(ClientError),
}

/// Runs queued requests until each one is delivered or fails for good.
///
/// Network failures put the request back with exponential backoff. Any
/// other failure drops it. Nothing runs while consent is withheld.
pub struct RequestVault<T: Transport> {
    client: ApiClient<T>,
    queue: Arc<dyn RequestQueue>,
    consent: ConsentGate,
    config: VaultConfig,
    backoff: Mutex<Duration>,
    wake: Notify,
}

impl<T: Transport> std::fmt::Debug for RequestVault<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestVault")
            .field("queued", &self.queue.len())
            .field("backoff", &*self.backoff.lock())
            .finish_non_exhaustive()
    }
}

impl<T: Transport> RequestVault<T> {
    /// Creates a vault.
    pub fn new(
        client: ApiClient<T>,
        queue: Arc<dyn RequestQueue>,
        consent: ConsentGate,
        config: VaultConfig,
    ) -> Self {
        let backoff = Mutex::new(config.initial_backoff);
        Self {
            client,
            queue,
            consent,
            config,
            backoff,
            wake: Notify::new(),
        }
    }

    /// Queues `request` to run after `delay` and wakes the worker.
    ///
    /// # Errors
    ///
    /// Returns an error if the job cannot be persisted.
    pub fn put(&self, request: &ApiRequest, delay: Duration) -> ClientResult<()> {
        self.queue.put(request, delay)?;
        debug!(resource = %request.resource, ?delay, "queued request");
        self.wake.notify_one();
        Ok(())
    }

    /// Number of queued jobs.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Returns true if no job is queued.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Delay that the next network failure will be answered with, before
    /// growth.
    pub fn current_backoff(&self) -> Duration {
        *self.backoff.lock()
    }

    /// Runs the earliest job if it is due.
    ///
    /// # Errors
    ///
    /// Returns an error only if the queue cannot be persisted.
    pub async fn execute_next(&self) -> ClientResult<VaultStep> {
        if !self.consent.is_granted() {
            return Ok(VaultStep::AwaitingConsent);
        }
        let Some(request) = self.queue.take_due()? else {
            return Ok(VaultStep::Idle);
        };

        match self.client.execute(request.clone()).await {
            Ok(_) => {
                debug!(resource = %request.resource, "queued request delivered");
                *self.backoff.lock() = self.config.initial_backoff;
                Ok(VaultStep::Delivered)
            }
            Err(e) if e.is_retryable() => {
                let delay = {
                    let mut backoff = self.backoff.lock();
                    *backoff = self.config.next_backoff(*backoff);
                    *backoff
                };
                warn!(resource = %request.resource, error = %e, ?delay, "queued request failed, reposting");
                self.queue.put(&request, delay)?;
                Ok(VaultStep::Requeued(delay))
            }
            Err(e) => {
                warn!(resource = %request.resource, error = %e, "queued request failed, discarding");
                Ok(VaultStep::Discarded(e))
            }
        }
    }

    /// Runs jobs forever.
    pub async fn run(&self) {
        loop {
            if !self.consent.is_granted() {
                debug!("request vault waiting for consent");
                self.consent.wait_granted().await;
                continue;
            }

            match self.queue.next_due_in() {
                None => {
                    debug!("request vault waiting for next job");
                    self.wake.notified().await;
                    continue;
                }
                Some(wait) if !wait.is_zero() => {
                    debug!(?wait, "request vault sleeping");
                    tokio::select! {
                        () = tokio::time::sleep(wait) => {}
                        () = self.wake.notified() => {}
                    }
                    continue;
                }
                Some(_) => {}
            }

            if let Err(e) = self.execute_next().await {
                error!(error = %e, "request vault could not update its queue");
                tokio::time::sleep(self.config.initial_backoff).await;
            }
        }
    }

    /// Spawns [`RequestVault::run`] on the current runtime.
    pub fn spawn(self: &Arc<Self>) -> JoinHandle<()> {
        let vault = Arc::clone(self);
        tokio::spawn(async move { vault.run().await })
    }
}
