//! Distributed deployment semaphore.
//!
//! A single lock record stored in a cluster config object serializes every
//! registry-mutating operation of an environment. Claims are made with a
//! versioned write, so of two operators racing for a free lock exactly one
//! write lands and the other observes a conflict.
//!
//! There is no expiry. A stuck holder is cleared by an operator passing
//! `force_reset`.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::domain::id::HolderToken;
use crate::domain::lock::LockRecord;
use crate::error::{Error, Result};
use crate::port::{ClusterGateway, Precondition, Sleeper};

/// How long and how often to retry a held lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Fixed delay between attempts.
    pub interval: Duration,
    /// Give up after this many failed attempts; `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            max_attempts: None,
        }
    }
}

/// Mutual exclusion across separate invocations, held in the cluster.
pub struct DistributedSemaphore {
    cluster: Arc<dyn ClusterGateway>,
    document: String,
    token: HolderToken,
}

impl DistributedSemaphore {
    /// Create a semaphore over the lock document `document` with a fresh
    /// holder token.
    pub fn new(cluster: Arc<dyn ClusterGateway>, document: impl Into<String>) -> Self {
        Self::with_token(cluster, document, HolderToken::generate())
    }

    pub fn with_token(
        cluster: Arc<dyn ClusterGateway>,
        document: impl Into<String>,
        token: HolderToken,
    ) -> Self {
        Self {
            cluster,
            document: document.into(),
            token,
        }
    }

    #[must_use]
    pub fn token(&self) -> &HolderToken {
        &self.token
    }

    /// Try once to claim the lock. Never blocks on a holder.
    ///
    /// Returns `Ok(false)` when another holder has it, or when a concurrent
    /// claim won the race. With `force_reset` the record is cleared and
    /// claimed unconditionally, so the call always succeeds.
    pub async fn acquire(&self, force_reset: bool) -> Result<bool> {
        if force_reset {
            warn!(lock = %self.document, "Force-resetting deployment lock");
            self.write(&LockRecord::cleared(), Precondition::Any).await?;
            self.write(&self.claim(), Precondition::Any).await?;
            info!(lock = %self.document, holder = %self.token, "Deployment lock acquired");
            return Ok(true);
        }

        let current = self.cluster.read_document(&self.document).await?;
        let precondition = Precondition::from_read(current.as_ref());
        let record = current
            .map(|doc| LockRecord::from_data(&doc.data))
            .unwrap_or_default();

        if record.held {
            debug!(
                lock = %self.document,
                holder = record.holder.as_deref().unwrap_or("unknown"),
                since = ?record.acquired_at,
                "Deployment lock is held"
            );
            return Ok(false);
        }

        match self.write(&self.claim(), precondition).await {
            Ok(()) => {
                info!(lock = %self.document, holder = %self.token, "Deployment lock acquired");
                Ok(true)
            }
            Err(e) if e.is_conflict() => {
                debug!(lock = %self.document, "Lost race for deployment lock");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Clear the lock unconditionally.
    pub async fn release(&self) -> Result<()> {
        self.write(&LockRecord::cleared(), Precondition::Any).await?;
        info!(lock = %self.document, holder = %self.token, "Deployment lock released");
        Ok(())
    }

    /// Acquire, sleeping `policy.interval` between failed attempts.
    ///
    /// `force_reset` applies to the first attempt only.
    pub async fn acquire_with_retry(
        &self,
        force_reset: bool,
        policy: &RetryPolicy,
        sleeper: &dyn Sleeper,
    ) -> Result<()> {
        let mut attempts = 0u32;
        loop {
            if self.acquire(force_reset && attempts == 0).await? {
                return Ok(());
            }
            attempts += 1;
            if policy.max_attempts.is_some_and(|max| attempts >= max) {
                return Err(Error::LockNotAcquired { attempts });
            }
            warn!(
                attempt = attempts,
                retry_in_secs = policy.interval.as_secs(),
                "Another deployment is in progress. Use --reset-lock to force a reset of the deployment lock"
            );
            sleeper.sleep(policy.interval).await;
        }
    }

    fn claim(&self) -> LockRecord {
        LockRecord::claimed(&self.token, Utc::now())
    }

    async fn write(&self, record: &LockRecord, precondition: Precondition) -> Result<()> {
        self.cluster
            .write_document(&self.document, record.to_data(), precondition)
            .await
    }
}
