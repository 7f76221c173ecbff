use crate::error::Result;
use crate::registry::KvStore;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Name of the lease key in the KV store.
pub const LOCK_KEY: &str = "fs_master_lock";

/// How often the lease task ticks.
pub const LEASE_TICK: Duration = Duration::from_secs(2);

/// Lease TTL. A 2 s tick against a 5 s TTL tolerates one missed renewal.
pub const LEASE_TTL: Duration = Duration::from_secs(5);

/// Fenced leadership over a single KV key. At most one process observes
/// itself as leader at any instant, within the guarantees of the KV
/// primary. Handlers read the flag at request entry; losing the lease
/// mid-operation does not cancel the operation.
pub struct LeaderLease {
    kv: Arc<dyn KvStore>,
    master_id: String,
    is_leader: AtomicBool,
}

impl LeaderLease {
    pub fn new(kv: Arc<dyn KvStore>, master_id: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            kv,
            master_id: master_id.into(),
            is_leader: AtomicBool::new(false),
        })
    }

    pub fn master_id(&self) -> &str {
        &self.master_id
    }

    pub fn is_leader(&self) -> bool {
        self.is_leader.load(Ordering::SeqCst)
    }

    /// Returns `NotLeader` when this process does not hold the lease.
    pub fn require_leader(&self) -> Result<()> {
        if self.is_leader() {
            Ok(())
        } else {
            Err(crate::error::OrbioError::NotLeader)
        }
    }

    /// Spawn the periodic acquire/renew task.
    pub fn start(self: &Arc<Self>) {
        let lease = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(LEASE_TICK);
            loop {
                ticker.tick().await;
                lease.tick().await;
            }
        });
    }

    /// One acquire-or-renew step. Public so tests can drive the protocol
    /// without timers.
    pub async fn tick(&self) {
        if !self.is_leader() {
            match self.kv.set_if_absent(LOCK_KEY, &self.master_id, LEASE_TTL).await {
                Ok(true) => {
                    tracing::info!("acquired leadership as {}", self.master_id);
                    self.is_leader.store(true, Ordering::SeqCst);
                }
                Ok(false) => {}
                // Acquire failures are retried on the next tick.
                Err(error) => tracing::warn!("lease acquire attempt failed: {}", error),
            }
            return;
        }

        match self.kv.get(LOCK_KEY).await {
            Ok(Some(holder)) if holder == self.master_id => {
                match self.kv.expire(LOCK_KEY, LEASE_TTL).await {
                    Ok(true) => {}
                    Ok(false) => {
                        // Key vanished between the read and the refresh.
                        tracing::warn!("lease key expired before renewal, dropping leadership");
                        self.is_leader.store(false, Ordering::SeqCst);
                    }
                    Err(error) => {
                        tracing::warn!("lease renewal failed, dropping leadership: {}", error);
                        self.is_leader.store(false, Ordering::SeqCst);
                    }
                }
            }
            Ok(_) => {
                tracing::info!("lease held elsewhere, dropping leadership");
                self.is_leader.store(false, Ordering::SeqCst);
            }
            Err(error) => {
                tracing::warn!("lease read failed, dropping leadership: {}", error);
                self.is_leader.store(false, Ordering::SeqCst);
            }
        }
    }
}
