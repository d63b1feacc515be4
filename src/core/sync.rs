//! Worker lifecycle management
//!
//! [`SyncOrchestrator`] is the single entry point for tracking and
//! untracking firewalls. Tracking a new id starts its
//! [`ReconciliationWorker`]; untracking removes the id from the store and the
//! worker notices on its next tick and exits on its own.

use crate::audit::{self, AuditLog};
use crate::core::error::Result;
use crate::core::firewall::{FirewallId, FirewallRuleSet, Generation};
use crate::core::gateway::FirewallProvider;
use crate::core::store::{RuleStore, Tracked};
use crate::core::worker::{DEFAULT_POLL_INTERVAL, ReconciliationWorker};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info};

pub struct SyncOrchestrator {
    store: Arc<RuleStore>,
    provider: Arc<dyn FirewallProvider>,
    poll_interval: Duration,
    audit: Option<Arc<AuditLog>>,
    workers: Mutex<HashMap<(FirewallId, Generation), JoinHandle<()>>>,
}

impl SyncOrchestrator {
    pub fn new(store: Arc<RuleStore>, provider: Arc<dyn FirewallProvider>) -> Self {
        Self {
            store,
            provider,
            poll_interval: DEFAULT_POLL_INTERVAL,
            audit: None,
            workers: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_audit(mut self, audit: AuditLog) -> Self {
        self.audit = Some(Arc::new(audit));
        self
    }

    pub fn store(&self) -> &Arc<RuleStore> {
        &self.store
    }

    /// Tracks `id` with `rules`, starting a worker if the id is new.
    ///
    /// Returns whether the id was newly tracked. Must be called from within
    /// a Tokio runtime.
    pub fn track(&self, id: FirewallId, rules: FirewallRuleSet) -> bool {
        match self.store.track(id, rules) {
            Tracked::New(generation) => {
                self.spawn_worker(id, generation);
                true
            }
            Tracked::Refreshed(_) => false,
        }
    }

    fn spawn_worker(&self, id: FirewallId, generation: Generation) {
        let worker = ReconciliationWorker::new(
            id,
            generation,
            Arc::clone(&self.store),
            Arc::clone(&self.provider),
            self.poll_interval,
        )
        .with_audit(self.audit.clone());

        let handle = tokio::spawn(worker.run());

        let mut workers = self.workers.lock().unwrap_or_else(PoisonError::into_inner);
        workers.retain(|_, handle| !handle.is_finished());
        workers.insert((id, generation), handle);
    }

    /// Number of worker tasks that have not exited yet
    pub fn active_workers(&self) -> usize {
        let workers = self.workers.lock().unwrap_or_else(PoisonError::into_inner);
        workers.values().filter(|handle| !handle.is_finished()).count()
    }

    /// Fetches the full inventory and tracks every firewall in it.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the inventory cannot be fetched; nothing is tracked
    /// in that case.
    pub async fn bootstrap(&self) -> Result<usize> {
        let firewalls = self.provider.fetch_all().await?;
        let count = firewalls.len();

        for (id, rules) in firewalls {
            let newly_tracked = self.track(id, rules);
            audit::log_track(self.audit.as_deref(), id, newly_tracked, None).await;
        }

        info!(count, "Tracking firewall inventory");
        Ok(count)
    }

    /// Fetches one firewall and tracks it (or refreshes it if tracked).
    ///
    /// # Errors
    ///
    /// Returns `Err` if the fetch fails; an existing entry is left as it was.
    pub async fn fetch_and_track(&self, id: FirewallId) -> Result<bool> {
        match self.provider.fetch_one(id).await {
            Ok(rules) => {
                let newly_tracked = self.track(id, rules);
                info!(firewall = id, newly_tracked, "Firewall tracked");
                audit::log_track(self.audit.as_deref(), id, newly_tracked, None).await;
                Ok(newly_tracked)
            }
            Err(e) => {
                error!(firewall = id, error = %e, "Fetch failed, keeping previous state");
                audit::log_track(self.audit.as_deref(), id, false, Some(e.to_string())).await;
                Err(e)
            }
        }
    }

    /// Stops tracking `id`. Its worker exits within one poll interval.
    pub async fn untrack(&self, id: FirewallId) -> bool {
        let was_tracked = self.store.untrack(id);
        if was_tracked {
            info!(firewall = id, "Firewall untracked");
        }
        audit::log_untrack(self.audit.as_deref(), id, was_tracked).await;
        was_tracked
    }

    /// Untracks everything and waits for all workers to exit.
    pub async fn shutdown(&self) {
        for id in self.store.tracked_ids() {
            self.store.untrack(id);
        }

        let handles: Vec<_> = {
            let mut workers = self.workers.lock().unwrap_or_else(PoisonError::into_inner);
            workers.drain().map(|(_, handle)| handle).collect()
        };
        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "Worker task ended abnormally");
            }
        }
        info!("All workers stopped");
    }
}
