//! Periodic size-bounded eviction of cache artifacts.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use parking_lot::Mutex;
use tokio::fs;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::content_cache::ContentAddressedCache;
use super::leases::ArtifactLeases;
use crate::domain::entities::CachedArtifact;

/// Default cache budget (100 MiB).
pub const DEFAULT_BUDGET_BYTES: u64 = 100 * 1024 * 1024;

/// Default sweep interval (5 minutes).
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Sweeper settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweeperConfig {
    /// Maximum total artifact size.
    pub budget_bytes: u64,
    /// Time between sweeps.
    pub interval: Duration,
    /// Artifacts modified more recently than this are never evicted.
    pub min_age: Duration,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            budget_bytes: DEFAULT_BUDGET_BYTES,
            interval: DEFAULT_SWEEP_INTERVAL,
            min_age: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

/// Sweeper lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepState {
    /// Waiting for the next tick.
    Idle,
    /// Listing and sizing artifacts.
    Scanning,
    /// Deleting artifacts to get under budget.
    Evicting,
}

/// Outcome of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Artifacts found.
    pub scanned: usize,
    /// Total size before eviction.
    pub total_before: u64,
    /// Total size after eviction.
    pub total_after: u64,
    /// Deleted artifact paths, oldest first.
    pub evicted: Vec<PathBuf>,
    /// Bytes reclaimed.
    pub freed_bytes: u64,
    /// Eviction candidates kept because they were leased or too young.
    pub skipped: usize,
}

/// Deletes the oldest artifacts whenever the cache exceeds its budget.
#[derive(Debug)]
pub struct CacheEvictionSweeper {
    cache: Arc<ContentAddressedCache>,
    leases: ArtifactLeases,
    config: SweeperConfig,
    state: Mutex<SweepState>,
}

impl CacheEvictionSweeper {
    /// Creates a sweeper over `cache`, honoring `leases`.
    #[must_use]
    pub fn new(
        cache: Arc<ContentAddressedCache>,
        leases: ArtifactLeases,
        config: SweeperConfig,
    ) -> Self {
        Self {
            cache,
            leases,
            config,
            state: Mutex::new(SweepState::Idle),
        }
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> SweepState {
        *self.state.lock()
    }

    /// Returns the sweeper settings.
    #[must_use]
    pub const fn config(&self) -> &SweeperConfig {
        &self.config
    }

    /// Runs one scan and, if over budget, one eviction pass.
    ///
    /// # Errors
    /// Returns error if the cache directory cannot be listed.
    pub async fn sweep_once(&self) -> std::io::Result<SweepReport> {
        self.set_state(SweepState::Scanning);
        let result = self.scan_and_evict().await;
        self.set_state(SweepState::Idle);
        result
    }

    async fn scan_and_evict(&self) -> std::io::Result<SweepReport> {
        let entries = self.cache.entries().await?;
        let total_before: u64 = entries.iter().map(|a| a.size_bytes).sum();
        let scanned = entries.len();

        if total_before <= self.config.budget_bytes {
            debug!(
                total = total_before,
                budget = self.config.budget_bytes,
                scanned,
                "Cache within budget"
            );
            return Ok(SweepReport {
                scanned,
                total_before,
                total_after: total_before,
                ..SweepReport::default()
            });
        }

        debug!(
            total = total_before,
            budget = self.config.budget_bytes,
            "Cache over budget, evicting"
        );
        self.set_state(SweepState::Evicting);

        let now = SystemTime::now();
        let plan = plan_eviction(entries, self.config.budget_bytes, |artifact| {
            self.leases.is_leased(&artifact.path) || is_younger_than(artifact, now, self.config.min_age)
        });

        let mut report = SweepReport {
            scanned,
            total_before,
            skipped: plan.skipped,
            ..SweepReport::default()
        };

        for victim in plan.victims {
            match fs::remove_file(&victim.path).await {
                Ok(()) => {
                    debug!(path = %victim.path.display(), size = victim.size_bytes, "Evicted artifact");
                    report.freed_bytes += victim.size_bytes;
                    report.evicted.push(victim.path);
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    report.freed_bytes += victim.size_bytes;
                }
                Err(e) => {
                    warn!(path = %victim.path.display(), error = %e, "Failed to evict artifact");
                }
            }
        }

        report.total_after = total_before - report.freed_bytes;
        if report.total_after > self.config.budget_bytes {
            warn!(
                total = report.total_after,
                budget = self.config.budget_bytes,
                skipped = report.skipped,
                "Cache still over budget after sweep"
            );
        }

        info!(
            evicted = report.evicted.len(),
            freed_bytes = report.freed_bytes,
            total = report.total_after,
            "Cache sweep complete"
        );
        Ok(report)
    }

    /// Sweeps on every interval tick until `shutdown` flips to true or its
    /// sender is dropped. The first sweep runs immediately.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            interval_secs = self.config.interval.as_secs(),
            budget = self.config.budget_bytes,
            "Cache sweeper started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep_once().await {
                        warn!(error = %e, "Cache sweep failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Cache sweeper stopped");
    }

    /// Spawns [`run`](Self::run) on the current runtime.
    pub fn spawn(self: &Arc<Self>, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(Arc::clone(self).run(shutdown))
    }

    fn set_state(&self, state: SweepState) {
        *self.state.lock() = state;
    }
}

/// Artifacts chosen for deletion.
#[derive(Debug, Default)]
struct EvictionPlan {
    victims: Vec<CachedArtifact>,
    skipped: usize,
}

/// Picks the oldest unprotected artifacts until the remaining total fits the
/// budget. Protected artifacts still count toward the total.
fn plan_eviction(
    mut entries: Vec<CachedArtifact>,
    budget: u64,
    is_protected: impl Fn(&CachedArtifact) -> bool,
) -> EvictionPlan {
    let mut total: u64 = entries.iter().map(|a| a.size_bytes).sum();
    let mut plan = EvictionPlan::default();
    if total <= budget {
        return plan;
    }

    entries.sort_by(|a, b| a.modified.cmp(&b.modified).then_with(|| a.path.cmp(&b.path)));

    for artifact in entries {
        if total <= budget {
            break;
        }
        if is_protected(&artifact) {
            plan.skipped += 1;
            continue;
        }
        total -= artifact.size_bytes;
        plan.victims.push(artifact);
    }

    plan
}

fn is_younger_than(artifact: &CachedArtifact, now: SystemTime, min_age: Duration) -> bool {
    now.duration_since(artifact.modified)
        .map_or(true, |age| age < min_age)
}
