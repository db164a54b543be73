//! Planner: serializes requirement construction and offer evaluation per
//! pod instance.
//!
//! Requirements for different pod instances may be built concurrently.
//! Two builds for the same pod instance never overlap, so a relaunch never
//! reads persisted state that a concurrent launch of the same instance is
//! about to replace.

use std::collections::HashMap;
use std::sync::Arc;

use keel_core::{Offer, PodInstanceRequirement};
use keel_offer::{EvaluationReport, OfferEvaluator, OfferRequirement};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::{debug, info};

use crate::error::SchedulerResult;
use crate::provider::OfferRequirementProvider;

/// One async lock per pod instance name, created on first use.
///
/// An entry nobody holds or waits on is dropped the next time any lock is
/// taken, so the map only grows with the number of busy pod instances.
#[derive(Debug, Default)]
pub struct PodInstanceLocks {
    locks: RwLock<HashMap<String, Arc<Mutex<()>>>>,
}

impl PodInstanceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to a pod instance.
    pub async fn lock(&self, pod_instance: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.write().await;
            // Only the map references an idle entry.
            locks.retain(|name, lock| name == pod_instance || Arc::strong_count(lock) > 1);
            locks.entry(pod_instance.to_string()).or_default().clone()
        };
        lock.lock_owned().await
    }

    /// Number of pod instances currently tracked.
    pub async fn len(&self) -> usize {
        self.locks.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.locks.read().await.is_empty()
    }
}

/// Builds requirements through a provider and matches them against offers.
pub struct Planner<P> {
    provider: P,
    evaluator: OfferEvaluator,
    locks: PodInstanceLocks,
}

impl<P: OfferRequirementProvider> Planner<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            evaluator: OfferEvaluator::new(),
            locks: PodInstanceLocks::new(),
        }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Build the requirement for a pod instance while holding its lock.
    ///
    /// `existing` selects the relaunch path, which reuses the reservations
    /// of persisted tasks.
    pub async fn requirement(
        &self,
        requirement: &PodInstanceRequirement,
        existing: bool,
    ) -> SchedulerResult<OfferRequirement> {
        let pod_instance = requirement.pod_instance.name();
        let _guard = self.locks.lock(&pod_instance).await;
        debug!(pod = %pod_instance, existing, "pod instance locked");

        if existing {
            self.provider.existing_requirement(requirement)
        } else {
            self.provider.new_requirement(requirement)
        }
    }

    /// Build the requirement and find the first offer that satisfies it.
    pub async fn plan(
        &self,
        requirement: &PodInstanceRequirement,
        existing: bool,
        offers: &[Offer],
    ) -> SchedulerResult<EvaluationReport> {
        let pod_instance = requirement.pod_instance.name();
        let _guard = self.locks.lock(&pod_instance).await;

        let offer_requirement = if existing {
            self.provider.existing_requirement(requirement)?
        } else {
            self.provider.new_requirement(requirement)?
        };
        let report = self.evaluator.evaluate(&offer_requirement, offers);
        info!(
            pod = %pod_instance,
            offers = offers.len(),
            accepted = report.accepted.is_some(),
            operations = report.recommendations().len(),
            "plan finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn locks_are_created_per_pod_instance() {
        let locks = PodInstanceLocks::new();
        assert!(locks.is_empty().await);

        let a = locks.lock("web-0").await;
        let b = locks.lock("web-1").await;
        assert_eq!(locks.len().await, 2);
        drop(a);

        let _again = locks.lock("web-0").await;
        assert_eq!(locks.len().await, 2);
        drop(b);
    }

    #[tokio::test]
    async fn idle_locks_are_evicted() {
        let locks = PodInstanceLocks::new();
        for index in 0..16 {
            let _guard = locks.lock(&format!("web-{index}")).await;
        }
        assert_eq!(locks.len().await, 1);

        let held = locks.lock("db-0").await;
        let _other = locks.lock("db-1").await;
        assert_eq!(locks.len().await, 2);
        drop(held);
    }

    #[tokio::test]
    async fn same_pod_instance_is_serialized() {
        let locks = Arc::new(PodInstanceLocks::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let locks = Arc::clone(&locks);
            let inside = Arc::clone(&inside);
            let max_inside = Arc::clone(&max_inside);
            handles.push(tokio::spawn(async move {
                let _guard = locks.lock("web-0").await;
                let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                max_inside.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                inside.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn other_pod_instances_are_not_blocked() {
        let locks = PodInstanceLocks::new();
        let _held = locks.lock("web-0").await;

        let other = tokio::time::timeout(Duration::from_millis(100), locks.lock("web-1")).await;
        assert!(other.is_ok());
    }
}
