use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::range::WorkUnit;
use super::UnitError;
use crate::error::ProviderError;

/// Slack given to a unit past its deadline so it can tidy up (stop a running
/// query) before the pool drops it.
const STOP_GRACE: Duration = Duration::from_secs(5);

/// What a worker knows about its own unit.
#[derive(Debug, Clone)]
pub struct UnitContext {
    pub unit: WorkUnit,
    /// Instant at which the unit must give up, if any.
    pub deadline: Option<Instant>,
    unit_timeout: Option<Duration>,
    run_bound: bool,
}

impl UnitContext {
    /// A context for a unit run outside any pool, held only to its own
    /// timeout from now.
    pub fn standalone(unit: WorkUnit, unit_timeout: Option<Duration>) -> Self {
        Self {
            unit,
            deadline: unit_timeout.map(|t| Instant::now() + t),
            unit_timeout,
            run_bound: false,
        }
    }

    /// The error a unit reports when its deadline passes.
    pub fn deadline_error(&self, operation: &str) -> ProviderError {
        match (self.run_bound, self.unit_timeout) {
            (false, Some(timeout)) => ProviderError::timeout(operation, timeout),
            _ => ProviderError::cancelled(operation),
        }
    }

    /// Whether the unit's deadline has already passed.
    pub fn expired(&self) -> bool {
        self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }

    /// Run `fut`, giving up with the deadline error once the unit's deadline
    /// passes.
    pub async fn bound<T, E, F>(&self, operation: &str, fut: F) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
        E: From<ProviderError>,
    {
        match self.deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, fut)
                .await
                .unwrap_or_else(|_| Err(self.deadline_error(operation).into())),
            None => fut.await,
        }
    }
}

#[derive(Debug)]
pub enum UnitResult<T> {
    Done(T),
    Failed(UnitError),
    NotStarted,
}

/// Bounded worker pool shared by every phase of one run.
///
/// At most `concurrency` units execute at once. Once the run deadline passes
/// no further unit starts; units already running are held to a deadline no
/// later than the run's.
pub struct Pool {
    semaphore: Arc<Semaphore>,
    unit_timeout: Option<Duration>,
    run_deadline: Option<Instant>,
    cancel: CancellationToken,
    watchdog: Option<JoinHandle<()>>,
}

impl Pool {
    pub fn new(concurrency: usize, unit_timeout: Option<Duration>, run_timeout: Option<Duration>) -> Self {
        let cancel = CancellationToken::new();
        let run_deadline = run_timeout.map(|t| Instant::now() + t);
        let watchdog = run_deadline.map(|deadline| {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep_until(deadline).await;
                debug!("Run deadline reached, no further units will start");
                cancel.cancel();
            })
        });

        Self {
            semaphore: Arc::new(Semaphore::new(concurrency.max(1))),
            unit_timeout,
            run_deadline,
            cancel,
            watchdog,
        }
    }

    pub fn deadline_expired(&self) -> bool {
        self.cancel.is_cancelled() || self.run_deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Run `work` for every unit and collect one result per unit, in
    /// completion order.
    pub async fn run<T, F, Fut>(&self, units: Vec<WorkUnit>, work: F) -> Vec<(WorkUnit, UnitResult<T>)>
    where
        T: Send + 'static,
        F: Fn(UnitContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, UnitError>> + Send + 'static,
    {
        let work = Arc::new(work);
        let mut pending: Vec<WorkUnit> = Vec::with_capacity(units.len());
        let mut join_set = JoinSet::new();

        for unit in units {
            pending.push(unit.clone());
            let work = Arc::clone(&work);
            let semaphore = Arc::clone(&self.semaphore);
            let cancel = self.cancel.clone();
            let unit_timeout = self.unit_timeout;
            let run_deadline = self.run_deadline;

            join_set.spawn(async move {
                let permit = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    permit = semaphore.acquire_owned() => permit.ok(),
                };
                let past_deadline = run_deadline.is_some_and(|d| Instant::now() >= d);
                let _permit = match permit {
                    Some(permit) if !cancel.is_cancelled() && !past_deadline => permit,
                    _ => return (unit, UnitResult::NotStarted),
                };

                let own_deadline = unit_timeout.map(|t| Instant::now() + t);
                let (deadline, run_bound) = match (own_deadline, run_deadline) {
                    (Some(own), Some(run)) if run < own => (Some(run), true),
                    (Some(own), _) => (Some(own), false),
                    (None, Some(run)) => (Some(run), true),
                    (None, None) => (None, false),
                };
                let ctx = UnitContext {
                    unit: unit.clone(),
                    deadline,
                    unit_timeout,
                    run_bound,
                };

                let fut = work(ctx.clone());
                let result = match deadline {
                    Some(deadline) => {
                        match tokio::time::timeout_at(deadline + STOP_GRACE, fut).await {
                            Ok(result) => result,
                            Err(_) => Err(UnitError::Provider(
                                ctx.deadline_error(&format!("unit {}", unit.index)),
                            )),
                        }
                    }
                    None => fut.await,
                };

                match result {
                    Ok(value) => (unit, UnitResult::Done(value)),
                    Err(e) => (unit, UnitResult::Failed(e)),
                }
            });
        }

        let mut results = Vec::with_capacity(pending.len());
        let mut reported = HashSet::with_capacity(pending.len());
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((unit, result)) => {
                    reported.insert(unit.index);
                    results.push((unit, result));
                }
                Err(e) => warn!(error = %e, "Worker task panicked"),
            }
        }

        for unit in pending {
            if !reported.contains(&unit.index) {
                results.push((unit, UnitResult::Failed(UnitError::Worker("task panicked".to_string()))));
            }
        }

        results
    }
}

impl Drop for Pool {
    fn drop(&mut self) {
        if let Some(watchdog) = self.watchdog.take() {
            watchdog.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::range::{chunked_units, TimeRange};
    use chrono::{TimeZone, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn units(n: usize) -> Vec<WorkUnit> {
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let range = TimeRange::new(start, start + chrono::Duration::hours(n as i64)).unwrap();
        chunked_units(&range, Duration::from_secs(3600)).unwrap()
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let pool = Pool::new(3, None, None);
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let (a, p) = (Arc::clone(&active), Arc::clone(&peak));
        let results = pool
            .run(units(12), move |ctx| {
                let (active, peak) = (Arc::clone(&a), Arc::clone(&p));
                async move {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                    Ok(ctx.unit.index)
                }
            })
            .await;

        assert_eq!(results.len(), 12);
        assert!(peak.load(Ordering::SeqCst) <= 3);
        let mut done: Vec<usize> = results
            .into_iter()
            .filter_map(|(_, r)| match r {
                UnitResult::Done(i) => Some(i),
                _ => None,
            })
            .collect();
        done.sort();
        assert_eq!(done, (0..12).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_failure_does_not_abort_siblings() {
        let pool = Pool::new(2, None, None);
        let results = pool
            .run(units(5), |ctx| async move {
                if ctx.unit.index == 2 {
                    Err(UnitError::Worker("boom".to_string()))
                } else {
                    Ok(())
                }
            })
            .await;

        let failed = results
            .iter()
            .filter(|(_, r)| matches!(r, UnitResult::Failed(_)))
            .count();
        let done = results
            .iter()
            .filter(|(_, r)| matches!(r, UnitResult::Done(_)))
            .count();
        assert_eq!((failed, done), (1, 4));
    }

    #[tokio::test]
    async fn test_unit_timeout_fails_unit() {
        let pool = Pool::new(1, Some(Duration::from_millis(50)), None);
        let results = pool
            .run(units(1), |ctx| async move {
                // Honors its own deadline like a polling worker would
                if let Some(deadline) = ctx.deadline {
                    tokio::time::sleep_until(deadline).await;
                }
                Err::<(), _>(UnitError::Provider(ctx.deadline_error("poll")))
            })
            .await;

        match &results[0].1 {
            UnitResult::Failed(UnitError::Provider(e)) => {
                assert_eq!(e.kind, crate::error::ProviderErrorKind::Timeout)
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_run_deadline_stops_new_units() {
        let pool = Pool::new(1, None, Some(Duration::from_millis(60)));
        let results = pool
            .run(units(4), |ctx| async move {
                if let Some(deadline) = ctx.deadline {
                    tokio::time::sleep_until(deadline).await;
                }
                Err::<(), _>(UnitError::Provider(ctx.deadline_error("poll")))
            })
            .await;

        assert!(pool.deadline_expired());
        let not_started = results
            .iter()
            .filter(|(_, r)| matches!(r, UnitResult::NotStarted))
            .count();
        assert_eq!(not_started, 3);
        assert!(results.iter().any(|(_, r)| matches!(
            r,
            UnitResult::Failed(UnitError::Provider(e)) if e.kind == crate::error::ProviderErrorKind::Cancelled
        )));
    }

    #[tokio::test]
    async fn test_bound_gives_up_at_unit_timeout() {
        let unit = units(1).remove(0);
        let ctx = UnitContext::standalone(unit, Some(Duration::from_millis(30)));

        let hung = ctx
            .bound("list", futures::future::pending::<Result<(), UnitError>>())
            .await;
        assert_eq!(hung.unwrap_err().kind(), Some(crate::error::ProviderErrorKind::Timeout));
        assert!(ctx.expired());

        let unbounded = UnitContext::standalone(units(1).remove(0), None);
        assert!(!unbounded.expired());
        assert_eq!(unbounded.bound("get", async { Ok::<_, ProviderError>(7) }).await.unwrap(), 7);
    }
}
