/// Periodic maintenance loop
///
/// Runs every registered [`MaintenanceTask`] in order, sleeps for the sweep
/// interval and repeats until the shutdown token is cancelled. A sweep in
/// progress is allowed to finish; cancellation is only observed between
/// tasks and while waiting.
///
/// # Example
///
/// ```no_run
/// use mockmate_worker::{config::WorkerConfig, sweeper::Sweeper, tasks::default_tasks};
/// use sqlx::PgPool;
///
/// # async fn example(pool: PgPool) -> anyhow::Result<()> {
/// let config = WorkerConfig::from_env()?;
/// let sweeper = Sweeper::new(pool, default_tasks(&config), config.sweep_interval());
///
/// let shutdown = sweeper.shutdown_token();
/// tokio::spawn(async move {
///     let _ = tokio::signal::ctrl_c().await;
///     shutdown.cancel();
/// });
///
/// sweeper.run().await;
/// # Ok(())
/// # }
/// ```

use crate::tasks::MaintenanceTask;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Outcome of one task within a sweep
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Done { task: &'static str, affected: u64 },
    Failed { task: &'static str, error: String },
}

#[derive(Debug, Clone, Default)]
pub struct SweepReport {
    pub outcomes: Vec<TaskOutcome>,
    pub elapsed: Duration,
}

impl SweepReport {
    pub fn affected(&self) -> u64 {
        self.outcomes
            .iter()
            .map(|o| match o {
                TaskOutcome::Done { affected, .. } => *affected,
                TaskOutcome::Failed { .. } => 0,
            })
            .sum()
    }

    pub fn failures(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, TaskOutcome::Failed { .. }))
            .count()
    }
}

pub struct Sweeper {
    db: PgPool,
    tasks: Vec<Arc<dyn MaintenanceTask>>,
    interval: Duration,
    shutdown_token: CancellationToken,
}

impl Sweeper {
    pub fn new(db: PgPool, tasks: Vec<Arc<dyn MaintenanceTask>>, interval: Duration) -> Self {
        Sweeper {
            db,
            tasks,
            interval,
            shutdown_token: CancellationToken::new(),
        }
    }

    /// Used to signal graceful shutdown from external handlers
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    /// Runs every task once
    pub async fn sweep(&self) -> SweepReport {
        let started = Instant::now();
        let mut report = SweepReport::default();

        for task in &self.tasks {
            if self.shutdown_token.is_cancelled() {
                break;
            }

            let outcome = match task.run(&self.db).await {
                Ok(affected) => {
                    if affected > 0 {
                        tracing::info!(task = task.name(), affected, "Maintenance task applied");
                    } else {
                        tracing::debug!(task = task.name(), "Maintenance task found nothing to do");
                    }
                    TaskOutcome::Done {
                        task: task.name(),
                        affected,
                    }
                }
                Err(e) => {
                    tracing::error!(task = task.name(), error = %e, "Maintenance task failed");
                    TaskOutcome::Failed {
                        task: task.name(),
                        error: e.to_string(),
                    }
                }
            };
            report.outcomes.push(outcome);
        }

        report.elapsed = started.elapsed();
        report
    }

    /// Sweeps until shutdown, starting immediately
    pub async fn run(&self) {
        tracing::info!(
            tasks = self.tasks.len(),
            interval_secs = self.interval.as_secs(),
            "Sweeper starting"
        );

        loop {
            let report = self.sweep().await;
            tracing::info!(
                affected = report.affected(),
                failures = report.failures(),
                elapsed_ms = report.elapsed.as_millis() as u64,
                "Sweep finished"
            );

            tokio::select! {
                _ = self.shutdown_token.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        tracing::info!("Sweeper shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        name: &'static str,
        runs: Arc<AtomicUsize>,
        affected: u64,
    }

    #[async_trait]
    impl MaintenanceTask for Counting {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn run(&self, _pool: &PgPool) -> Result<u64, sqlx::Error> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            Ok(self.affected)
        }
    }

    struct Broken;

    #[async_trait]
    impl MaintenanceTask for Broken {
        fn name(&self) -> &'static str {
            "broken"
        }

        async fn run(&self, _pool: &PgPool) -> Result<u64, sqlx::Error> {
            Err(sqlx::Error::PoolTimedOut)
        }
    }

    fn lazy_pool() -> PgPool {
        PgPool::connect_lazy("postgres://localhost/unused").unwrap()
    }

    fn counting(name: &'static str, affected: u64) -> (Arc<dyn MaintenanceTask>, Arc<AtomicUsize>) {
        let runs = Arc::new(AtomicUsize::new(0));
        let task = Arc::new(Counting {
            name,
            runs: runs.clone(),
            affected,
        });
        (task, runs)
    }

    #[tokio::test]
    async fn test_failure_does_not_stop_the_sweep() {
        let (first, first_runs) = counting("first", 3);
        let (last, last_runs) = counting("last", 2);
        let sweeper = Sweeper::new(lazy_pool(), vec![first, Arc::new(Broken), last], Duration::from_secs(60));

        let report = sweeper.sweep().await;

        assert_eq!(first_runs.load(Ordering::SeqCst), 1);
        assert_eq!(last_runs.load(Ordering::SeqCst), 1);
        assert_eq!(report.affected(), 5);
        assert_eq!(report.failures(), 1);
        assert!(matches!(report.outcomes[1], TaskOutcome::Failed { task: "broken", .. }));
    }

    #[tokio::test]
    async fn test_cancelled_sweeper_skips_tasks() {
        let (task, runs) = counting("only", 1);
        let sweeper = Sweeper::new(lazy_pool(), vec![task], Duration::from_secs(60));
        sweeper.shutdown_token().cancel();

        let report = sweeper.sweep().await;

        assert!(report.outcomes.is_empty());
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_repeats_until_shutdown() {
        let (task, runs) = counting("tick", 0);
        let sweeper = Arc::new(Sweeper::new(lazy_pool(), vec![task], Duration::from_secs(10)));
        let shutdown = sweeper.shutdown_token();

        let handle = tokio::spawn({
            let sweeper = sweeper.clone();
            async move { sweeper.run().await }
        });

        tokio::time::sleep(Duration::from_secs(25)).await;
        shutdown.cancel();
        handle.await.unwrap();

        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }
}
