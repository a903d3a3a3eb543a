//! Randomized load driver.
//!
//! Draws operation requests from a catalog, spawns each onto its own task
//! with a random think-time between submissions, then joins them all. There
//! is no backpressure: a submission that finds the gate full simply waits.

use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tokio::task::JoinSet;
use tokio::time::Instant;

use crate::config::DriverConfig;
use crate::coordinator::Coordinator;
use crate::error::{ConfigError, Result};
use crate::request::{OperationKind, OperationRequest, Outcome};

/// One planned submission: the request and the pause that follows it.
#[derive(Debug, Clone)]
pub struct Submission {
    pub request: OperationRequest,
    pub think: Duration,
}

/// Tally of a finished run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub submitted: usize,
    pub completed: usize,
    pub not_found: usize,
    /// Operations that returned an error or whose task panicked.
    pub failed: usize,
    #[serde(serialize_with = "serialize_secs")]
    pub elapsed: Duration,
    pub peak_active: usize,
}

fn serialize_secs<S>(d: &Duration, s: S) -> std::result::Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    s.serialize_f64(d.as_secs_f64())
}

pub struct Driver {
    coordinator: Arc<Coordinator>,
    config: DriverConfig,
}

impl Driver {
    pub fn new(
        coordinator: Arc<Coordinator>,
        config: DriverConfig,
    ) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            coordinator,
            config,
        })
    }

    pub fn coordinator(&self) -> &Arc<Coordinator> {
        &self.coordinator
    }

    /// Draw the full submission sequence. Reproducible when a seed is set.
    pub fn plan(&self) -> Vec<Submission> {
        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let max_think_ms =
            u64::try_from(self.config.max_think_time.as_millis()).unwrap_or(u64::MAX);

        (0..self.config.operations)
            .map(|_| {
                let kind: OperationKind =
                    self.config.kinds[rng.gen_range(0..self.config.kinds.len())];
                let entry = &self.config.catalog[rng.gen_range(0..self.config.catalog.len())];
                let think = Duration::from_millis(rng.gen_range(0..=max_think_ms))
                    .mul_f64(self.config.time_scale);

                Submission {
                    request: OperationRequest::new(kind, entry.key.clone(), entry.duration),
                    think,
                }
            })
            .collect()
    }

    /// Plan and run a full workload.
    pub async fn run(&self) -> RunReport {
        let plan = self.plan();
        self.run_plan(plan).await
    }

    /// Submit every planned request, then wait for all of them.
    pub async fn run_plan(&self, plan: Vec<Submission>) -> RunReport {
        let started = Instant::now();
        let submitted = plan.len();
        tracing::info!(
            operations = submitted,
            max_concurrent = self.coordinator.max_concurrent(),
            "Starting run"
        );

        let mut tasks: JoinSet<Result<Outcome>> = JoinSet::new();
        let last = submitted.saturating_sub(1);
        for (i, submission) in plan.into_iter().enumerate() {
            let coordinator = Arc::clone(&self.coordinator);
            let request = submission.request;
            tracing::debug!(
                op = %request.id,
                kind = %request.kind,
                key = %request.key,
                "Submitting operation"
            );
            tasks.spawn(async move { coordinator.execute(&request).await });

            if i < last && !submission.think.is_zero() {
                tracing::debug!(
                    think_ms = u64::try_from(submission.think.as_millis()).unwrap_or(u64::MAX),
                    "Driver pausing"
                );
                tokio::time::sleep(submission.think).await;
            }
        }

        let mut report = RunReport {
            submitted,
            ..RunReport::default()
        };
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(Outcome::Completed)) => report.completed += 1,
                Ok(Ok(Outcome::ResourceNotFound)) => report.not_found += 1,
                Ok(Err(_)) => report.failed += 1,
                Err(e) => {
                    tracing::error!(error = %e, "Operation task did not finish");
                    report.failed += 1;
                }
            }
        }

        report.elapsed = started.elapsed();
        report.peak_active = self.coordinator.snapshot().peak_active;
        tracing::info!(
            completed = report.completed,
            not_found = report.not_found,
            failed = report.failed,
            elapsed_secs = report.elapsed.as_secs_f64(),
            "Run finished"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::config::CatalogEntry;
    use crate::delay::Delay;
    use crate::error::DelayError;

    fn quiet_config() -> DriverConfig {
        DriverConfig::default()
            .with_max_think_time(Duration::ZERO)
            .with_seed(42)
    }

    fn driver(max: usize, config: DriverConfig) -> Driver {
        Driver::new(Arc::new(Coordinator::new(max).unwrap()), config).unwrap()
    }

    #[test]
    fn rejects_invalid_config() {
        let coordinator = Arc::new(Coordinator::new(1).unwrap());
        let result = Driver::new(coordinator, DriverConfig::default().with_catalog(Vec::new()));
        assert!(matches!(result, Err(ConfigError::EmptyCatalog)));
    }

    #[test]
    fn seeded_plans_are_reproducible() {
        let a = driver(3, quiet_config().with_operations(20)).plan();
        let b = driver(3, quiet_config().with_operations(20)).plan();

        assert_eq!(a.len(), 20);
        let summary = |plan: &[Submission]| -> Vec<(OperationKind, String)> {
            plan.iter()
                .map(|s| (s.request.kind, s.request.key.to_string()))
                .collect()
        };
        assert_eq!(summary(&a), summary(&b));
    }

    #[test]
    fn plan_respects_think_bound_and_scale() {
        let config = DriverConfig::default()
            .with_operations(50)
            .with_max_think_time(Duration::from_secs(3))
            .with_time_scale(0.5)
            .with_seed(1);
        for submission in driver(1, config).plan() {
            assert!(submission.think <= Duration::from_millis(1500));
        }
    }

    #[test]
    fn plan_draws_only_configured_kinds() {
        let config = quiet_config()
            .with_operations(30)
            .with_kinds(vec![OperationKind::Mutate]);
        assert!(
            driver(2, config)
                .plan()
                .iter()
                .all(|s| s.request.kind == OperationKind::Mutate)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn run_tallies_every_submission() {
        let report = driver(3, quiet_config()).run().await;

        assert_eq!(report.submitted, 10);
        assert_eq!(
            report.completed + report.not_found + report.failed,
            report.submitted
        );
        assert_eq!(report.failed, 0);
        assert!(report.peak_active <= 3);
    }

    #[tokio::test(start_paused = true)]
    async fn verify_only_run_finds_nothing() {
        let config = quiet_config().with_kinds(vec![OperationKind::Verify]);
        let driver = driver(2, config);
        let report = driver.run().await;

        assert_eq!(report.not_found, 10);
        assert!(driver.coordinator().known_resources().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn acquire_only_run_overlaps_on_one_key() {
        let config = quiet_config()
            .with_operations(5)
            .with_kinds(vec![OperationKind::Acquire])
            .with_catalog(vec![CatalogEntry::new("only", Duration::from_secs(1))]);
        let report = driver(5, config).run().await;

        assert_eq!(report.completed, 5);
        assert_eq!(report.peak_active, 5);
        assert!(report.elapsed < Duration::from_millis(1010), "{:?}", report.elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn think_time_spaces_submissions() {
        let plan = vec![
            Submission {
                request: OperationRequest::mutate("a", Duration::from_secs(1)),
                think: Duration::from_secs(2),
            },
            Submission {
                request: OperationRequest::mutate("b", Duration::from_secs(1)),
                think: Duration::from_secs(2),
            },
        ];
        let report = driver(2, quiet_config()).run_plan(plan).await;

        // The trailing think-time is skipped: 2s pause, then 1s of work.
        assert_eq!(report.completed, 2);
        assert!(report.elapsed >= Duration::from_secs(3));
        assert!(report.elapsed < Duration::from_millis(3010));
    }

    struct Exploding;

    #[async_trait]
    impl Delay for Exploding {
        async fn wait(&self, request: &OperationRequest) -> std::result::Result<(), DelayError> {
            if request.key.as_str() == "panic" {
                panic!("exploding delay");
            }
            Err(DelayError::Interrupted("boom".to_string()))
        }
    }

    #[tokio::test]
    async fn failures_and_panics_count_as_failed() {
        let coordinator = Arc::new(
            Coordinator::new(2)
                .unwrap()
                .with_delay(Arc::new(Exploding)),
        );
        let driver = Driver::new(Arc::clone(&coordinator), quiet_config()).unwrap();
        let plan = vec![
            Submission {
                request: OperationRequest::mutate("err", Duration::from_secs(1)),
                think: Duration::ZERO,
            },
            Submission {
                request: OperationRequest::mutate("panic", Duration::from_secs(1)),
                think: Duration::ZERO,
            },
        ];

        let report = driver.run_plan(plan).await;
        assert_eq!(report.failed, 2);
        assert_eq!(coordinator.active_count(), 0);
    }

    #[test]
    fn report_serializes_elapsed_as_seconds() {
        let report = RunReport {
            submitted: 3,
            completed: 2,
            not_found: 1,
            failed: 0,
            elapsed: Duration::from_millis(2500),
            peak_active: 2,
        };
        insta::assert_json_snapshot!(report, @r#"
        {
          "submitted": 3,
          "completed": 2,
          "not_found": 1,
          "failed": 0,
          "elapsed": 2.5,
          "peak_active": 2
        }
        "#);
    }
}
