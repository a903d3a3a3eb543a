//! keygate-sim: drive a coordinator with a randomized workload.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use keygate::config::{MAX_CONCURRENT_ENV, duration_from_secs};
use keygate::{
    Coordinator, CoordinatorConfig, CoordinatorEvent, DriverConfig, EventSink, OperationKind,
    RunReport, SleepDelay,
};

/// Run randomized acquire/verify/mutate operations against a keygate coordinator.
#[derive(Debug, Parser)]
#[command(name = "keygate-sim")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Maximum number of operations allowed to run at once
    /// [default: $KEYGATE_MAX_CONCURRENT, else 3]
    #[arg(long)]
    max_concurrent: Option<usize>,

    /// Number of operations to submit
    #[arg(long, default_value_t = 10)]
    operations: usize,

    /// Upper bound of the random pause between submissions, in seconds
    #[arg(long, default_value_t = 3.0)]
    max_think_secs: f64,

    /// Multiplier for every simulated duration (0.1 runs ten times faster)
    #[arg(long, default_value_t = 1.0)]
    time_scale: f64,

    /// Restrict the operation kinds drawn (repeatable)
    #[arg(long = "kind", value_parser = parse_kind)]
    kinds: Vec<OperationKind>,

    /// Seed for a reproducible run
    #[arg(long)]
    seed: Option<u64>,

    /// Print every coordinator event as a JSON line on stdout
    #[arg(long)]
    events: bool,

    /// Print the run report as JSON
    #[arg(long)]
    json: bool,
}

fn parse_kind(raw: &str) -> Result<OperationKind, String> {
    match raw {
        "acquire" => Ok(OperationKind::Acquire),
        "verify" => Ok(OperationKind::Verify),
        "mutate" => Ok(OperationKind::Mutate),
        other => Err(format!(
            "unknown kind '{other}', expected acquire, verify or mutate"
        )),
    }
}

/// Initialize tracing with KEYGATE_LOG and LOG_FORMAT support.
fn init_tracing() {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match std::env::var("KEYGATE_LOG").as_deref() {
            Ok("debug") => "debug",
            Ok("warn") | Ok("warning") => "warn",
            Ok("error") => "error",
            _ => "info",
        };
        EnvFilter::new(format!("keygate={level},keygate_sim={level}"))
    };

    let use_json = std::env::var("LOG_FORMAT").as_deref() == Ok("json");

    if use_json {
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr));
        let _ = subscriber.try_init();
    } else {
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr));
        let _ = subscriber.try_init();
    }
}

impl Cli {
    fn coordinator_config(&self) -> anyhow::Result<CoordinatorConfig> {
        let config = match self.max_concurrent {
            Some(max_concurrent) => CoordinatorConfig::new(max_concurrent),
            None => CoordinatorConfig::from_env()
                .with_context(|| format!("invalid {MAX_CONCURRENT_ENV}"))?,
        };
        config.validate()?;
        Ok(config)
    }

    fn driver_config(&self) -> anyhow::Result<DriverConfig> {
        let mut config = DriverConfig::default()
            .with_operations(self.operations)
            .with_max_think_time(duration_from_secs("--max-think-secs", self.max_think_secs)?)
            .with_time_scale(self.time_scale);
        if !self.kinds.is_empty() {
            config = config.with_kinds(self.kinds.clone());
        }
        if let Some(seed) = self.seed {
            config = config.with_seed(seed);
        }
        config.validate()?;
        Ok(config)
    }
}

fn print_summary(report: &RunReport) {
    println!(
        "{} operations: {} completed, {} not found, {} failed; peak {} active; finished in {:.2} seconds.",
        report.submitted,
        report.completed,
        report.not_found,
        report.failed,
        report.peak_active,
        report.elapsed.as_secs_f64()
    );
}

async fn print_events(mut rx: tokio::sync::mpsc::UnboundedReceiver<CoordinatorEvent>) {
    while let Some(event) = rx.recv().await {
        match serde_json::to_string(&event) {
            Ok(line) => println!("{line}"),
            Err(e) => tracing::warn!(error = %e, "Failed to serialize event"),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    info!("keygate-sim {}", env!("CARGO_PKG_VERSION"));

    let coordinator_config = cli.coordinator_config()?;
    let driver_config = cli.driver_config()?;

    let delay = SleepDelay::new().with_scale(driver_config.time_scale);
    let mut coordinator = Coordinator::from_config(&coordinator_config)
        .context("failed to build coordinator")?
        .with_delay(Arc::new(delay));

    let printer = if cli.events {
        let (sink, rx) = EventSink::channel();
        coordinator = coordinator.with_events(sink);
        Some(tokio::spawn(print_events(rx)))
    } else {
        None
    };

    let coordinator = Arc::new(coordinator);
    let driver = keygate::Driver::new(Arc::clone(&coordinator), driver_config)?;
    let report = driver.run().await;

    // Dropping the last coordinator handle closes the event channel.
    drop(driver);
    drop(coordinator);
    if let Some(printer) = printer {
        printer.await.context("event printer task failed")?;
    }

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_summary(&report);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_kind_accepts_lowercase_names() {
        assert_eq!(parse_kind("acquire").unwrap(), OperationKind::Acquire);
        assert_eq!(parse_kind("verify").unwrap(), OperationKind::Verify);
        assert_eq!(parse_kind("mutate").unwrap(), OperationKind::Mutate);
        assert!(parse_kind("delete").is_err());
    }

    #[test]
    fn cli_defaults_build_valid_configs() {
        let cli = Cli::try_parse_from(["keygate-sim", "--max-concurrent", "3"]).unwrap();
        assert_eq!(cli.coordinator_config().unwrap().max_concurrent, 3);

        let config = cli.driver_config().unwrap();
        assert_eq!(config.operations, 10);
        assert_eq!(config.kinds, OperationKind::ALL.to_vec());
        assert!(config.seed.is_none());
    }

    #[test]
    fn cli_flags_flow_into_driver_config() {
        let cli = Cli::try_parse_from([
            "keygate-sim",
            "--max-concurrent",
            "2",
            "--operations",
            "4",
            "--max-think-secs",
            "0.5",
            "--kind",
            "mutate",
            "--kind",
            "verify",
            "--seed",
            "9",
        ])
        .unwrap();

        let config = cli.driver_config().unwrap();
        assert_eq!(config.operations, 4);
        assert_eq!(config.max_think_time, std::time::Duration::from_millis(500));
        assert_eq!(
            config.kinds,
            vec![OperationKind::Mutate, OperationKind::Verify]
        );
        assert_eq!(config.seed, Some(9));
    }

    #[test]
    fn zero_max_concurrent_flag_is_rejected() {
        let cli = Cli::try_parse_from(["keygate-sim", "--max-concurrent", "0"]).unwrap();
        assert!(cli.coordinator_config().is_err());
    }

    #[test]
    fn negative_think_time_is_rejected() {
        let cli = Cli::try_parse_from([
            "keygate-sim",
            "--max-concurrent",
            "1",
            "--max-think-secs=-1",
        ])
        .unwrap();
        assert!(cli.driver_config().is_err());
    }
}
