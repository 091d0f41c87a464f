//! Main entry point for the calc-orchestrator binary
//!
//! Runs one calculation against real HTTP services and streams every status
//! update to stdout as JSON until the calculation settles.

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use tokio::signal;

use calc_orchestrator::{
    services::{HttpComputeBackend, HttpReportStore},
    CalcManager, InMemoryStatusCache, OrchestratorError, OrchestratorResult, OrchestratorSettings, StatusCache,
};
use calc_shared::{
    calc_info, calc_warn, logging, BackendConfig, CalcId, CalcSettings, CalcStartConfig, CalcStatus, Population,
    TargetType,
};

/// Orchestrator for long-running policy calculations
#[derive(Parser)]
#[command(name = "calc-orchestrator")]
#[command(about = "Starts policy calculations, tracks their progress and persists their results")]
pub struct Args {
    /// Base URL of the job-based analysis API
    #[arg(long, env = "CALC_ANALYSIS_URL", default_value = "http://localhost:8000")]
    pub analysis_url: String,

    /// Base URL of the record API
    #[arg(long, env = "CALC_RECORDS_URL", default_value = "http://localhost:5000")]
    pub records_url: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "CALC_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run one calculation to completion
    Run(RunArgs),
}

#[derive(Clone, Copy, ValueEnum)]
pub enum Kind {
    Economy,
    Household,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum Target {
    Report,
    Simulation,
}

impl From<Target> for TargetType {
    fn from(target: Target) -> Self {
        match target {
            Target::Report => TargetType::Report,
            Target::Simulation => TargetType::Simulation,
        }
    }
}

#[derive(clap::Args)]
pub struct RunArgs {
    /// Calculation family
    #[arg(long, value_enum)]
    pub kind: Kind,

    /// Report or simulation id the result belongs to
    #[arg(long)]
    pub calc_id: String,

    #[arg(long, default_value = "us")]
    pub country: String,

    /// Baseline policy id
    #[arg(long)]
    pub policy: String,

    /// Reform policy id (takes precedence over the baseline)
    #[arg(long)]
    pub reform: Option<String>,

    /// Household id, or geography id for economy runs (defaults to the country)
    #[arg(long)]
    pub population: Option<String>,

    #[arg(long)]
    pub year: Option<String>,

    #[arg(long, value_enum, default_value = "report")]
    pub target: Target,

    /// Parent report of a simulation-targeted calculation
    #[arg(long)]
    pub report_id: Option<String>,

    /// Mark the report as errored in the store when the calculation fails
    #[arg(long)]
    pub record_failures: bool,
}

impl RunArgs {
    fn start_config(&self) -> OrchestratorResult<CalcStartConfig> {
        let population = match self.kind {
            Kind::Household => Population::Household {
                household_id: self.population.clone().ok_or_else(|| OrchestratorError::ConfigurationError {
                    field: "population (household id is required for household runs)".to_string(),
                })?,
            },
            Kind::Economy => Population::Geography {
                geography_id: self.population.clone(),
            },
        };

        Ok(CalcStartConfig {
            calc_id: CalcId::new(self.calc_id.clone()),
            target_type: self.target.into(),
            country_id: self.country.clone(),
            population,
            baseline_policy_id: self.policy.clone(),
            reform_policy_id: self.reform.clone(),
            report_id: self.report_id.clone(),
            year: self.year.clone(),
        })
    }
}

#[tokio::main]
async fn main() -> OrchestratorResult<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();
    logging::init_tracing(Some(&args.log_level));

    let backend_config = BackendConfig::new(args.analysis_url.clone(), args.records_url.clone());
    match args.command {
        Command::Run(run) => run_calculation(run, backend_config).await,
    }
}

async fn run_calculation(run: RunArgs, backend_config: BackendConfig) -> OrchestratorResult<()> {
    let config = run.start_config()?;
    let calc_id = config.calc_id.clone();

    let calc = CalcSettings::default();
    calc.validate()?;
    let settings = OrchestratorSettings {
        calc,
        record_failures: run.record_failures,
    };

    logging::log_startup(&format!("{} calculation {}", config.calc_type(), calc_id));

    let cache = Arc::new(InMemoryStatusCache::new());
    let store = Arc::new(HttpReportStore::new(&backend_config)?);
    let backend = Arc::new(HttpComputeBackend::new(backend_config)?);
    let manager = match run.kind {
        Kind::Economy => CalcManager::economy(backend, cache.clone(), store, settings),
        Kind::Household => CalcManager::household(backend, cache.clone(), store, settings),
    };

    let (subscription, mut updates) = cache.watch_channel(&calc_id);
    manager.start_calculation(config).await?;

    let mut last: Option<CalcStatus> = None;
    loop {
        tokio::select! {
            update = updates.recv() => {
                let Some(status) = update else { break };
                println!("{}", serde_json::to_string(&status)?);
                let terminal = status.is_terminal();
                last = Some(status);
                if terminal {
                    break;
                }
            }
            _ = signal::ctrl_c() => {
                logging::log_shutdown("Received Ctrl+C signal");
                manager.cleanup(&calc_id);
                break;
            }
        }
    }

    // Persistence runs after the terminal status is published
    while manager.is_running(&calc_id) {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    cache.unsubscribe(subscription);

    if let Some(message) = manager.persistence_error(&calc_id) {
        calc_warn!(calc_id, "Result was not persisted: {}", message);
        return Err(OrchestratorError::StoreError { message });
    }

    match last.as_ref().and_then(CalcStatus::calc_error) {
        Some(error) => Err(OrchestratorError::BackendError {
            message: format!("[{}] {}", error.code, error.message),
        }),
        None => {
            if last.as_ref().is_some_and(CalcStatus::is_complete) {
                logging::log_success(&calc_id, "Calculation complete");
            } else {
                calc_info!(calc_id, "Stopped before the calculation settled");
            }
            Ok(())
        }
    }
}
