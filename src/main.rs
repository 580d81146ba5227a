//! Oncoguard: clinical cancer-risk workflow core
//!
//! Operator entry point: database setup and model verification.

use std::path::Path;

use anyhow::{bail, Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use oncoguard::adapters::sanitize::SanitizingMakeWriter;
use oncoguard::adapters::sqlite::SqliteStore;
use oncoguard::adapters::xgboost::TreeEnsembleScorer;
use oncoguard::application::{admin_password, ensure_admin, DEFAULT_ADMIN_SECRET_PATH};
use oncoguard::config::{AppConfig, LogTarget};
use oncoguard::domain::{
    CancerStage, ClinicalFeatures, Comorbidities, Metastasis, RiskClass, TreatmentType, TumorType,
};
use oncoguard::ports::RiskScorer;

const USAGE: &str = "\
Usage: oncoguard [COMMAND]

Commands:
  setup        Create the database schema and seed the administrator (default)
  check-model  Verify the model directory and score a reference assessment
  -h, --help   Print this help

Configuration is read from ONCOGUARD_* environment variables.";

fn init_logging(target: &LogTarget) -> Result<WorkerGuard> {
    let (writer, guard) = match target {
        LogTarget::File(log_file) => {
            if let Some(parent) = log_file.parent() {
                // Best-effort: don't fail startup just because the directory is missing.
                let _ = std::fs::create_dir_all(parent);
            }

            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(log_file)
                .with_context(|| format!("Failed to open log file {}", log_file.display()))?;
            tracing_appender::non_blocking(file)
        }
        LogTarget::Stdout => tracing_appender::non_blocking(std::io::stdout()),
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(SanitizingMakeWriter::new(writer)))
        .init();

    Ok(guard)
}

fn setup(config: &AppConfig) -> Result<()> {
    let store = SqliteStore::new(&config.db_path)
        .with_context(|| format!("Failed to open database {}", config.db_path.display()))?;
    tracing::info!("Database ready at {:?}", config.db_path);

    let password = admin_password(|name| std::env::var(name).ok(), Path::new(DEFAULT_ADMIN_SECRET_PATH))
        .context("Failed to read the administrator password")?;
    if ensure_admin(&store, &password)? {
        println!("Administrator account created.");
    } else {
        println!("Administrator account already exists.");
    }
    Ok(())
}

fn check_model(config: &AppConfig) -> Result<()> {
    let scorer = TreeEnsembleScorer::load(&config.model_path, config.manifest_policy())
        .with_context(|| format!("Failed to load model from {}", config.model_path.display()))?;

    let reference = ClinicalFeatures {
        age: 45,
        cancer_stage: CancerStage::II,
        tumor_size: 5.0,
        tumor_type: TumorType::Breast,
        metastasis: Metastasis::No,
        treatment_type: TreatmentType::Surgery,
        comorbidities: Comorbidities::None,
    };
    let probability = scorer.score(&reference)?;
    println!(
        "Model {} OK: reference probability {:.4} ({})",
        scorer.model_id(),
        probability,
        RiskClass::from_probability(probability)
    );
    Ok(())
}

fn main() -> Result<()> {
    let config = AppConfig::from_env();
    let command = std::env::args().nth(1);

    if matches!(command.as_deref(), Some("-h" | "--help")) {
        println!("{USAGE}");
        return Ok(());
    }

    let _guard = init_logging(&config.log_target)?;
    tracing::info!("Starting Oncoguard...");

    match command.as_deref() {
        None | Some("setup") => setup(&config)?,
        Some("check-model") => check_model(&config)?,
        Some(other) => bail!("Unknown command {other:?}\n\n{USAGE}"),
    }

    tracing::info!("Oncoguard finished.");
    Ok(())
}
