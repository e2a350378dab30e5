use clap::Parser;
use miette::{IntoDiagnostic, Result};
use payflow::application::orchestrator::PaymentOrchestrator;
use payflow::config::OrchestratorConfig;
use payflow::domain::ports::TransactionRepositoryRef;
use payflow::infrastructure::in_memory::InMemoryTransactionRepository;
use payflow::infrastructure::simulated_gateway::SimulatedGateway;
use payflow::infrastructure::tracing_notifier::TracingNotifier;
use payflow::infrastructure::weighted_analyzer::WeightedFraudAnalyzer;
use payflow::interfaces::csv::outcome_writer::{OutcomeRecord, OutcomeWriter};
use payflow::interfaces::csv::payment_reader::PaymentReader;
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input payment requests CSV file
    input: PathBuf,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long, env = "PAYFLOW_DB_PATH")]
    db_path: Option<PathBuf>,

    /// Upper bound for each gateway call, in milliseconds
    #[arg(long, env = "PAYFLOW_GATEWAY_TIMEOUT_MS", default_value_t = 5000)]
    gateway_timeout_ms: u64,

    /// Seed for the fraud analyzer's random source
    #[arg(long, env = "PAYFLOW_FRAUD_SEED")]
    fraud_seed: Option<u64>,

    /// Authorize only; captures are left for a later run
    #[arg(long)]
    authorize_only: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let repository = open_repository(cli.db_path)?;
    let analyzer = match cli.fraud_seed {
        Some(seed) => WeightedFraudAnalyzer::with_seed(seed),
        None => WeightedFraudAnalyzer::new(),
    };
    let mut config = OrchestratorConfig::default()
        .with_gateway_timeout(Duration::from_millis(cli.gateway_timeout_ms));
    config.capture_immediately = !cli.authorize_only;

    let orchestrator = PaymentOrchestrator::new(
        repository,
        Arc::new(SimulatedGateway::new()),
        Arc::new(analyzer),
        Arc::new(TracingNotifier),
        config,
    );

    let file = File::open(cli.input).into_diagnostic()?;
    let reader = PaymentReader::new(file);
    let stdout = io::stdout();
    let mut writer = OutcomeWriter::new(stdout.lock());

    let mut processed = 0usize;
    for row in reader.requests() {
        let (record, request) = match row {
            Ok(row) => row,
            Err(e) => {
                error!(error = %e, "unreadable payment row");
                continue;
            }
        };
        let outcome = match request {
            Ok(request) => orchestrator.process_payment(request).await,
            Err(e) => Err(e),
        };
        let line = match &outcome {
            Ok(tx) => OutcomeRecord::from_transaction(tx),
            Err(e) => OutcomeRecord::rejected(&record.customer, &record.amount, &record.currency, e),
        };
        writer.write(&line).into_diagnostic()?;
        processed += 1;
    }
    writer.flush().into_diagnostic()?;
    info!(processed, "batch finished");

    Ok(())
}

#[cfg(feature = "storage-rocksdb")]
fn open_repository(db_path: Option<PathBuf>) -> Result<TransactionRepositoryRef> {
    use payflow::infrastructure::rocksdb::RocksDbTransactionRepository;

    match db_path {
        Some(path) => Ok(Arc::new(
            RocksDbTransactionRepository::open(path).into_diagnostic()?,
        )),
        None => Ok(Arc::new(InMemoryTransactionRepository::new())),
    }
}

#[cfg(not(feature = "storage-rocksdb"))]
fn open_repository(db_path: Option<PathBuf>) -> Result<TransactionRepositoryRef> {
    if db_path.is_some() {
        eprintln!(
            "WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
        );
    }
    Ok(Arc::new(InMemoryTransactionRepository::new()))
}
