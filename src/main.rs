use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use moneytracker::analyzer::BudgetAnalyzer;
use moneytracker::api::{self, AppState};
use moneytracker::clock::{Clock, SystemClock};
use moneytracker::config::ServiceConfig;
use moneytracker::db::Database;
use moneytracker::materializer::Materializer;
use moneytracker::models::Period;
use moneytracker::scheduler::{CatchUpOutcome, Scheduler};

#[derive(Parser)]
#[command(name = "moneytracker")]
#[command(about = "Personal finance ledger with recurring transactions and budget analysis")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API and the monthly scheduler
    Serve {
        /// Port for HTTP API (overrides MONEYTRACKER_PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Book fixed transactions for a month once and exit
    RunNow {
        /// Year of the month to book (defaults to the current month)
        #[arg(long, requires = "month")]
        year: Option<i32>,
        /// Month to book, 1-12
        #[arg(long, requires = "year")]
        month: Option<u32>,
    },
    /// Repair the current month if its fixed transactions are missing, then exit
    CatchUp,
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG")
            .unwrap_or_else(|_| "moneytracker=debug,tower_http=debug".into()),
    );

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Shared components built from one database handle.
struct Services {
    db: Database,
    materializer: Materializer,
    analyzer: BudgetAnalyzer,
    scheduler: Scheduler,
}

fn build_services(config: &ServiceConfig) -> anyhow::Result<Services> {
    let db = match &config.database_path {
        Some(path) => Database::open(path.clone())?,
        None => Database::open_default()?,
    };
    db.migrate()?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let materializer = Materializer::new(db.clone(), clock.clone(), config.dedup_policy);
    let analyzer = BudgetAnalyzer::new(db.clone(), clock.clone());
    let scheduler = Scheduler::new(db.clone(), materializer.clone(), clock);

    Ok(Services {
        db,
        materializer,
        analyzer,
        scheduler,
    })
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("register SIGTERM");
        let mut sigint = signal(SignalKind::interrupt()).expect("register SIGINT");
        tokio::select! {
            _ = sigterm.recv() => {}
            _ = sigint.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

async fn serve(config: ServiceConfig, port: u16) -> anyhow::Result<()> {
    tracing::info!(
        "Starting MoneyTracker on port {} (dedup policy: {})",
        port,
        config.dedup_policy.as_str()
    );

    let services = build_services(&config)?;
    let scheduler = services.scheduler.clone().start(config.catch_up_on_start);

    let app = api::create_router(AppState {
        db: services.db,
        materializer: services.materializer,
        analyzer: services.analyzer,
        scheduler: services.scheduler,
    });

    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port)).await?;
    tracing::info!("MoneyTracker listening on http://127.0.0.1:{}", port);

    axum::serve(listener, app)
        .with_graceful_shutdown(wait_for_shutdown_signal())
        .await?;

    tracing::info!("HTTP server stopped, waiting for scheduler");
    scheduler.shutdown().await?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let config = ServiceConfig::from_env();

    match cli.command {
        Some(Commands::Serve { port }) => {
            let port = port.unwrap_or(config.port);
            serve(config, port).await?;
        }
        Some(Commands::RunNow { year, month }) => {
            let services = build_services(&config)?;
            let period = match (year, month) {
                (Some(year), Some(month)) => Period::new(year, month)?,
                _ => services.materializer.current_period(),
            };

            let report = services.materializer.materialize(period).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Some(Commands::CatchUp) => {
            let services = build_services(&config)?;
            match services.scheduler.check_and_process_current_month().await? {
                CatchUpOutcome::NoActiveDefinitions => {
                    println!("No active fixed transactions");
                }
                CatchUpOutcome::AlreadyComplete { found, expected } => {
                    println!(
                        "Current month already booked ({} entries for {} fixed transactions)",
                        found, expected
                    );
                }
                CatchUpOutcome::Materialized(report) => {
                    println!("{}", serde_json::to_string_pretty(&report)?);
                }
            }
        }
        None => {
            let port = config.port;
            serve(config, port).await?;
        }
    }

    Ok(())
}
