use std::process::ExitCode;

use harness::{config::HarnessConfig, scenarios::run_all};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("🚀 Starting vote acceptance run");

    let config = match HarnessConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Configuration rejected: {}", e);
            return ExitCode::FAILURE;
        }
    };

    info!(
        "📋 API {} | queue {} ({}) | store {}:{}/{}",
        config.api.url(),
        config.queue.url(),
        config.queue.key,
        config.db.host,
        config.db.port,
        config.db.table
    );

    let reports = run_all(&config).await;
    let failed = reports.iter().filter(|r| !r.passed()).count();

    for report in &reports {
        if report.passed() {
            info!("✓ {} ({:.1?}, started {})", report.scenario.name(), report.elapsed, report.started_at_rfc3339());
        } else {
            error!("✗ {} ({:.1?}, started {})", report.scenario.name(), report.elapsed, report.started_at_rfc3339());
        }
    }

    if failed > 0 {
        error!("{} of {} scenarios failed", failed, reports.len());
        ExitCode::FAILURE
    } else {
        info!("All {} scenarios passed", reports.len());
        ExitCode::SUCCESS
    }
}
