//! `jobhub-worker` -- runs one `session` job and exits.
//!
//! Started by the broker's worker for each `session` task, with the job
//! described in the environment (see [`WorkerConfig::from_env`]).

use jobhub_session::HttpReporter;
use jobhub_worker::{build_runtime, exit_code, run_session, TerminationSignals, WorkerConfig};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "jobhub_worker=debug,jobhub_session=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = WorkerConfig::from_env().unwrap_or_else(|e| {
        tracing::error!(error = %e, "Invalid worker configuration");
        std::process::exit(2);
    });
    tracing::info!(
        job_id = config.job_id,
        runtime = ?config.runtime,
        manager_url = %config.manager_url,
        "Loaded worker configuration",
    );

    let runtime = build_runtime(&config).unwrap_or_else(|e| {
        tracing::error!(error = %e, "Failed to set up session runtime");
        std::process::exit(2);
    });
    let reporter = HttpReporter::new(
        &config.manager_url,
        config.job_id,
        config.manager_token.clone(),
    );

    let mut signals = TerminationSignals::install().unwrap_or_else(|e| {
        tracing::error!(error = %e, "Failed to install signal handlers");
        std::process::exit(2);
    });

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        tokio::select! {
            () = signals.recv() => on_signal.cancel(),
            () = on_signal.cancelled() => {}
        }
    });

    let result = run_session(&config, runtime.as_ref(), &reporter, cancel).await;
    if let Err(e) = &result {
        tracing::error!(job_id = config.job_id, error = %e, "Session could not start");
    }
    std::process::exit(exit_code(&result));
}
