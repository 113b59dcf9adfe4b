use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use hookq::processor::CommandProcessor;
use hookq::shutdown::ShutdownCoordinator;
use hookq::types::HookEvent;
use hookq::worker::{Dispatcher, DispatcherConfig, JobQueue, QueueCell};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const SHUTDOWN_TIMEOUT_ENV: &str = "HOOKQ_SHUTDOWN_TIMEOUT_SECS";
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// How long the runtime waits for blocking threads once the drain is done.
/// The stdin reader sits in an uninterruptible blocking read.
const RUNTIME_SHUTDOWN_GRACE: Duration = Duration::from_millis(250);

static QUEUE: QueueCell = QueueCell::new();

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hookq=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "Failed to build tokio runtime");
            return ExitCode::FAILURE;
        }
    };

    let code = runtime.block_on(run());
    runtime.shutdown_timeout(RUNTIME_SHUTDOWN_GRACE);
    code
}

async fn run() -> ExitCode {
    let config = match DispatcherConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            return ExitCode::FAILURE;
        }
    };
    let Some(drain_timeout) = shutdown_timeout() else {
        return ExitCode::FAILURE;
    };

    let coordinator = ShutdownCoordinator::new();
    let queue = QUEUE.acquire(config.queue_capacity);
    let processor = Arc::new(CommandProcessor::new());

    let dispatcher = match Dispatcher::start(config, &queue, processor, coordinator.token()) {
        Ok(dispatcher) => dispatcher,
        Err(e) => {
            error!(error = %e, "Failed to start dispatcher");
            return ExitCode::FAILURE;
        }
    };

    tokio::spawn(read_events(queue.clone(), coordinator.token()));

    info!(
        workers = dispatcher.config().max_workers,
        "hookq running, reading hook events from stdin"
    );

    let mut code = ExitCode::SUCCESS;
    if let Err(e) = coordinator
        .run(|| info!("Reload requested, configuration is fixed at startup"))
        .await
    {
        error!(error = %e, "Failed to install signal handlers");
        coordinator.trigger();
        code = ExitCode::FAILURE;
    }

    if tokio::time::timeout(drain_timeout, dispatcher.wait())
        .await
        .is_err()
    {
        warn!(
            timeout_secs = drain_timeout.as_secs(),
            "Workers still busy at shutdown timeout, exiting anyway"
        );
        return ExitCode::FAILURE;
    }

    info!(stats = ?dispatcher.stats(), "hookq stopped");
    code
}

/// Reads the drain timeout. Logs and returns `None` if the variable is set
/// but not a number of seconds.
fn shutdown_timeout() -> Option<Duration> {
    match std::env::var(SHUTDOWN_TIMEOUT_ENV) {
        Err(_) => Some(DEFAULT_SHUTDOWN_TIMEOUT),
        Ok(raw) => match raw.trim().parse::<u64>() {
            Ok(secs) => Some(Duration::from_secs(secs)),
            Err(_) => {
                error!(var = SHUTDOWN_TIMEOUT_ENV, value = %raw, "Invalid shutdown timeout");
                None
            }
        },
    }
}

/// Pushes one JSON-encoded hook event per stdin line onto the queue until
/// stdin closes or shutdown fires.
async fn read_events(queue: JobQueue, shutdown: CancellationToken) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            line = lines.next_line() => line,
        };

        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => {
                info!("stdin closed, no more hook events will be read");
                break;
            }
            Err(e) => {
                error!(error = %e, "Failed to read stdin");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let event: HookEvent = match serde_json::from_str(&line) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "Skipping malformed hook event");
                continue;
            }
        };
        debug!(
            hook = %event.hook_id(),
            request = %event.request_id(),
            "Queueing hook event"
        );

        // Pushing blocks while the queue is full; give up on shutdown.
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            () = queue.push(event) => {}
        }
    }
}
