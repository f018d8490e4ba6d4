//! formscrape - extract field values from scanned fixed-layout forms.

mod cli;

use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// How long exit waits for OCR calls abandoned at their field deadline.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

fn main() -> anyhow::Result<()> {
    // Load .env file if present (before anything else)
    let _ = dotenvy::dotenv();

    let default_filter = if cli::is_verbose() {
        "formscrape=info"
    } else {
        "formscrape=warn"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let runtime = tokio::runtime::Runtime::new()?;
    let result = runtime.block_on(cli::run());
    // Dropping the runtime would wait on every blocking task, including
    // engines that never returned
    runtime.shutdown_timeout(SHUTDOWN_GRACE);
    result
}
