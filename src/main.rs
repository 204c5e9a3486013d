//! Voicemux - Voice control for coding assistants running in terminal windows

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> Result<()> {
    // Initialize logging; stdout is left to the CLI
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "voicemux=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::info!("Starting Voicemux v{}", env!("CARGO_PKG_VERSION"));

    // Run CLI
    voicemux::cli::run()?;

    Ok(())
}
