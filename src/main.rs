use anyhow::Result;
use clap::Parser;

use job_hunter::cli::{self, Cli};
use job_hunter::config::AppConfig;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Registry};

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so command output stays clean on stdout.
    Registry::default()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("job_hunter=info,rocket=warn")),
        )
        .init();

    let args = Cli::parse();
    let config = AppConfig::load()?;
    cli::run(config, args.command).await
}
