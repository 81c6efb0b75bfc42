//! `tryon` -- run one virtual try-on from the command line.
//!
//! Encodes a photo of a person and a photo of a garment, submits them to
//! the try-on service, polls until the job finishes, and prints the URL of
//! the generated image. Ctrl-C cancels the running job.
//!
//! Service settings come from the environment (see
//! [`ClientConfig::from_env`]); flags override them.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tryon_client::api::TryOnApi;
use tryon_client::client::JobClient;
use tryon_client::config::ClientConfig;
use tryon_client::controller::TryOnController;
use tryon_client::error::TryOnError;
use tryon_core::media::SourceFile;
use tryon_core::types::MediaRole;

/// Virtual try-on: dress a person photo in a garment photo.
#[derive(Parser, Debug)]
#[command(name = "tryon")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Photo of the person (JPEG or PNG)
    #[arg(short, long)]
    subject: PathBuf,

    /// Photo of the garment (JPEG or PNG)
    #[arg(short, long)]
    garment: PathBuf,

    /// Download the generated image to this path
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Skip format, size and resolution checks
    #[arg(long)]
    permissive: bool,

    /// Delay between status checks, in milliseconds
    #[arg(long)]
    poll_interval_ms: Option<u64>,

    /// Try-on service base URL
    #[arg(long)]
    api_url: Option<String>,

    /// Print the final job as JSON instead of the result URL
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tryon_cli=info,tryon_client=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("Try-on failed: {e:#}");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let config = resolve_config(&args)?;
    tracing::info!(
        api_url = %config.api_url,
        model = %config.model_name,
        strict = config.strict_validation,
        poll_interval_ms = config.poll_interval.as_millis() as u64,
        "Loaded try-on configuration",
    );

    let api = Arc::new(
        TryOnApi::new(config.api_url.clone(), config.request_timeout)
            .context("Failed to build HTTP client")?,
    );
    let client = JobClient::new(api.clone(), &config);
    let mut controller = TryOnController::new(client);

    for (role, path) in [
        (MediaRole::Subject, &args.subject),
        (MediaRole::Garment, &args.garment),
    ] {
        let file = SourceFile::from_path(path).await?;
        tracing::info!(%role, file = %path.display(), bytes = file.size(), "Encoding image");
        controller
            .select_media(role, file)
            .await
            .with_context(|| format!("Rejected {role} image {}", path.display()))?;
    }

    let handle = controller.start().await?;
    tracing::info!(job_id = %handle.job_id(), "Waiting for try-on result");

    tokio::select! {
        _ = handle.wait() => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!(job_id = %handle.job_id(), "Interrupted, cancelling");
            controller.cancel();
        }
    }

    let outcome = handle.outcome().unwrap_or(Err(TryOnError::Cancelled));
    if args.json {
        if let Some(job) = handle.final_job() {
            let json = serde_json::to_string_pretty(&job).context("Failed to serialize job")?;
            println!("{json}");
        }
    }

    let url = outcome?;
    if !args.json {
        println!("{url}");
    }

    if let Some(output) = &args.output {
        let bytes = api
            .download(&url)
            .await
            .with_context(|| format!("Failed to download {url}"))?;
        tokio::fs::write(output, &bytes)
            .await
            .with_context(|| format!("Failed to write {}", output.display()))?;
        tracing::info!(path = %output.display(), bytes = bytes.len(), "Saved try-on result");
    }

    Ok(())
}

/// Environment configuration with command-line overrides applied.
fn resolve_config(args: &Args) -> anyhow::Result<ClientConfig> {
    let mut config = ClientConfig::from_env()?;

    if let Some(api_url) = &args.api_url {
        config.api_url = api_url.clone();
    }
    if let Some(ms) = args.poll_interval_ms {
        anyhow::ensure!(ms > 0, "--poll-interval-ms must be greater than 0");
        config.poll_interval = Duration::from_millis(ms);
    }
    if args.permissive {
        config.strict_validation = false;
    }

    Ok(config)
}
