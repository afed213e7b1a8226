use std::path::PathBuf;
use std::process::ExitCode;

use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Level};

use rigbot::config::Configuration;
use rigbot::credentials::CredentialProvider;
use rigbot::pipeline::{RigPipeline, RunRequest};
use rigbot::session::Outcome;

#[derive(Debug, Parser)]
#[command(name = "rigbot", version, about = "Drives the Mixamo auto-rigger for a batch of meshes")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Rig one or more meshes, one independent session each.
    Rig(RigArgs),
    /// Store a bearer token in the credential cache.
    Login(LoginArgs),
}

#[derive(Debug, Parser)]
struct RigArgs {
    /// Input mesh files (glb, gltf, fbx, obj or dae).
    #[arg(required = true)]
    inputs: Vec<PathBuf>,
    #[arg(long, default_value = "out")]
    out: PathBuf,
    /// Interchange format for the rigged result.
    #[arg(long, default_value = "glb")]
    format: String,
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Debug, Parser)]
struct LoginArgs {
    #[arg(long)]
    token: String,
    #[arg(long, default_value_t = 12)]
    expires_in_hours: i64,
    #[arg(long)]
    config: Option<PathBuf>,
}

fn init_logging() {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();
}

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();
    let cli = Cli::parse();

    match cli.command {
        Command::Rig(args) => run_rig(args).await,
        Command::Login(args) => run_login(args),
    }
}

async fn run_rig(args: RigArgs) -> ExitCode {
    let config = match Configuration::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "could not load configuration");
            return ExitCode::FAILURE;
        }
    };

    let cancel = CancellationToken::new();
    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling after the current step");
            ctrl_c_cancel.cancel();
        }
    });

    let pipeline = RigPipeline::new(config, cancel.clone());
    let mut failures = 0usize;

    for input in &args.inputs {
        if cancel.is_cancelled() {
            warn!("skipping remaining inputs after cancellation");
            failures += 1;
            continue;
        }
        let session = pipeline
            .run(&RunRequest {
                input,
                out_dir: &args.out,
                target_format: &args.format,
            })
            .await;

        match &session.outcome {
            Some(Outcome::Success) => {
                info!(
                    input = %input.display(),
                    attempts = session.landmark_attempts,
                    artifacts = session.artifacts.len(),
                    "rigged"
                );
            }
            Some(Outcome::Timeout) => {
                error!(input = %input.display(), "timed out waiting for the rig job");
                failures += 1;
            }
            Some(Outcome::Failed(reason)) => {
                error!(input = %input.display(), %reason, "failed");
                failures += 1;
            }
            None => {
                error!(input = %input.display(), "run ended without an outcome");
                failures += 1;
            }
        }
    }

    if failures == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn run_login(args: LoginArgs) -> ExitCode {
    let config = match Configuration::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "could not load configuration");
            return ExitCode::FAILURE;
        }
    };

    let provider = CredentialProvider::new(config.credentials.resolved_cache_path());
    let expiry = Utc::now() + Duration::hours(args.expires_in_hours);
    match provider.store(&args.token, expiry) {
        Ok(()) => {
            info!(cache = %provider.cache_path().display(), %expiry, "credentials stored");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "could not store credentials");
            ExitCode::FAILURE
        }
    }
}
