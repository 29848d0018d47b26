//! `lipsync` command-line binary.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use lipsync_models::{Job, JobId, JobState};
use lipsync_worker::{JobExecutor, ProcessRequest, WorkerConfig};

#[derive(Parser, Debug)]
#[command(name = "lipsync", version, about = "Re-render a face's mouth to match an audio track")]
struct Cli {
    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Lip-sync a video or still image to an audio file
    Process {
        /// Video or still image with the face
        media: PathBuf,
        /// Audio driving the mouth motion
        audio: PathBuf,
        /// Face to sync when several are found
        #[arg(short = 'f', long = "face-id")]
        face_id: Option<usize>,
        /// Output video path
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Follow the chosen face by overlap instead of by position
        #[arg(long)]
        track_faces: bool,
    },
    /// Continue a job that is waiting for a face choice
    Resume {
        job_id: String,
        #[arg(short = 'f', long = "face-id")]
        face_id: usize,
    },
    /// List faces found on the first frame
    Faces { media: PathBuf },
    /// List stored jobs, oldest first
    Jobs,
}

fn init_tracing(verbose: bool) {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let level = if verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "lipsync={level},lipsync_worker={level},lipsync_media={level},ort=warn"
        ))
    });

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(verbose)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
}

fn init_metrics() -> Option<PrometheusHandle> {
    let enabled = std::env::var("LIPSYNC_METRICS_DUMP")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);
    if !enabled {
        return None;
    }
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!("Failed to install Prometheus recorder: {}", e);
            None
        }
    }
}

fn print_job(job: &Job) {
    println!("job:    {}", job.id);
    println!("state:  {}", job.state);
    match job.state {
        JobState::Succeeded => {
            println!("output: {}", job.output_path.display());
            println!(
                "frames: {} ({} unchanged)",
                job.frames_total, job.frames_passthrough
            );
        }
        JobState::AwaitingFaceSelection => {
            println!("faces:");
            for face in &job.detected_faces {
                let preview = face
                    .preview_path
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default();
                println!(
                    "  [{}] top={} right={} bottom={} left={} {}",
                    face.index, face.rect.top, face.rect.right, face.rect.bottom, face.rect.left, preview
                );
            }
            println!("resume with: lipsync resume {} --face-id <N>", job.id);
        }
        JobState::Failed => {
            if let Some(failure) = &job.failure {
                println!("error:  {}", failure);
            }
        }
        JobState::Pending | JobState::Processing => {}
    }
}

async fn run(cli: Cli, executor: JobExecutor) -> anyhow::Result<bool> {
    match cli.command {
        Commands::Process {
            media,
            audio,
            face_id,
            output,
            track_faces,
        } => {
            let job = executor
                .process(ProcessRequest {
                    media,
                    audio,
                    output,
                    face_index: face_id,
                    track_faces,
                })
                .await?;
            print_job(&job);
            Ok(job.state != JobState::Failed)
        }
        Commands::Resume { job_id, face_id } => {
            let job = executor.resume(&JobId::from_string(job_id), face_id).await?;
            print_job(&job);
            Ok(job.state != JobState::Failed)
        }
        Commands::Faces { media } => {
            let faces = executor.faces(&media).await?;
            if faces.is_empty() {
                println!("no faces found");
            }
            for face in faces {
                println!(
                    "[{}] top={} right={} bottom={} left={}",
                    face.index, face.rect.top, face.rect.right, face.rect.bottom, face.rect.left
                );
            }
            Ok(true)
        }
        Commands::Jobs => {
            let jobs = executor.store().list().await?;
            if jobs.is_empty() {
                println!("no jobs");
            }
            for job in jobs {
                println!(
                    "{}  {:<24} {} + {}",
                    job.id,
                    job.state.as_str(),
                    job.media_path.display(),
                    job.audio_path.display()
                );
            }
            Ok(true)
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let metrics = init_metrics();

    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);

    let (cancel_tx, cancel_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal, cancelling");
            let _ = cancel_tx.send(true);
        }
    });

    let executor = match JobExecutor::new(config) {
        Ok(executor) => executor.with_cancel(cancel_rx),
        Err(e) => {
            error!("Failed to set up lip-sync pipeline: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let code = match run(cli, executor).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    };

    if let Some(handle) = metrics {
        println!("{}", handle.render());
    }
    code
}
