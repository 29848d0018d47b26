use lipsync_media::{check_ffmpeg, check_ffprobe};
use lipsync_worker::WorkerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = WorkerConfig::from_env();

    println!(
        "lipsync-selfcheck: starting with work_dir={}",
        config.work_dir.display()
    );
    tokio::fs::create_dir_all(config.jobs_dir()).await?;

    let ffmpeg = check_ffmpeg()?;
    let ffprobe = check_ffprobe()?;
    println!("lipsync-selfcheck: ffmpeg={} ffprobe={}", ffmpeg.display(), ffprobe.display());

    for (what, path) in [
        ("lip-sync model", &config.model_path),
        ("face detector", &config.detector_model_path),
    ] {
        if !path.is_file() {
            return Err(anyhow::anyhow!("{} weights missing at {}", what, path.display()));
        }
    }

    println!("lipsync-selfcheck: ok");
    Ok(())
}
