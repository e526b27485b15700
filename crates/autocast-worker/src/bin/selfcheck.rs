use std::path::Path;

use autocast_media::{check_ffmpeg, check_ffprobe};
use autocast_worker::{CredentialPools, WorkerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = WorkerConfig::from_env();

    println!(
        "autocast-selfcheck: starting with work_dir={}",
        config.work_dir
    );
    config.validate()?;
    ensure_workdir(&config.work_dir).await?;
    ensure_workdir(&config.output_dir).await?;

    let ffmpeg = check_ffmpeg()?;
    let ffprobe = check_ffprobe()?;
    println!("autocast-selfcheck: ffmpeg={}", ffmpeg.display());
    println!("autocast-selfcheck: ffprobe={}", ffprobe.display());

    let pools = CredentialPools::from_env()?;
    for pool in [&pools.text, &pools.voice] {
        println!(
            "autocast-selfcheck: pool '{}' has {} credentials",
            pool.name(),
            pool.len()
        );
        for snapshot in pool.snapshot() {
            println!("  {} {}", snapshot.id, snapshot.fingerprint);
        }
    }

    println!("autocast-selfcheck: ok");
    Ok(())
}

/// Create `path` and prove it is writable.
async fn ensure_workdir<P: AsRef<Path>>(path: P) -> anyhow::Result<()> {
    let path = path.as_ref();
    tokio::fs::create_dir_all(path).await?;
    let probe = path.join(".autocast-selfcheck");
    tokio::fs::write(&probe, b"ok")
        .await
        .map_err(|e| anyhow::anyhow!("{} is not writable: {}", path.display(), e))?;
    tokio::fs::remove_file(&probe).await?;
    Ok(())
}
