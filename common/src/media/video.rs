use std::path::{Path, PathBuf};
use std::process::Stdio;

use anyhow::{Context, Result, anyhow};
use tokio::process::Command;
use tracing::{debug, instrument, warn};

use crate::media::ThumbFormat;
use crate::media::image::create_image_thumbnail;

/// name of the external decoder binary; not configurable beyond $PATH
/// resolution, matching the "external decoder process" wording in spec
const DECODER_BIN: &str = "ffmpeg";

/// how many trailing lines of stderr to keep when the decoder fails
const STDERR_TAIL_LINES: usize = 20;

#[instrument(skip_all, fields(time_sec, width, quality))]
pub async fn create_video_thumbnail(
    source_path: &Path,
    dest_path: &Path,
    time_sec: f64,
    width: u32,
    format: ThumbFormat,
    quality: u8,
) -> Result<()> {
    debug!("creating video thumbnail");

    let scratch_dir = dest_path
        .parent()
        .ok_or_else(|| anyhow!("thumbnail destination has no parent directory"))?;

    let frame_path = extract_frame(source_path, scratch_dir, time_sec).await?;

    let result = create_image_thumbnail(&frame_path, dest_path, width, format, quality).await;

    // the temp frame is never useful after this point, win or lose
    if let Err(err) = tokio::fs::remove_file(&frame_path).await {
        if err.kind() != std::io::ErrorKind::NotFound {
            warn!(target: "vthumbs", "failed to remove scratch frame {frame_path:?}: {err}");
        }
    }

    result
}

/// invoke the external decoder process to pull a single frame at `time_sec`
/// into a sibling `.tmp.jpg` file. failures are distinguished by exit code
/// plus a captured tail of stderr, since the decoder's stdout carries no
/// useful signal for a single-frame extraction.
async fn extract_frame(source_path: &Path, scratch_dir: &Path, time_sec: f64) -> Result<PathBuf> {
    let frame_path = scratch_dir.join(format!(
        "{}.tmp.jpg",
        source_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "frame".to_owned())
    ));

    let output = Command::new(DECODER_BIN)
        .arg("-y")
        .arg("-ss")
        .arg(format!("{time_sec}"))
        .arg("-i")
        .arg(source_path)
        .arg("-frames:v")
        .arg("1")
        .arg("-q:v")
        .arg("2")
        .arg(&frame_path)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .await
        .with_context(|| format!("failed to spawn {DECODER_BIN}"))?;

    if !output.status.success() {
        // best-effort cleanup; the decoder may or may not have created the file
        let _ = tokio::fs::remove_file(&frame_path).await;

        let stderr = String::from_utf8_lossy(&output.stderr);
        let tail: Vec<&str> = stderr.lines().rev().take(STDERR_TAIL_LINES).collect();
        let tail: Vec<&str> = tail.into_iter().rev().collect();

        return Err(anyhow!(
            "{DECODER_BIN} exited with {:?}: {}",
            output.status.code(),
            tail.join("\n")
        ));
    }

    Ok(frame_path)
}
