use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Result;
use tracing::{instrument, warn};

use api::cache::StoreStats;
use common::media::image::create_image_thumbnail;
use common::media::video::create_video_thumbnail;
use common::media::ThumbFormat;
use common::thumbkey::{image_thumb_path, video_thumb_path};

use crate::config::{ThumbConfig, VthumbConfig};

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

fn file_mtime_ms(path: &Path) -> Option<i64> {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as i64)
}

/// an artifact is valid iff it exists and is no older than the source
pub fn is_fresh(thumb_path: &Path, source_path: &Path) -> bool {
    match (file_mtime_ms(thumb_path), file_mtime_ms(source_path)) {
        (Some(t), Some(s)) => t >= s,
        _ => false,
    }
}

pub fn image_path(data_dir: &Path, dir_id: &str, rel_path: &str, cfg: &ThumbConfig) -> Result<PathBuf> {
    let format = ThumbFormat::parse(&cfg.format, true)?;
    Ok(image_thumb_path(data_dir, dir_id, rel_path, cfg.width, format))
}

pub fn video_path(data_dir: &Path, dir_id: &str, rel_path: &str, cfg: &VthumbConfig) -> Result<PathBuf> {
    let format = ThumbFormat::parse(&cfg.format, false)?;
    Ok(video_thumb_path(
        data_dir, dir_id, rel_path, cfg.time_sec, cfg.width, format,
    ))
}

#[instrument(skip_all)]
pub async fn generate_image(source: &Path, dest: &Path, cfg: &ThumbConfig) -> Result<()> {
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let format = ThumbFormat::parse(&cfg.format, true)?;
    create_image_thumbnail(source, dest, cfg.width, format, cfg.quality).await
}

#[instrument(skip_all)]
pub async fn generate_video(source: &Path, dest: &Path, cfg: &VthumbConfig) -> Result<()> {
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let format = ThumbFormat::parse(&cfg.format, false)?;
    create_video_thumbnail(source, dest, cfg.time_sec, cfg.width, format, cfg.quality).await
}

fn store_stats(dir: &Path) -> StoreStats {
    let mut count = 0u64;
    let mut total_bytes = 0u64;
    let mut oldest: Option<i64> = None;
    let mut newest: Option<i64> = None;

    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(_) => {
            return StoreStats {
                count: 0,
                total_bytes: 0,
                oldest_atime_ms: None,
                newest_atime_ms: None,
            }
        }
    };

    for entry in entries.flatten() {
        let Ok(meta) = entry.metadata() else { continue };
        if !meta.is_file() {
            continue;
        }
        count += 1;
        total_bytes += meta.len();

        let atime_ms = meta
            .accessed()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as i64);

        if let Some(a) = atime_ms {
            oldest = Some(oldest.map_or(a, |o| o.min(a)));
            newest = Some(newest.map_or(a, |n| n.max(a)));
        }
    }

    StoreStats {
        count,
        total_bytes,
        oldest_atime_ms: oldest,
        newest_atime_ms: newest,
    }
}

pub fn get_stats(thumbs_dir: &Path, vthumbs_dir: &Path) -> (StoreStats, StoreStats) {
    (store_stats(thumbs_dir), store_stats(vthumbs_dir))
}

/// delete entries whose `now - atime > maxAge`; evict further oldest-first
/// if the directory still exceeds `size_cap_bytes`, down to 80% of the cap
pub fn cleanup_dir(dir: &Path, max_age_ms: Option<i64>, size_cap_bytes: Option<u64>) -> u64 {
    let mut removed = 0u64;

    let Ok(entries) = std::fs::read_dir(dir) else {
        return 0;
    };

    let mut files: Vec<(PathBuf, u64, i64)> = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        let Ok(meta) = entry.metadata() else { continue };
        if !meta.is_file() {
            continue;
        }
        let atime_ms = meta
            .accessed()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);
        files.push((path, meta.len(), atime_ms));
    }

    if let Some(max_age) = max_age_ms {
        let now = now_ms();
        files.retain(|(path, _, atime)| {
            if now - atime > max_age {
                if std::fs::remove_file(path).is_ok() {
                    removed += 1;
                }
                false
            } else {
                true
            }
        });
    }

    if let Some(cap) = size_cap_bytes {
        let mut total: u64 = files.iter().map(|(_, size, _)| size).sum();
        if total > cap {
            files.sort_by_key(|(_, _, atime)| *atime);
            let target = (cap as f64 * 0.8) as u64;
            for (path, size, _) in files {
                if total <= target {
                    break;
                }
                if std::fs::remove_file(&path).is_ok() {
                    removed += 1;
                    total = total.saturating_sub(size);
                }
            }
        }
    }

    removed
}

pub fn clear_all(dir: &Path) -> u64 {
    let mut removed = 0u64;
    let Ok(entries) = std::fs::read_dir(dir) else {
        return 0;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_file() && std::fs::remove_file(&path).is_ok() {
            removed += 1;
        } else if path.is_file() {
            warn!("failed to remove thumbnail artifact {path:?}");
        }
    }
    removed
}
