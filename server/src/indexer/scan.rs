use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use anyhow::Result;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::warn;
use walkdir::WalkDir;

use api::media::MediaKind;
use api::scan::IndexerProgress;
use common::dirid::dir_id as compute_dir_id;
use common::parser::parse_filename;
use common::tags::{extract_hashtags, DEFAULT_MAX_TAGS};

use crate::config::ServerConfig;
use crate::db::msg::DbMsg;
use crate::db::MediaUpsert;
use crate::service::ESM;
use crate::thumbs::msg::{ThumbKind, ThumbsMsg};

#[derive(Default, Clone, Copy)]
pub struct ScanCounters {
    pub scanned_dirs: u32,
    pub skipped_dirs: u32,
    pub added: u64,
    pub updated: u64,
    pub deleted: u64,
}

async fn call<T: Send + 'static>(
    tx: &mpsc::Sender<ESM>,
    build: impl FnOnce(oneshot::Sender<Result<T>>) -> DbMsg,
) -> Result<T> {
    let (resp_tx, resp_rx) = oneshot::channel();
    tx.send(build(resp_tx).into())
        .await
        .map_err(|_| anyhow::anyhow!("db service is not running"))?;
    resp_rx
        .await
        .map_err(|_| anyhow::anyhow!("db service dropped the response channel"))?
}

fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

fn dir_mtime_ms(path: &Path) -> Option<f64> {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as f64)
}

/// one full pass over every configured directory; mutates `counters` as it
/// goes and emits progress events on `progress` when present
pub async fn run_scan(
    config: &ServerConfig,
    db_tx: &mpsc::Sender<ESM>,
    thumbs_tx: &mpsc::Sender<ESM>,
    force: bool,
    progress: Option<&broadcast::Sender<IndexerProgress>>,
) -> Result<ScanCounters> {
    let run_id = now_ms();
    let mut counters = ScanCounters::default();

    let dirs: Vec<(String, PathBuf)> = config
        .media_dirs()
        .into_iter()
        .map(|p| (compute_dir_id(&p), p))
        .collect();

    let keep_ids: Vec<String> = dirs.iter().map(|(id, _)| id.clone()).collect();
    call(db_tx, |resp| DbMsg::PruneDirsNotIn { keep_ids, resp }).await?;

    let total_dirs = dirs.len() as u32;
    if let Some(tx) = progress {
        let _ = tx.send(IndexerProgress::Init { total_dirs });
    }

    for (idx, (dir_id, dir_path)) in dirs.iter().enumerate() {
        let current_dir = (idx + 1) as u32;

        if !dir_path.is_dir() {
            counters.skipped_dirs += 1;
            continue;
        }

        let current_mtime = dir_mtime_ms(dir_path);

        if !force && config.media.dir_mtime_opt {
            if let Ok(Some((_, recorded_mtime, _))) =
                call(db_tx, |resp| DbMsg::GetDirState { dir_id: dir_id.clone(), resp }).await
            {
                if Some(recorded_mtime) == current_mtime {
                    counters.skipped_dirs += 1;
                    continue;
                }
            }
        }

        scan_one_dir(config, db_tx, thumbs_tx, dir_id, dir_path, run_id, force, &mut counters).await?;
        counters.scanned_dirs += 1;

        call(db_tx, |resp| DbMsg::UpsertDirState {
            dir_id: dir_id.clone(),
            dir_path: dir_path.to_string_lossy().into_owned(),
            dir_mtime_ms: current_mtime.unwrap_or(0.0),
            scanned_at_ms: now_ms(),
            resp,
        })
        .await?;

        if let Some(tx) = progress {
            let _ = tx.send(IndexerProgress::Processing {
                current_dir,
                total_dirs,
                current_dir_path: dir_path.to_string_lossy().into_owned(),
                scanned_files: 0,
                added: counters.added,
                updated: counters.updated,
                deleted: counters.deleted,
            });
        }
    }

    call(db_tx, |resp| DbMsg::OrphanCleanup { resp }).await?;

    Ok(counters)
}

async fn scan_one_dir(
    config: &ServerConfig,
    db_tx: &mpsc::Sender<ESM>,
    thumbs_tx: &mpsc::Sender<ESM>,
    dir_id: &str,
    dir_root: &Path,
    run_id: i64,
    force: bool,
    counters: &mut ScanCounters,
) -> Result<()> {
    let walker = WalkDir::new(dir_root).into_iter().filter_entry(|e| {
        e.file_name()
            .to_str()
            .map(|name| !name.starts_with('.'))
            .unwrap_or(true)
    });

    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(err) => {
                warn!(target: "indexer", "skipping unreadable entry under {dir_root:?}: {err}");
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let Ok(rel_path) = path.strip_prefix(dir_root) else {
            continue;
        };
        let rel_path = rel_path.to_string_lossy().replace('\\', "/");

        let Some(basename) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let Some(parsed) = parse_filename(basename) else {
            continue;
        };

        let meta = match std::fs::metadata(path) {
            Ok(m) => m,
            Err(err) => {
                warn!(target: "indexer", "skipping unreadable file {path:?}: {err}");
                continue;
            }
        };
        let size = meta.len() as i64;
        let mtime_ms = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as f64)
            .unwrap_or(0.0);

        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        let kind = MediaKind::from_ext(&ext);

        let existing = call(db_tx, |resp| DbMsg::GetMediaItem {
            dir_id: dir_id.to_owned(),
            rel_path: rel_path.clone(),
            resp,
        })
        .await?;

        let changed = match &existing {
            None => true,
            Some(row) => row.mtime_ms != mtime_ms || row.size != size,
        };

        if !changed && !force {
            call(db_tx, |resp| DbMsg::TouchSeenRun {
                dir_id: dir_id.to_owned(),
                rel_path: rel_path.clone(),
                run_id,
                resp,
            })
            .await?;
            continue;
        }

        let tags = extract_hashtags(&parsed.theme, DEFAULT_MAX_TAGS)
            .into_iter()
            .map(|t| t.to_lowercase())
            .collect::<Vec<_>>();

        if !changed && force {
            call(db_tx, |resp| DbMsg::TouchSeenRun {
                dir_id: dir_id.to_owned(),
                rel_path: rel_path.clone(),
                run_id,
                resp,
            })
            .await?;
            call(db_tx, |resp| DbMsg::RebuildTypesTags {
                dir_id: dir_id.to_owned(),
                rel_path: rel_path.clone(),
                types: parsed.declared_types.clone(),
                tags,
                resp,
            })
            .await?;
            continue;
        }

        let upsert = MediaUpsert {
            dir_id: dir_id.to_owned(),
            rel_path: rel_path.clone(),
            ext,
            kind: kind.as_str().to_owned(),
            time_text: parsed.time_text,
            iso: Some(parsed.iso),
            timestamp_ms: parsed.timestamp_ms,
            author: parsed.author,
            theme: parsed.theme,
            type_text: parsed.type_text,
            seq: parsed.seq,
            mtime_ms,
            size,
            seen_run: run_id,
            types: parsed.declared_types,
            tags,
        };

        let is_new = call(db_tx, |resp| DbMsg::UpsertMediaItem {
            item: upsert,
            run_id,
            resp,
        })
        .await?;

        if is_new {
            counters.added += 1;
        } else {
            counters.updated += 1;
        }

        if matches!(kind, MediaKind::Image | MediaKind::Video) {
            let thumb_kind = if matches!(kind, MediaKind::Video) {
                ThumbKind::Video
            } else {
                ThumbKind::Image
            };
            let _ = thumbs_tx
                .send(
                    ThumbsMsg::Enqueue {
                        kind: thumb_kind,
                        dir_id: dir_id.to_owned(),
                        rel_path: rel_path.clone(),
                        source_path: path.to_path_buf(),
                    }
                    .into(),
                )
                .await;
        }
    }

    let deleted = call(db_tx, |resp| DbMsg::DeleteVanished {
        dir_id: dir_id.to_owned(),
        run_id,
        resp,
    })
    .await?;
    counters.deleted += deleted;

    Ok(())
}
