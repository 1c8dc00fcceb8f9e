use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use tracing::instrument;

use api::cache::{CacheCleanupReq, CacheCleanupResp, CacheClearResp, CacheStatsResp};
use api::config::{ConfigErrorResp, ConfigResp, ConfigUpdateReq};
use api::delete::{DeleteItemResult, DeleteReq, DeleteResp};
use api::inspect::{InspectErrorResp, InspectResp};
use api::query::{AuthorsFilter, NoMediaDirResp, ResourceFilter, TagsFilter};
use api::scan::{ScanError, ScanRunning};

use crate::db::msg::DbMsg;
use crate::indexer::msg::{IndexerMsg, ScanOutcome};
use crate::thumbs::msg::ThumbsMsg;

use super::cache::{json_with_cache, ttl};
use super::sse;
use super::stream::resolve_dir;
use super::{AppError, HttpState};

// JSON API handlers
//
// each of these is a thin adapter: deserialize the query/body, round-trip a
// message to the owning service over its mailbox, and shape the response.
// none of them hold any state of their own.

#[instrument(skip_all)]
pub async fn get_resources(
    headers: HeaderMap,
    State(state): State<Arc<HttpState>>,
    Query(filter): Query<ResourceFilter>,
) -> Result<Response, AppError> {
    let dirs = state.config.media_dirs();
    if dirs.is_empty() || !dirs.iter().any(|p| p.is_dir()) {
        let resp = NoMediaDirResp::new(
            dirs.iter().map(|p| p.to_string_lossy().into_owned()).collect(),
            state.config.default_media_dirs(),
        );
        return Ok(Json(resp).into_response());
    }

    let filtered = filter.r#type.is_some()
        || filter.dir_id.is_some()
        || filter.q.is_some()
        || filter.tag.is_some()
        || filter.author.is_some();
    let policy = if filtered {
        ttl::RESOURCES_FILTERED
    } else {
        ttl::RESOURCES_UNFILTERED
    };

    let (tx, rx) = tokio::sync::oneshot::channel();
    state
        .db_tx
        .send(DbMsg::QueryResources { filter, resp: tx }.into())
        .await?;
    let resp = rx.await??;

    json_with_cache(&headers, policy, &resp)
}

#[instrument(skip_all)]
pub async fn get_authors(
    headers: HeaderMap,
    State(state): State<Arc<HttpState>>,
    Query(filter): Query<AuthorsFilter>,
) -> Result<Response, AppError> {
    let (tx, rx) = tokio::sync::oneshot::channel();
    state
        .db_tx
        .send(DbMsg::QueryAuthors { filter, resp: tx }.into())
        .await?;
    let resp = rx.await??;

    json_with_cache(&headers, ttl::AUTHORS, &resp)
}

#[instrument(skip_all)]
pub async fn get_tags(
    headers: HeaderMap,
    State(state): State<Arc<HttpState>>,
    Query(filter): Query<TagsFilter>,
) -> Result<Response, AppError> {
    let (tx, rx) = tokio::sync::oneshot::channel();
    state
        .db_tx
        .send(DbMsg::QueryTags { filter, resp: tx }.into())
        .await?;
    let resp = rx.await??;

    json_with_cache(&headers, ttl::TAGS, &resp)
}

#[derive(Clone, Debug, Default, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReindexQuery {
    force: Option<u8>,
    stream: Option<u8>,
    token: Option<String>,
}

fn hook_authorized(state: &HttpState, headers: &HeaderMap, query_token: Option<&str>) -> bool {
    let Some(expected) = state.config.http.hook_token.as_deref() else {
        return true;
    };
    let header_token = headers
        .get("x-hook-token")
        .and_then(|v| v.to_str().ok());
    query_token == Some(expected) || header_token == Some(expected)
}

/// `GET|POST /api/reindex?force=0|1&stream=0|1&token=...`, spec.md §4.8
#[instrument(skip_all)]
pub async fn reindex(
    headers: HeaderMap,
    State(state): State<Arc<HttpState>>,
    Query(query): Query<ReindexQuery>,
) -> Result<Response, AppError> {
    if !hook_authorized(&state, &headers, query.token.as_deref()) {
        return Ok((
            StatusCode::FORBIDDEN,
            Json(ScanError {
                ok: false,
                error: "forbidden".to_owned(),
            }),
        )
            .into_response());
    }

    let force = query.force.unwrap_or(0) == 1;

    if query.stream.unwrap_or(0) == 1 {
        return Ok(sse::reindex_stream(state, force).await.into_response());
    }

    let (tx, rx) = tokio::sync::oneshot::channel();
    state
        .indexer_tx
        .send(
            IndexerMsg::UpdateCheck {
                force,
                progress: None,
                resp: tx,
            }
            .into(),
        )
        .await?;

    match rx.await? {
        Ok(ScanOutcome::Completed(report)) => Ok(Json(report).into_response()),
        Ok(ScanOutcome::AlreadyRunning) => Ok(Json(ScanRunning::new()).into_response()),
        Err(err) => Ok((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ScanError {
                ok: false,
                error: err.to_string(),
            }),
        )
            .into_response()),
    }
}

#[instrument(skip_all)]
pub async fn get_config(
    headers: HeaderMap,
    State(state): State<Arc<HttpState>>,
) -> Result<Response, AppError> {
    let resp = ConfigResp {
        ok: true,
        media_dirs: state
            .config
            .media_dirs()
            .iter()
            .map(|p| p.to_string_lossy().into_owned())
            .collect(),
        default_media_dirs: state.config.default_media_dirs(),
        from_env: state.config.media.from_env,
    };

    json_with_cache(&headers, ttl::CONFIG_GET, &resp)
}

#[instrument(skip_all)]
pub async fn post_config(
    State(state): State<Arc<HttpState>>,
    Json(req): Json<ConfigUpdateReq>,
) -> Result<Response, AppError> {
    match state.config.update_media_dirs(req.media_dirs).await {
        Ok(dirs) => {
            let indexer_tx = state.indexer_tx.clone();
            tokio::spawn(async move {
                let (tx, _rx) = tokio::sync::oneshot::channel();
                let _ = indexer_tx
                    .send(
                        IndexerMsg::UpdateCheck {
                            force: true,
                            progress: None,
                            resp: tx,
                        }
                        .into(),
                    )
                    .await;
            });

            let resp = ConfigResp {
                ok: true,
                media_dirs: dirs.iter().map(|p| p.to_string_lossy().into_owned()).collect(),
                default_media_dirs: state.config.default_media_dirs(),
                from_env: state.config.media.from_env,
            };
            Ok(Json(resp).into_response())
        }
        Err(err) => Ok((
            StatusCode::BAD_REQUEST,
            Json(ConfigErrorResp {
                ok: false,
                error: err.to_string(),
            }),
        )
            .into_response()),
    }
}

const MAX_DELETE_ITEMS: usize = 2000;

#[instrument(skip_all)]
pub async fn post_delete(
    State(state): State<Arc<HttpState>>,
    Json(req): Json<DeleteReq>,
) -> Result<Response, AppError> {
    if req.items.len() > MAX_DELETE_ITEMS {
        return Ok((
            StatusCode::BAD_REQUEST,
            Json(ScanError {
                ok: false,
                error: format!("at most {MAX_DELETE_ITEMS} items may be deleted per request"),
            }),
        )
            .into_response());
    }

    let mut results = Vec::with_capacity(req.items.len());
    let mut deleted = 0u64;
    let mut failed = 0u64;

    for item in req.items {
        let Some(root) = resolve_dir(&state.config, &item.dir_id) else {
            failed += 1;
            results.push(DeleteItemResult {
                ok: false,
                dir_id: item.dir_id,
                filename: item.filename,
                skipped: None,
                error: Some("unknown dirId".to_owned()),
            });
            continue;
        };

        let path = root.join(&item.filename);
        if !path.exists() {
            results.push(DeleteItemResult {
                ok: true,
                dir_id: item.dir_id,
                filename: item.filename,
                skipped: Some("not found"),
                error: None,
            });
            continue;
        }

        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                deleted += 1;
                unlink_thumbnails(&state, &item.dir_id, &item.filename, &path).await;
                results.push(DeleteItemResult {
                    ok: true,
                    dir_id: item.dir_id,
                    filename: item.filename,
                    skipped: None,
                    error: None,
                });
            }
            Err(err) => {
                failed += 1;
                results.push(DeleteItemResult {
                    ok: false,
                    dir_id: item.dir_id,
                    filename: item.filename,
                    skipped: None,
                    error: Some(err.to_string()),
                });
            }
        }
    }

    if deleted > 0 {
        let indexer_tx = state.indexer_tx.clone();
        tokio::spawn(async move {
            let (tx, _rx) = tokio::sync::oneshot::channel();
            let _ = indexer_tx
                .send(
                    IndexerMsg::UpdateCheck {
                        force: true,
                        progress: None,
                        resp: tx,
                    }
                    .into(),
                )
                .await;
        });
    }

    Ok(Json(DeleteResp {
        ok: true,
        deleted,
        failed,
        results,
    })
    .into_response())
}

/// best-effort unlink of both thumbnail kinds; neither is expected to exist
/// for every file, so a missing artifact is not an error
async fn unlink_thumbnails(state: &HttpState, dir_id: &str, rel_path: &str, source_path: &std::path::Path) {
    use crate::thumbs::store;
    use api::media::MediaKind;

    let kind = MediaKind::from_ext(
        source_path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default(),
    );

    let artifact = match kind {
        MediaKind::Image => {
            store::image_path(&state.config.data_dir, dir_id, rel_path, &state.config.thumb).ok()
        }
        MediaKind::Video => {
            store::video_path(&state.config.data_dir, dir_id, rel_path, &state.config.vthumb).ok()
        }
        MediaKind::File => None,
    };

    if let Some(path) = artifact {
        let _ = tokio::fs::remove_file(path).await;
    }
}

#[derive(Clone, Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InspectQuery {
    dir: String,
    name: String,
}

/// `GET /api/inspect?dir&name` -- read-only MP4 container probe; external
/// collaborator per spec.md §1, so this stays a lightweight heuristic rather
/// than a full box parser
#[instrument(skip_all)]
pub async fn get_inspect(
    State(state): State<Arc<HttpState>>,
    Query(query): Query<InspectQuery>,
) -> Result<Response, AppError> {
    let Some(root) = resolve_dir(&state.config, &query.dir) else {
        return Ok((
            StatusCode::NOT_FOUND,
            Json(InspectErrorResp {
                ok: false,
                error: "unknown dirId".to_owned(),
            }),
        )
            .into_response());
    };
    let Some(path) = super::stream::safe_join(&root, &query.name) else {
        return Ok((
            StatusCode::BAD_REQUEST,
            Json(InspectErrorResp {
                ok: false,
                error: "invalid path".to_owned(),
            }),
        )
            .into_response());
    };

    match crate::inspect::probe(&path).await {
        Ok(resp) => Ok(Json(resp).into_response()),
        Err(err) => Ok((
            StatusCode::NOT_FOUND,
            Json(InspectErrorResp {
                ok: false,
                error: err.to_string(),
            }),
        )
            .into_response()),
    }
}

#[instrument(skip_all)]
pub async fn get_cache_stats(
    headers: HeaderMap,
    State(state): State<Arc<HttpState>>,
) -> Result<Response, AppError> {
    let (tx, rx) = tokio::sync::oneshot::channel();
    state.thumbs_tx.send(ThumbsMsg::GetStats { resp: tx }.into()).await?;
    let (thumbs, vthumbs) = rx.await??;

    let db_size_bytes = tokio::fs::metadata(&state.config.db_path)
        .await
        .map(|m| m.len())
        .unwrap_or(0);

    let resp = CacheStatsResp {
        ok: true,
        thumbs,
        vthumbs,
        db_size_bytes,
    };

    json_with_cache(&headers, ttl::CACHE_STATS, &resp)
}

#[instrument(skip_all)]
pub async fn post_cache_clear_thumbs(State(state): State<Arc<HttpState>>) -> Result<Response, AppError> {
    let (tx, rx) = tokio::sync::oneshot::channel();
    state.thumbs_tx.send(ThumbsMsg::ClearAll { resp: tx }.into()).await?;
    let (removed_thumbs, removed_vthumbs) = rx.await??;

    Ok(Json(CacheClearResp {
        ok: true,
        removed: removed_thumbs + removed_vthumbs,
    })
    .into_response())
}

#[instrument(skip_all)]
pub async fn post_cache_cleanup(
    State(state): State<Arc<HttpState>>,
    Json(req): Json<CacheCleanupReq>,
) -> Result<Response, AppError> {
    let (tx, rx) = tokio::sync::oneshot::channel();
    state
        .thumbs_tx
        .send(
            ThumbsMsg::Cleanup {
                max_age_ms: req.max_age_ms,
                resp: tx,
            }
            .into(),
        )
        .await?;
    let (removed_thumbs, removed_vthumbs) = rx.await??;

    let (stats_tx, stats_rx) = tokio::sync::oneshot::channel();
    state
        .thumbs_tx
        .send(ThumbsMsg::GetStats { resp: stats_tx }.into())
        .await?;
    let (thumbs, vthumbs) = stats_rx.await??;

    Ok(Json(CacheCleanupResp {
        ok: true,
        removed: removed_thumbs + removed_vthumbs,
        remaining_bytes: thumbs.total_bytes + vthumbs.total_bytes,
    })
    .into_response())
}
