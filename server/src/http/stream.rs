use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use anyhow::Result;
use axum::{
    body::Body,
    extract::{Path as AxPath, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use http::header::{ACCEPT_RANGES, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, RANGE};
use mime_guess::MimeGuess;
use regex::Regex;
use tokio::{fs::File, io::AsyncSeekExt};
use tokio_util::codec::{BytesCodec, FramedRead};
use tracing::{instrument, warn};

use common::dirid::dir_id as compute_dir_id;

use super::{AppError, HttpState};
use crate::config::ServerConfig;
use crate::thumbs::msg::{ThumbKind, ThumbsMsg};

pub(super) fn resolve_dir(config: &ServerConfig, dir_id: &str) -> Option<PathBuf> {
    config
        .media_dirs()
        .into_iter()
        .find(|p| compute_dir_id(p) == dir_id)
}

/// path-safety: reject `..` segments and embedded NUL bytes; anything else
/// is joined onto the resolved directory root
pub(super) fn safe_join(root: &Path, rel_path: &str) -> Option<PathBuf> {
    if rel_path.as_bytes().contains(&0) {
        return None;
    }
    let mut path = root.to_path_buf();
    for seg in rel_path.split('/') {
        match seg {
            "" | "." => continue,
            ".." => return None,
            seg => path.push(seg),
        }
    }
    Some(path)
}

// media/thumbnail streaming
//
// the core byte-range streaming logic, generalized from the teacher's
// `media_srvdir/<dir>/<uuid>` symlink layout to this spec's
// `mediaDir root + relPath` layout; the Range parsing itself is unchanged
#[instrument(skip_all)]
pub async fn stream_media(
    headers: HeaderMap,
    State(state): State<Arc<HttpState>>,
    AxPath((dir_id, rel_path)): AxPath<(String, String)>,
) -> Result<Response, AppError> {
    let Some(root) = resolve_dir(&state.config, &dir_id) else {
        return Ok((StatusCode::NOT_FOUND, "unknown dirId").into_response());
    };
    let Some(path) = safe_join(&root, &rel_path) else {
        return Ok((StatusCode::BAD_REQUEST, "invalid path").into_response());
    };

    stream_file(&headers, &path).await
}

#[instrument(skip_all)]
pub async fn stream_thumb(
    headers: HeaderMap,
    State(state): State<Arc<HttpState>>,
    AxPath((dir_id, rel_path)): AxPath<(String, String)>,
) -> Result<Response, AppError> {
    handle_thumb(&headers, &state, dir_id, rel_path, ThumbKind::Image).await
}

#[instrument(skip_all)]
pub async fn stream_vthumb(
    headers: HeaderMap,
    State(state): State<Arc<HttpState>>,
    AxPath((dir_id, rel_path)): AxPath<(String, String)>,
) -> Result<Response, AppError> {
    handle_thumb(&headers, &state, dir_id, rel_path, ThumbKind::Video).await
}

async fn handle_thumb(
    headers: &HeaderMap,
    state: &Arc<HttpState>,
    dir_id: String,
    rel_path: String,
    kind: ThumbKind,
) -> Result<Response, AppError> {
    let Some(root) = resolve_dir(&state.config, &dir_id) else {
        return Ok(StatusCode::NOT_FOUND.into_response());
    };
    let Some(source_path) = safe_join(&root, &rel_path) else {
        return Ok(StatusCode::BAD_REQUEST.into_response());
    };

    let (tx, rx) = tokio::sync::oneshot::channel();
    state
        .thumbs_tx
        .send(
            ThumbsMsg::GetOrGenerate {
                kind,
                dir_id: dir_id.clone(),
                rel_path: rel_path.clone(),
                source_path: source_path.clone(),
                resp: tx,
            }
            .into(),
        )
        .await?;

    match rx.await? {
        Ok(thumb_path) => stream_file(headers, &thumb_path).await,
        Err(err) => {
            let target = match kind {
                ThumbKind::Image => api::THUMB_DIR,
                ThumbKind::Video => api::VTHUMB_DIR,
            };
            warn!(target: target, "on-demand generation failed for {dir_id}/{rel_path}: {err:#}");
            match kind {
                // image cache misses fall back to serving the source file;
                // video misses never do (spec.md §6.2)
                ThumbKind::Image => stream_file(headers, &source_path).await,
                ThumbKind::Video => Ok(StatusCode::NOT_FOUND.into_response()),
            }
        }
    }
}

async fn stream_file(headers: &HeaderMap, path: &Path) -> Result<Response, AppError> {
    let mut file_handle = match File::open(path).await {
        Ok(f) => f,
        Err(err) => return Ok((StatusCode::NOT_FOUND, err.to_string()).into_response()),
    };

    let length = file_handle.metadata().await?.len();

    let (partial, (start, end)) = match headers.get(RANGE) {
        None => (false, (0, length)),
        Some(val) => match parse_ranges(val.to_str()?, length) {
            Ok(v) => (true, v),
            Err(err) => {
                return Ok((StatusCode::RANGE_NOT_SATISFIABLE, format!("{err}")).into_response())
            }
        },
    };

    let mut resp_headers = HeaderMap::new();
    resp_headers.insert(ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    resp_headers.insert(CONTENT_LENGTH, HeaderValue::from(end - start));
    if partial {
        resp_headers.insert(
            CONTENT_RANGE,
            HeaderValue::from_str(&format!("bytes {start}-{}/{length}", end - 1))?,
        );
    }

    if let Some(mime) = MimeGuess::from_path(path).first() {
        resp_headers.insert(CONTENT_TYPE, HeaderValue::from_str(mime.essence_str())?);
    }

    let body = if partial {
        file_handle.seek(SeekFrom::Start(start)).await?;
        Body::from_stream(
            FramedRead::new(file_handle, BytesCodec::new()).take((end - start).try_into()?),
        )
    } else {
        Body::from_stream(FramedRead::new(file_handle, BytesCodec::new()))
    };

    let code = if partial {
        StatusCode::PARTIAL_CONTENT
    } else {
        StatusCode::OK
    };

    Ok((code, resp_headers, body).into_response())
}

fn range_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d*)-(\d*)").expect("range regex is valid"))
}

/// http range header parser, ported from the teacher's `stream.rs`
/// (itself credited there to https://github.com/dicej/tagger); errors here
/// are reported by the caller as `416 Range Not Satisfiable`
fn parse_ranges(ranges: &str, length: u64) -> Result<(u64, u64)> {
    if !ranges.starts_with("bytes=") {
        return Err(anyhow::Error::msg("invalid range unit"));
    }

    let regex = range_regex();
    let spec = &ranges[6..];

    let mut match_iter = regex
        .captures_iter(spec)
        .map(|c| c.extract::<2>())
        .map(|(_, [s, e])| parse_endpoints(s, e));

    let (start, end) = match match_iter.next() {
        None => return Ok((0, length)),
        Some(range) => {
            let range = range?;
            // start is zero-indexed (seek position); end counts bytes
            // (one-indexed), so "0-511" reads as (end - start) = 512
            match range {
                (Some(s), Some(e)) => (s, e + 1),
                (Some(s), None) => (s, length),
                (None, Some(e)) => (length.saturating_sub(e), length),
                (None, None) => (0, length),
            }
        }
    };

    if start > length || end > length || start > end || end == 0 {
        return Err(anyhow::Error::msg("invalid range"));
    }

    if match_iter.next().is_some() {
        return Err(anyhow::Error::msg("multiple ranges unsupported"));
    }

    Ok((start, end))
}

fn parse_endpoints(start: &str, end: &str) -> Result<(Option<u64>, Option<u64>)> {
    let parse = |s: &str| match s {
        "" => Ok(None),
        s => s
            .parse::<u64>()
            .map(Some)
            .map_err(|_| anyhow::Error::msg("failed to parse endpoint")),
    };

    Ok((parse(start)?, parse(end)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_range_when_no_header() {
        assert_eq!(parse_ranges("bytes=0-", 1024).unwrap(), (0, 1024));
    }

    #[test]
    fn closed_range() {
        assert_eq!(parse_ranges("bytes=0-511", 1024).unwrap(), (0, 512));
    }

    #[test]
    fn suffix_range() {
        assert_eq!(parse_ranges("bytes=-512", 1024).unwrap(), (512, 1024));
    }

    #[test]
    fn rejects_bad_unit() {
        assert!(parse_ranges("items=0-1", 1024).is_err());
    }

    #[test]
    fn safe_join_rejects_dotdot() {
        assert!(safe_join(Path::new("/data"), "../escape.jpg").is_none());
        assert!(safe_join(Path::new("/data"), "a/../../escape.jpg").is_none());
    }

    #[test]
    fn safe_join_accepts_nested_path() {
        assert_eq!(
            safe_join(Path::new("/data"), "a/b/c.jpg"),
            Some(PathBuf::from("/data/a/b/c.jpg"))
        );
    }
}
