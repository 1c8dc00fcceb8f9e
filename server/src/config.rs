use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// `THUMB_*` / `VTHUMB_*` environment-derived knobs for one thumbnail store
#[derive(Clone, Debug)]
pub struct ThumbConfig {
    pub width: u32,
    pub format: String,
    pub quality: u8,
    pub concurrency: usize,
    /// `POST /api/cache/cleanup` evicts oldest-first beyond this size, in
    /// addition to `max_age_ms`; `None` disables the size-based pass
    pub max_bytes: Option<u64>,
}

#[derive(Clone, Debug)]
pub struct VthumbConfig {
    pub width: u32,
    pub format: String,
    pub quality: u8,
    pub concurrency: usize,
    pub time_sec: f64,
    pub max_bytes: Option<u64>,
}

#[derive(Clone, Debug)]
pub struct HttpConfig {
    pub port: u16,
    pub hook_token: Option<String>,
}

#[derive(Clone, Debug)]
pub struct MediaConfig {
    /// `None` when the directory list is environment-sourced and therefore
    /// not user-editable via `/api/config`
    pub from_env: bool,
    /// shared behind a lock so `POST /api/config` can update the live list
    /// without every service having to reload its own `Arc<ServerConfig>`
    pub dirs: Arc<RwLock<Vec<PathBuf>>>,
    pub dir_mtime_opt: bool,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub http: HttpConfig,
    pub media: MediaConfig,
    pub thumb: ThumbConfig,
    pub vthumb: VthumbConfig,
    pub data_dir: PathBuf,
    pub db_path: PathBuf,
}

/// persisted form of the media directory list, written by `POST /api/config`
/// when the list is not environment-sourced -- the one piece of state
/// spec.md calls an external collaborator with a persistence surface
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
struct PersistedConfig {
    media_dirs: Vec<String>,
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn env_u32(name: &str, default: u32) -> u32 {
    env_var(name)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u8(name: &str, default: u8) -> u8 {
    env_var(name)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_f64(name: &str, default: f64) -> f64 {
    env_var(name)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64_opt(name: &str) -> Option<u64> {
    env_var(name).and_then(|v| v.parse().ok())
}

fn env_bool(name: &str, default: bool) -> bool {
    match env_var(name).as_deref() {
        Some("1") | Some("true") | Some("TRUE") => true,
        Some("0") | Some("false") | Some("FALSE") => false,
        _ => default,
    }
}

impl ServerConfig {
    /// assemble configuration from `std::env`, the way the teacher's
    /// `read_config` assembles `ESConfig` from a TOML file -- here there is
    /// no file to parse for most of it, only the persisted media dir list
    pub fn load() -> Result<Arc<Self>> {
        let data_dir = env_var("INDEX_DB_PATH")
            .and_then(|p| PathBuf::from(p).parent().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("./data"));

        let db_path = env_var("INDEX_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("index.sqlite"));

        let (from_env, dirs) = load_media_dirs(&data_dir)?;

        Ok(Arc::new(ServerConfig {
            http: HttpConfig {
                port: env_u32("PORT", 8080) as u16,
                hook_token: env_var("HOOK_TOKEN"),
            },
            media: MediaConfig {
                from_env,
                dirs: Arc::new(RwLock::new(dirs)),
                dir_mtime_opt: env_bool("INDEX_DIR_MTIME_OPT", false),
            },
            thumb: ThumbConfig {
                width: env_u32("THUMB_WIDTH", 400),
                format: env_var("THUMB_FORMAT").unwrap_or_else(|| "webp".to_owned()),
                quality: env_u8("THUMB_QUALITY", 80),
                concurrency: env_u32("THUMB_CONCURRENCY", 4) as usize,
                max_bytes: env_u64_opt("THUMB_CACHE_MAX_BYTES"),
            },
            vthumb: VthumbConfig {
                width: env_u32("VTHUMB_WIDTH", 400),
                format: env_var("VTHUMB_FORMAT").unwrap_or_else(|| "jpg".to_owned()),
                quality: env_u8("VTHUMB_QUALITY", 80),
                concurrency: env_u32("VTHUMB_CONCURRENCY", 2) as usize,
                time_sec: env_f64("VTHUMB_TIME_SEC", 1.0),
                max_bytes: env_u64_opt("VTHUMB_CACHE_MAX_BYTES"),
            },
            data_dir,
            db_path,
        }))
    }

    pub fn persisted_config_path(&self) -> PathBuf {
        self.data_dir.join("media_dirs.json")
    }

    /// the live directory list, as currently in effect; cheap clone, safe to
    /// call from any async context since the lock is never held across an
    /// await point
    pub fn media_dirs(&self) -> Vec<PathBuf> {
        self.media
            .dirs
            .read()
            .expect("media dir lock poisoned")
            .clone()
    }

    /// `GET /api/config`'s `defaultMediaDirs`: the list this process would
    /// fall back to if the persisted override were removed, i.e. whatever
    /// the environment itself names (empty when nothing is env-sourced)
    pub fn default_media_dirs(&self) -> Vec<String> {
        if !self.media.from_env {
            return Vec::new();
        }
        self.media
            .dirs
            .read()
            .expect("media dir lock poisoned")
            .iter()
            .map(|p| p.to_string_lossy().into_owned())
            .collect()
    }

    /// `POST /api/config`: validate and persist a new directory list;
    /// returns an error (caller maps to `400`) when the list is
    /// environment-sourced, since that surface is not user-editable
    pub async fn update_media_dirs(&self, dirs: Vec<String>) -> Result<Vec<PathBuf>> {
        if self.media.from_env {
            anyhow::bail!("media directory list is environment-sourced and cannot be edited");
        }

        let mut paths = Vec::with_capacity(dirs.len());
        for d in &dirs {
            let p = PathBuf::from(d);
            if !p.is_absolute() {
                anyhow::bail!("media directory must be an absolute path: {d}");
            }
            paths.push(p);
        }

        tokio::fs::create_dir_all(&self.data_dir).await?;

        let persisted = PersistedConfig {
            media_dirs: dirs.clone(),
        };
        let body = serde_json::to_vec_pretty(&persisted)?;
        tokio::fs::write(self.persisted_config_path(), body).await?;

        *self.media.dirs.write().expect("media dir lock poisoned") = paths.clone();

        Ok(paths)
    }
}

fn load_media_dirs(data_dir: &PathBuf) -> Result<(bool, Vec<PathBuf>)> {
    if let Some(single) = env_var("MEDIA_DIR") {
        return Ok((true, vec![PathBuf::from(single)]));
    }

    if let Some(multi) = env_var("MEDIA_DIRS") {
        let dirs = multi
            .split(';')
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .collect();
        return Ok((true, dirs));
    }

    let persisted_path = data_dir.join("media_dirs.json");
    if persisted_path.exists() {
        let body = std::fs::read(&persisted_path)
            .with_context(|| format!("failed to read {persisted_path:?}"))?;
        match serde_json::from_slice::<PersistedConfig>(&body) {
            Ok(cfg) => {
                return Ok((false, cfg.media_dirs.into_iter().map(PathBuf::from).collect()));
            }
            Err(err) => {
                warn!("ignoring unparseable persisted config {persisted_path:?}: {err}");
            }
        }
    }

    Ok((false, Vec::new()))
}

