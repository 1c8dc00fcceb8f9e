pub mod msg;
pub mod store;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::{mpsc, Semaphore};
use tracing::{error, info, instrument, warn};

use crate::config::ServerConfig;
use crate::service::{ESInner, ESMRegistry, EntanglementService, ServiceType, ESM};

use self::msg::{ThumbKind, ThumbsMsg};

/// two content-addressed caches (image/video thumbnails) sharing one
/// service, each with its own bounded worker pool -- grounded on the
/// teacher's `task/clean.rs` `JoinSet`-with-threshold idiom, here expressed
/// as a semaphore gate per store since enqueue must not block the caller
pub struct ThumbsService {
    config: Arc<ServerConfig>,
}

#[async_trait]
impl EntanglementService for ThumbsService {
    type Inner = ThumbsServiceInner;

    fn create(config: Arc<ServerConfig>, _registry: &ESMRegistry) -> Self {
        ThumbsService { config }
    }

    #[instrument(skip_all)]
    async fn start(&self, registry: &ESMRegistry) -> Result<()> {
        let (tx, rx) = mpsc::channel(1024);
        registry.insert(ServiceType::Thumbs, tx)?;

        let inner = Arc::new(ThumbsServiceInner::new(self.config.clone(), registry.clone())?);

        tokio::spawn(async move {
            inner.run(rx).await;
        });

        Ok(())
    }
}

pub struct ThumbsServiceInner {
    config: Arc<ServerConfig>,
    registry: ESMRegistry,
    image_sem: Arc<Semaphore>,
    video_sem: Arc<Semaphore>,
}

impl ThumbsServiceInner {
    fn thumbs_dir(&self) -> PathBuf {
        self.config.data_dir.join(api::THUMB_DIR)
    }

    fn vthumbs_dir(&self) -> PathBuf {
        self.config.data_dir.join(api::VTHUMB_DIR)
    }

    async fn run(self: Arc<Self>, mut rx: mpsc::Receiver<ESM>) {
        while let Some(esm) = rx.recv().await {
            let this = self.clone();
            // Enqueue and GetOrGenerate spawn their encode work and return
            // immediately; the mailbox only blocks on the cheap, bounded
            // stats/cleanup operations
            if let Err(err) = this.message_handler(esm).await {
                error!("thumbs service failed to handle a message: {err:#}");
            }
        }
        info!("thumbs service shutting down");
    }

    fn enqueue(&self, kind: ThumbKind, dir_id: String, rel_path: String, source_path: PathBuf) {
        let config = self.config.clone();
        let sem = match kind {
            ThumbKind::Image => self.image_sem.clone(),
            ThumbKind::Video => self.video_sem.clone(),
        };

        tokio::spawn(async move {
            let Ok(_permit) = sem.acquire_owned().await else {
                return;
            };

            let result = generate_for(&config, kind, &dir_id, &rel_path, &source_path).await;
            if let Err(err) = result {
                let target = match kind {
                    ThumbKind::Image => api::THUMB_DIR,
                    ThumbKind::Video => api::VTHUMB_DIR,
                };
                warn!(target: target, "thumbnail generation failed for {dir_id}/{rel_path}: {err:#}");
            }
        });
    }

    /// same shape as `enqueue`, but reports the outcome back through `resp`
    /// instead of just logging it -- spawned so a slow encode can't stall
    /// the mailbox behind it (only `Enqueue` was exempted from that before,
    /// leaving every on-demand request here blocking the next message)
    fn generate_and_respond(
        &self,
        kind: ThumbKind,
        dir_id: String,
        rel_path: String,
        source_path: PathBuf,
        resp: crate::service::ESMResp<PathBuf>,
    ) {
        let config = self.config.clone();
        let sem = match kind {
            ThumbKind::Image => self.image_sem.clone(),
            ThumbKind::Video => self.video_sem.clone(),
        };

        tokio::spawn(async move {
            let result = async {
                let _permit = sem.acquire_owned().await?;
                generate_for(&config, kind, &dir_id, &rel_path, &source_path).await
            }
            .await;
            let _ = resp.send(result);
        });
    }
}

async fn generate_for(
    config: &ServerConfig,
    kind: ThumbKind,
    dir_id: &str,
    rel_path: &str,
    source_path: &std::path::Path,
) -> Result<PathBuf> {
    match kind {
        ThumbKind::Image => {
            let dest = store::image_path(&config.data_dir, dir_id, rel_path, &config.thumb)?;
            if !store::is_fresh(&dest, source_path) {
                store::generate_image(source_path, &dest, &config.thumb).await?;
            }
            Ok(dest)
        }
        ThumbKind::Video => {
            let dest = store::video_path(&config.data_dir, dir_id, rel_path, &config.vthumb)?;
            if !store::is_fresh(&dest, source_path) {
                store::generate_video(source_path, &dest, &config.vthumb).await?;
            }
            Ok(dest)
        }
    }
}

#[async_trait]
impl ESInner for ThumbsServiceInner {
    fn new(config: Arc<ServerConfig>, registry: ESMRegistry) -> Result<Self> {
        let image_sem = Arc::new(Semaphore::new(config.thumb.concurrency.max(1)));
        let video_sem = Arc::new(Semaphore::new(config.vthumb.concurrency.max(1)));
        Ok(ThumbsServiceInner {
            config,
            registry,
            image_sem,
            video_sem,
        })
    }

    fn registry(&self) -> ESMRegistry {
        self.registry.clone()
    }

    #[instrument(skip_all)]
    async fn message_handler(&self, esm: ESM) -> Result<()> {
        let ESM::Thumbs(msg) = esm else {
            anyhow::bail!("thumbs service received a message addressed to another service");
        };

        match msg {
            ThumbsMsg::Enqueue {
                kind,
                dir_id,
                rel_path,
                source_path,
            } => {
                self.enqueue(kind, dir_id, rel_path, source_path);
                Ok(())
            }
            ThumbsMsg::GetOrGenerate {
                kind,
                dir_id,
                rel_path,
                source_path,
                resp,
            } => {
                self.generate_and_respond(kind, dir_id, rel_path, source_path, resp);
                Ok(())
            }
            ThumbsMsg::GetStats { resp } => {
                let thumbs_dir = self.thumbs_dir();
                let vthumbs_dir = self.vthumbs_dir();
                self.respond(resp, async move {
                    Ok(tokio::task::spawn_blocking(move || store::get_stats(&thumbs_dir, &vthumbs_dir))
                        .await?)
                })
                .await
            }
            ThumbsMsg::Cleanup { max_age_ms, resp } => {
                let thumbs_dir = self.thumbs_dir();
                let vthumbs_dir = self.vthumbs_dir();
                let thumb_max_bytes = self.config.thumb.max_bytes;
                let vthumb_max_bytes = self.config.vthumb.max_bytes;
                self.respond(resp, async move {
                    Ok(tokio::task::spawn_blocking(move || {
                        let a = store::cleanup_dir(&thumbs_dir, max_age_ms, thumb_max_bytes);
                        let b = store::cleanup_dir(&vthumbs_dir, max_age_ms, vthumb_max_bytes);
                        (a, b)
                    })
                    .await?)
                })
                .await
            }
            ThumbsMsg::ClearAll { resp } => {
                let thumbs_dir = self.thumbs_dir();
                let vthumbs_dir = self.vthumbs_dir();
                self.respond(resp, async move {
                    Ok(tokio::task::spawn_blocking(move || {
                        let a = store::clear_all(&thumbs_dir);
                        let b = store::clear_all(&vthumbs_dir);
                        (a, b)
                    })
                    .await?)
                })
                .await
            }
        }
    }
}
