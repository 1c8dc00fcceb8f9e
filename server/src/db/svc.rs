use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{error, info, instrument};

use api::dir::MediaDirOut;

use common::dirid::dir_id as compute_dir_id;

use crate::config::ServerConfig;
use crate::service::{ESInner, ESMRegistry, EntanglementService, ServiceType, ESM};

use super::msg::DbMsg;
use super::queries;
use super::store::IndexStore;

/// the db service: owns the only `IndexStore` handle and serializes every
/// write through its mailbox, exactly as the teacher's `auth`/`task`
/// services serialize access to their own state
pub struct DbService {
    config: Arc<ServerConfig>,
}

#[async_trait]
impl EntanglementService for DbService {
    type Inner = DbServiceInner;

    fn create(config: Arc<ServerConfig>, _registry: &ESMRegistry) -> Self {
        DbService { config }
    }

    #[instrument(skip_all)]
    async fn start(&self, registry: &ESMRegistry) -> Result<()> {
        let (tx, rx) = mpsc::channel(256);
        registry.insert(ServiceType::Db, tx)?;

        let inner = DbServiceInner::new(self.config.clone(), registry.clone()).await?;

        tokio::spawn(async move {
            inner.run(rx).await;
        });

        Ok(())
    }
}

pub struct DbServiceInner {
    store: IndexStore,
    registry: ESMRegistry,
    config: Arc<ServerConfig>,
}

impl DbServiceInner {
    async fn new(config: Arc<ServerConfig>, registry: ESMRegistry) -> Result<Self> {
        let store = IndexStore::open(&config.db_path).await?;
        Ok(DbServiceInner { store, registry, config })
    }

    async fn run(&self, mut rx: mpsc::Receiver<ESM>) {
        while let Some(esm) = rx.recv().await {
            if let Err(err) = self.message_handler(esm).await {
                error!("db service failed to handle a message: {err:#}");
            }
        }
        info!("db service shutting down");
    }

    pub fn store(&self) -> &IndexStore {
        &self.store
    }

    fn media_dirs_out(&self) -> Vec<MediaDirOut> {
        self.config
            .media_dirs()
            .into_iter()
            .map(|p| MediaDirOut {
                id: compute_dir_id(&p),
                path: p.to_string_lossy().into_owned(),
                label: p.file_name().map(|n| n.to_string_lossy().into_owned()),
                exists: p.is_dir(),
            })
            .collect()
    }
}

#[async_trait]
impl ESInner for DbServiceInner {
    fn new(config: Arc<ServerConfig>, registry: ESMRegistry) -> Result<Self> {
        // construction is async (opening the pool runs migrations), so the
        // real constructor is `DbServiceInner::new`; this sync entry point
        // only exists to satisfy the trait and is not used by `DbService`
        let _ = (config, registry);
        anyhow::bail!("DbServiceInner must be constructed via DbServiceInner::new")
    }

    fn registry(&self) -> ESMRegistry {
        self.registry.clone()
    }

    #[instrument(skip_all)]
    async fn message_handler(&self, esm: ESM) -> Result<()> {
        let ESM::Db(msg) = esm else {
            anyhow::bail!("db service received a message addressed to another service");
        };

        match msg {
            DbMsg::UpsertMediaItem { item, run_id, resp } => {
                self.respond(resp, async { self.store.upsert_media_item(&item, run_id).await })
                    .await
            }
            DbMsg::TouchSeenRun {
                dir_id,
                rel_path,
                run_id,
                resp,
            } => {
                self.respond(resp, async {
                    self.store.touch_seen_run(&dir_id, &rel_path, run_id).await
                })
                .await
            }
            DbMsg::DeleteVanished { dir_id, run_id, resp } => {
                self.respond(resp, async { self.store.delete_vanished(&dir_id, run_id).await })
                    .await
            }
            DbMsg::PruneDirsNotIn { keep_ids, resp } => {
                self.respond(resp, async {
                    self.store
                        .prune_dirs_not_in(&keep_ids.into_iter().collect())
                        .await
                })
                .await
            }
            DbMsg::OrphanCleanup { resp } => {
                self.respond(resp, async { self.store.orphan_cleanup().await }).await
            }
            DbMsg::GetDirState { dir_id, resp } => {
                self.respond(resp, async { self.store.get_dir_state(&dir_id).await }).await
            }
            DbMsg::UpsertDirState {
                dir_id,
                dir_path,
                dir_mtime_ms,
                scanned_at_ms,
                resp,
            } => {
                self.respond(resp, async {
                    self.store
                        .upsert_dir_state(&dir_id, &dir_path, dir_mtime_ms, scanned_at_ms)
                        .await
                })
                .await
            }
            DbMsg::GetMediaItem { dir_id, rel_path, resp } => {
                self.respond(resp, async { self.store.get_media_item(&dir_id, &rel_path).await })
                    .await
            }
            DbMsg::RebuildTypesTags {
                dir_id,
                rel_path,
                types,
                tags,
                resp,
            } => {
                self.respond(resp, async {
                    self.store.rebuild_types_tags(&dir_id, &rel_path, &types, &tags).await
                })
                .await
            }
            DbMsg::QueryResources { filter, resp } => {
                let dirs = self.media_dirs_out();
                self.respond(resp, async { queries::query_resources(&self.store, &filter, dirs).await })
                    .await
            }
            DbMsg::QueryAuthors { filter, resp } => {
                let dirs = self.media_dirs_out();
                self.respond(resp, async { queries::query_authors(&self.store, &filter, dirs).await })
                    .await
            }
            DbMsg::QueryTags { filter, resp } => {
                self.respond(resp, async { queries::query_tags(&self.store, &filter).await }).await
            }
        }
    }
}
