pub mod msg;
pub mod scan;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{error, info, instrument};

use api::scan::ScanReport;

use crate::config::ServerConfig;
use crate::service::{ESInner, ESMRegistry, EntanglementService, ServiceType, ESM};

use self::msg::{IndexerMsg, ScanOutcome};

/// single-flight scan scheduler -- grounded on the teacher's
/// `task/svc.rs` `TaskService`/`running_tasks` pattern, generalized from
/// per-library cancellable tasks down to one global boolean gate, since
/// this spec has exactly one kind of long-running operation and no
/// cancellation (concurrent callers short-circuit instead of waiting)
pub struct IndexerService {
    config: Arc<ServerConfig>,
}

#[async_trait]
impl EntanglementService for IndexerService {
    type Inner = IndexerServiceInner;

    fn create(config: Arc<ServerConfig>, _registry: &ESMRegistry) -> Self {
        IndexerService { config }
    }

    #[instrument(skip_all)]
    async fn start(&self, registry: &ESMRegistry) -> Result<()> {
        let (tx, rx) = mpsc::channel(64);
        registry.insert(ServiceType::Indexer, tx)?;

        let inner = IndexerServiceInner::new(self.config.clone(), registry.clone())?;

        tokio::spawn(async move {
            inner.run(rx).await;
        });

        Ok(())
    }
}

pub struct IndexerServiceInner {
    config: Arc<ServerConfig>,
    registry: ESMRegistry,
    running: Arc<AtomicBool>,
}

impl IndexerServiceInner {
    async fn run(&self, mut rx: mpsc::Receiver<ESM>) {
        while let Some(esm) = rx.recv().await {
            if let Err(err) = self.message_handler(esm).await {
                error!("indexer service failed to handle a message: {err:#}");
            }
        }
        info!("indexer service shutting down");
    }

    /// acquires the single-flight gate synchronously and, on success, spawns
    /// the scan onto its own task and returns immediately -- the mailbox
    /// loop is free to answer the next message right away, so a concurrent
    /// trigger observes `running == true` and short-circuits instead of
    /// queuing behind the scan in progress
    fn update_check(
        &self,
        force: bool,
        progress: Option<tokio::sync::broadcast::Sender<api::scan::IndexerProgress>>,
        resp: crate::service::ESMResp<ScanOutcome>,
    ) {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            let _ = resp.send(Ok(ScanOutcome::AlreadyRunning));
            return;
        }

        let config = self.config.clone();
        let registry = self.registry.clone();
        let running = self.running.clone();

        tokio::spawn(async move {
            let result = run_scan_guarded(&config, &registry, force, progress.as_ref()).await;
            running.store(false, Ordering::SeqCst);
            let _ = resp.send(result);
        });
    }
}

async fn run_scan_guarded(
    config: &Arc<ServerConfig>,
    registry: &ESMRegistry,
    force: bool,
    progress: Option<&tokio::sync::broadcast::Sender<api::scan::IndexerProgress>>,
) -> Result<ScanOutcome> {
    let db_tx = registry.get(&ServiceType::Db)?;
    let thumbs_tx = registry.get(&ServiceType::Thumbs)?;

    let started = Instant::now();
    let counters = scan::run_scan(config, &db_tx, &thumbs_tx, force, progress).await?;

    Ok(ScanOutcome::Completed(ScanReport {
        ok: true,
        db_path: config.db_path.to_string_lossy().into_owned(),
        scanned_dirs: counters.scanned_dirs,
        skipped_dirs: counters.skipped_dirs,
        added: counters.added,
        updated: counters.updated,
        deleted: counters.deleted,
        duration_ms: started.elapsed().as_millis() as u64,
    }))
}

#[async_trait]
impl ESInner for IndexerServiceInner {
    fn new(config: Arc<ServerConfig>, registry: ESMRegistry) -> Result<Self> {
        Ok(IndexerServiceInner {
            config,
            registry,
            running: Arc::new(AtomicBool::new(false)),
        })
    }

    fn registry(&self) -> ESMRegistry {
        self.registry.clone()
    }

    #[instrument(skip_all)]
    async fn message_handler(&self, esm: ESM) -> Result<()> {
        let ESM::Indexer(msg) = esm else {
            anyhow::bail!("indexer service received a message addressed to another service");
        };

        match msg {
            IndexerMsg::UpdateCheck { force, progress, resp } => {
                self.update_check(force, progress, resp);
                Ok(())
            }
            IndexerMsg::IsRunning { resp } => {
                self.respond(resp, async { Ok(self.running.load(Ordering::SeqCst)) }).await
            }
        }
    }
}
