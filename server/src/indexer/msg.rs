use tokio::sync::broadcast;

use api::scan::{IndexerProgress, ScanReport};

use crate::service::{ESMResp, ESM};

/// messages accepted by the indexer service
#[derive(Debug)]
pub enum IndexerMsg {
    UpdateCheck {
        force: bool,
        progress: Option<broadcast::Sender<IndexerProgress>>,
        resp: ESMResp<ScanOutcome>,
    },
    IsRunning {
        resp: ESMResp<bool>,
    },
}

#[derive(Debug, Clone)]
pub enum ScanOutcome {
    Completed(ScanReport),
    AlreadyRunning,
}

impl From<IndexerMsg> for ESM {
    fn from(msg: IndexerMsg) -> Self {
        ESM::Indexer(msg)
    }
}
