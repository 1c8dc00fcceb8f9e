use std::path::PathBuf;

use api::cache::StoreStats;

use crate::service::{ESMResp, ESM};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ThumbKind {
    Image,
    Video,
}

/// messages accepted by the thumbnail store service
#[derive(Debug)]
pub enum ThumbsMsg {
    /// non-blocking enqueue from the Indexer; the caller does not await the
    /// artifact
    Enqueue {
        kind: ThumbKind,
        dir_id: String,
        rel_path: String,
        source_path: PathBuf,
    },
    /// on-demand synchronous generation for an HTTP cache miss; runs
    /// outside the bounded queue so the caller gets the bytes back
    GetOrGenerate {
        kind: ThumbKind,
        dir_id: String,
        rel_path: String,
        source_path: PathBuf,
        resp: ESMResp<PathBuf>,
    },
    GetStats {
        resp: ESMResp<(StoreStats, StoreStats)>,
    },
    Cleanup {
        max_age_ms: Option<i64>,
        resp: ESMResp<(u64, u64)>,
    },
    ClearAll {
        resp: ESMResp<(u64, u64)>,
    },
}

impl From<ThumbsMsg> for ESM {
    fn from(msg: ThumbsMsg) -> Self {
        ESM::Thumbs(msg)
    }
}
