use api::query::{AuthorsFilter, AuthorsResp, ResourceFilter, ResourcesResp, TagsFilter, TagsResp};

use crate::db::{MediaRow, MediaUpsert};
use crate::service::{ESMResp, ESM};

/// messages accepted by the db service
#[derive(Debug)]
pub enum DbMsg {
    UpsertMediaItem {
        item: MediaUpsert,
        run_id: i64,
        resp: ESMResp<bool>,
    },
    TouchSeenRun {
        dir_id: String,
        rel_path: String,
        run_id: i64,
        resp: ESMResp<()>,
    },
    DeleteVanished {
        dir_id: String,
        run_id: i64,
        resp: ESMResp<u64>,
    },
    PruneDirsNotIn {
        keep_ids: Vec<String>,
        resp: ESMResp<()>,
    },
    OrphanCleanup {
        resp: ESMResp<()>,
    },
    GetDirState {
        dir_id: String,
        resp: ESMResp<Option<(String, f64, i64)>>,
    },
    UpsertDirState {
        dir_id: String,
        dir_path: String,
        dir_mtime_ms: f64,
        scanned_at_ms: i64,
        resp: ESMResp<()>,
    },
    GetMediaItem {
        dir_id: String,
        rel_path: String,
        resp: ESMResp<Option<MediaRow>>,
    },
    RebuildTypesTags {
        dir_id: String,
        rel_path: String,
        types: Vec<String>,
        tags: Vec<String>,
        resp: ESMResp<()>,
    },
    QueryResources {
        filter: ResourceFilter,
        resp: ESMResp<ResourcesResp>,
    },
    QueryAuthors {
        filter: AuthorsFilter,
        resp: ESMResp<AuthorsResp>,
    },
    QueryTags {
        filter: TagsFilter,
        resp: ESMResp<TagsResp>,
    },
}

impl From<DbMsg> for ESM {
    fn from(msg: DbMsg) -> Self {
        ESM::Db(msg)
    }
}
