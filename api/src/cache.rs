use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub count: u64,
    pub total_bytes: u64,
    pub oldest_atime_ms: Option<i64>,
    pub newest_atime_ms: Option<i64>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStatsResp {
    pub ok: bool,
    pub thumbs: StoreStats,
    pub vthumbs: StoreStats,
    pub db_size_bytes: u64,
}

#[derive(Clone, Debug, Serialize)]
pub struct CacheClearResp {
    pub ok: bool,
    pub removed: u64,
}

#[derive(Clone, Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CacheCleanupReq {
    pub max_age_ms: Option<i64>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheCleanupResp {
    pub ok: bool,
    pub removed: u64,
    pub remaining_bytes: u64,
}
