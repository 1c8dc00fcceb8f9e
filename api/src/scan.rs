use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum IndexerProgress {
    Init {
        total_dirs: u32,
    },
    Scanning {
        current_dir: u32,
        total_dirs: u32,
        current_dir_path: String,
        scanned_files: u64,
        added: u64,
        updated: u64,
        deleted: u64,
    },
    Processing {
        current_dir: u32,
        total_dirs: u32,
        current_dir_path: String,
        scanned_files: u64,
        added: u64,
        updated: u64,
        deleted: u64,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanReport {
    pub ok: bool,
    pub db_path: String,
    pub scanned_dirs: u32,
    pub skipped_dirs: u32,
    pub added: u64,
    pub updated: u64,
    pub deleted: u64,
    pub duration_ms: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScanError {
    pub ok: bool,
    pub error: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScanRunning {
    pub ok: bool,
    pub running: bool,
}

impl ScanRunning {
    pub fn new() -> Self {
        ScanRunning {
            ok: false,
            running: true,
        }
    }
}

impl Default for ScanRunning {
    fn default() -> Self {
        Self::new()
    }
}

/// SSE event envelope emitted by `GET /api/reindex?stream=1`
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ReindexEvent {
    Progress { data: IndexerProgress },
    Complete { data: ScanReport },
    Error { data: ScanErrorData },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScanErrorData {
    pub error: String,
}
